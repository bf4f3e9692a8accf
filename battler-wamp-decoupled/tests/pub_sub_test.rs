use std::{
    sync::{
        Arc,
        mpsc,
    },
    time::Duration,
};

use battler_wamp_decoupled::{
    client::{
        DecoupledClient,
        DecoupledClientConfig,
    },
    core::{
        types::{
            Dictionary,
            dictionary_from_json,
        },
        uri::Uri,
    },
    decoupler::{
        Request,
        Subscribe,
    },
    executor::callback,
};
use test_utils::{
    executor::RecordingExecutor,
    operations::{
        Operation,
        OperationLog,
    },
    session::{
        FakeSession,
        FakeSessionHandle,
    },
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn kwargs(value: serde_json::Value) -> Dictionary {
    dictionary_from_json(value).unwrap()
}

fn uri(value: &str) -> Uri {
    Uri::try_from(value).unwrap()
}

fn start_client(
    config: DecoupledClientConfig,
) -> (
    DecoupledClient,
    FakeSessionHandle,
    OperationLog,
    Arc<RecordingExecutor>,
) {
    let log = OperationLog::default();
    let (session, handle) = FakeSession::new(log.clone());
    let executor = RecordingExecutor::new(log.clone());
    let client = DecoupledClient::start(session, executor.clone(), config).unwrap();
    (client, handle, log, executor)
}

#[test]
fn subscriber_receives_published_event_once() {
    test_utils::setup::setup_test_environment();

    let (client, session, log, _) = start_client(DecoupledClientConfig::default());
    let (event_tx, event_rx) = mpsc::channel();
    let subscription = client
        .subscribe(
            uri("ns.events"),
            Dictionary::default(),
            callback(move |payload| {
                event_tx.send(payload).ok();
            }),
        )
        .unwrap()
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap();
    pretty_assertions::assert_eq!(subscription.topic.as_ref(), "ns.events");
    pretty_assertions::assert_eq!(session.subscription_count("ns.events"), 1);

    pretty_assertions::assert_eq!(
        session.publish("ns.events", kwargs(serde_json::json!({ "message": "hello" }))),
        1
    );
    pretty_assertions::assert_eq!(
        event_rx.recv_timeout(TIMEOUT).ok(),
        Some(kwargs(serde_json::json!({ "message": "hello" })))
    );
    assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());
    pretty_assertions::assert_eq!(log.count(&Operation::Execute), 1);

    // Events for other topics are not delivered.
    pretty_assertions::assert_eq!(session.publish("ns.other", Dictionary::default()), 0);
    assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn delivers_events_in_publication_order() {
    test_utils::setup::setup_test_environment();

    let (client, session, log, executor) = start_client(DecoupledClientConfig::default());
    let (event_tx, event_rx) = mpsc::channel();
    client
        .subscribe(
            uri("ns.events"),
            Dictionary::default(),
            callback(move |payload| {
                event_tx.send(payload).ok();
            }),
        )
        .unwrap()
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap();

    for n in 0..5 {
        session.publish("ns.events", kwargs(serde_json::json!({ "n": n })));
    }
    let received = (0..5)
        .map(|_| event_rx.recv_timeout(TIMEOUT).unwrap())
        .collect::<Vec<_>>();
    let expected = (0..5)
        .map(|n| kwargs(serde_json::json!({ "n": n })))
        .collect::<Vec<_>>();
    pretty_assertions::assert_eq!(received, expected);
    assert!(log.wait_for(&Operation::Execute, 5, TIMEOUT));
    pretty_assertions::assert_eq!(executor.payloads(), expected);
}

#[test]
fn subscription_without_callback_is_accepted() {
    test_utils::setup::setup_test_environment();

    let (client, session, log, _) = start_client(DecoupledClientConfig::default());
    let (request, future) = Request::subscribe(Subscribe::new(uri("ns.quiet")));
    client.enqueue(request).unwrap();
    assert_matches::assert_matches!(future.wait_timeout(TIMEOUT), Ok(Some(_)));

    session.publish("ns.quiet", Dictionary::default());
    std::thread::sleep(Duration::from_millis(100));
    pretty_assertions::assert_eq!(log.count(&Operation::Execute), 0);
}

#[test]
fn unsubscribing_twice_reports_false_the_second_time() {
    test_utils::setup::setup_test_environment();

    for allow_exception in [false, true] {
        let mut config = DecoupledClientConfig::default();
        config.allow_exception = allow_exception;
        let (client, session, log, _) = start_client(config);

        let subscription = client
            .subscribe(uri("ns.events"), Dictionary::default(), callback(|_| {}))
            .unwrap()
            .wait_timeout(TIMEOUT)
            .unwrap()
            .unwrap();

        let first = client.unsubscribe(subscription.clone()).unwrap();
        assert_matches::assert_matches!(first.wait_timeout(TIMEOUT), Ok(true));
        pretty_assertions::assert_eq!(session.subscription_count("ns.events"), 0);

        let second = client.unsubscribe(subscription.clone()).unwrap();
        assert_matches::assert_matches!(second.wait_timeout(TIMEOUT), Ok(false));

        pretty_assertions::assert_eq!(
            log.count(&Operation::Unsubscribe(subscription.id)),
            2
        );
    }
}

#[test]
fn unsubscribe_transport_failure_reports_false() {
    test_utils::setup::setup_test_environment();

    for allow_exception in [false, true] {
        let mut config = DecoupledClientConfig::default();
        config.allow_exception = allow_exception;
        let (client, session, log, _) = start_client(config);

        let subscription = client
            .subscribe(uri("ns.events"), Dictionary::default(), callback(|_| {}))
            .unwrap()
            .wait_timeout(TIMEOUT)
            .unwrap()
            .unwrap();

        session.fail_unsubscribe();
        let future = client.unsubscribe(subscription.clone()).unwrap();
        assert_matches::assert_matches!(future.wait_timeout(TIMEOUT), Ok(false));
        pretty_assertions::assert_eq!(log.count(&Operation::Unsubscribe(subscription.id)), 1);

        // The subscription is still active, and the loop keeps serving.
        pretty_assertions::assert_eq!(session.subscription_count("ns.events"), 1);
        assert_matches::assert_matches!(
            client
                .subscribe(uri("ns.other"), Dictionary::default(), callback(|_| {}))
                .unwrap()
                .wait_timeout(TIMEOUT),
            Ok(Some(_))
        );
    }
}

#[test]
fn no_events_delivered_after_unsubscribe() {
    test_utils::setup::setup_test_environment();

    let (client, session, log, _) = start_client(DecoupledClientConfig::default());
    let subscription = client
        .subscribe(uri("ns.events"), Dictionary::default(), callback(|_| {}))
        .unwrap()
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap();
    session.publish("ns.events", Dictionary::default());
    assert!(log.wait_for(&Operation::Execute, 1, TIMEOUT));

    assert_matches::assert_matches!(
        client.unsubscribe(subscription).unwrap().wait_timeout(TIMEOUT),
        Ok(true)
    );
    pretty_assertions::assert_eq!(session.publish("ns.events", Dictionary::default()), 0);
    std::thread::sleep(Duration::from_millis(100));
    pretty_assertions::assert_eq!(log.count(&Operation::Execute), 1);
}

#[test]
fn subscriptions_end_when_session_disconnects() {
    test_utils::setup::setup_test_environment();

    let (client, session, log, _) = start_client(DecoupledClientConfig::default());
    client
        .subscribe(uri("ns.events"), Dictionary::default(), callback(|_| {}))
        .unwrap()
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap();

    session.force_disconnect();
    assert!(client.wait_until_terminated(TIMEOUT));
    pretty_assertions::assert_eq!(session.publish("ns.events", Dictionary::default()), 0);
    pretty_assertions::assert_eq!(log.count(&Operation::Execute), 0);
}
