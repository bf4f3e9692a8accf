use std::{
    sync::{
        Arc,
        Condvar,
        Mutex,
    },
    time::Duration,
};

use battler_wamp_decoupled::core::id::Id;

/// An operation observed on a fake session or executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Join,
    Call(String),
    Subscribe(String),
    Unsubscribe(Id),
    Disconnect,
    ExecutorStart,
    ExecutorStop,
    Execute,
}

#[derive(Default)]
struct OperationLogInner {
    operations: Mutex<Vec<Operation>>,
    changed: Condvar,
}

/// A shared, ordered log of operations, for asserting on the interleaving of session and executor
/// activity.
#[derive(Clone, Default)]
pub struct OperationLog {
    inner: Arc<OperationLogInner>,
}

impl OperationLog {
    pub fn record(&self, operation: Operation) {
        self.inner.operations.lock().unwrap().push(operation);
        self.inner.changed.notify_all();
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.inner.operations.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &Operation) -> usize {
        self.inner
            .operations
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| *recorded == operation)
            .count()
    }

    pub fn position(&self, operation: &Operation) -> Option<usize> {
        self.inner
            .operations
            .lock()
            .unwrap()
            .iter()
            .position(|recorded| recorded == operation)
    }

    /// Waits until the operation has been recorded at least `count` times.
    pub fn wait_for(&self, operation: &Operation, count: usize, timeout: Duration) -> bool {
        let operations = self.inner.operations.lock().unwrap();
        let (operations, _) = self
            .inner
            .changed
            .wait_timeout_while(operations, timeout, |operations| {
                operations
                    .iter()
                    .filter(|recorded| *recorded == operation)
                    .count()
                    < count
            })
            .unwrap();
        operations
            .iter()
            .filter(|recorded| *recorded == operation)
            .count()
            >= count
    }
}
