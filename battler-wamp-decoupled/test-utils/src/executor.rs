use std::sync::{
    Arc,
    Mutex,
};

use battler_wamp_decoupled::{
    core::types::Dictionary,
    executor::{
        Callback,
        CallbackExecutor,
        SequentialCallbackExecutor,
    },
};

use crate::operations::{
    Operation,
    OperationLog,
};

/// A callback executor that records every operation before delegating to a
/// [`SequentialCallbackExecutor`].
pub struct RecordingExecutor {
    log: OperationLog,
    payloads: Mutex<Vec<Dictionary>>,
    delegate: SequentialCallbackExecutor,
}

impl RecordingExecutor {
    pub fn new(log: OperationLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            payloads: Mutex::new(Vec::new()),
            delegate: SequentialCallbackExecutor::new("recording-executor"),
        })
    }

    /// Payloads handed to the executor, in order.
    pub fn payloads(&self) -> Vec<Dictionary> {
        self.payloads.lock().unwrap().clone()
    }
}

impl CallbackExecutor for RecordingExecutor {
    fn start(&self) {
        self.log.record(Operation::ExecutorStart);
        self.delegate.start();
    }

    fn stop(&self) {
        self.log.record(Operation::ExecutorStop);
        self.delegate.stop();
    }

    fn execute(&self, callback: Callback, payload: Dictionary) {
        self.payloads.lock().unwrap().push(payload.clone());
        self.log.record(Operation::Execute);
        self.delegate.execute(callback, payload);
    }
}
