//! In-memory [`ShadowConnection`] that records calls instead of sending them.

use crate::shadow::{CorrelationToken, ShadowConnection, ShadowError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A call received by [`MockShadowConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Get {
        thing_name: String,
        token: String,
    },
    Update {
        thing_name: String,
        state: Value,
        token: String,
    },
    Register {
        thing_name: String,
        token: String,
    },
    Unregister {
        thing_name: String,
    },
    Publish {
        topic: String,
        message: String,
    },
    End {
        force: bool,
    },
}

impl RecordedCall {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Get { token, .. } | Self::Update { token, .. } | Self::Register { token, .. } => {
                Some(token)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MockShadowConnection {
    calls: Mutex<Vec<RecordedCall>>,
    fail_sends: AtomicBool,
    notify: Notify,
}

impl MockShadowConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following send fail with a transport error (not recorded)
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Token of the most recent acknowledged-type call
    pub fn last_token(&self) -> Option<String> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| call.token().map(str::to_string))
    }

    /// Wait until at least `count` calls have been recorded
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, call: RecordedCall) -> Result<(), ShadowError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ShadowError::transport("mock connection refused send"));
        }
        self.calls.lock().push(call);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl ShadowConnection for MockShadowConnection {
    async fn get(&self, thing_name: &str, token: &CorrelationToken) -> Result<(), ShadowError> {
        self.record(RecordedCall::Get {
            thing_name: thing_name.to_string(),
            token: token.to_string(),
        })
    }

    async fn update(
        &self,
        thing_name: &str,
        state: &Value,
        token: &CorrelationToken,
    ) -> Result<(), ShadowError> {
        self.record(RecordedCall::Update {
            thing_name: thing_name.to_string(),
            state: state.clone(),
            token: token.to_string(),
        })
    }

    async fn register(&self, thing_name: &str, token: &CorrelationToken) -> Result<(), ShadowError> {
        self.record(RecordedCall::Register {
            thing_name: thing_name.to_string(),
            token: token.to_string(),
        })
    }

    async fn unregister(&self, thing_name: &str) -> Result<(), ShadowError> {
        self.record(RecordedCall::Unregister {
            thing_name: thing_name.to_string(),
        })
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<(), ShadowError> {
        self.record(RecordedCall::Publish {
            topic: topic.to_string(),
            message: message.to_string(),
        })
    }

    async fn end(&self, force: bool) -> Result<(), ShadowError> {
        self.calls.lock().push(RecordedCall::End { force });
        self.notify.notify_waiters();
        Ok(())
    }
}
