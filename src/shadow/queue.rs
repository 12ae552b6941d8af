//! # Shadow Request Queue
//!
//! FIFO pipeline that puts shadow operations onto a transport able to
//! correlate a single in-flight request at a time.
//!
//! ## Invariants
//!
//! - At most one request is outstanding, and it is always the head of the queue.
//! - Requests complete in the order they were added, across retries.
//! - A timeout resends the head with a fresh token; it is never dropped.
//! - An acknowledgment for an unknown token is a fatal consistency error and
//!   leaves the queue untouched.
//!
//! Dispatch never happens inside `add`/`mark_complete`/`retry_request`: those
//! only schedule it. The owner calls [`RequestQueue::dispatch`] once the
//! current operation has returned (see `ShadowClient`).

use super::connection::ShadowConnection;
use super::errors::ShadowError;
use super::request::{CorrelationToken, ShadowAction, ShadowRequest};
use crate::logging::log_queue_operation;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type Completion = oneshot::Sender<Result<(), ShadowError>>;

/// Resolves once the queue completes, rejects or discards the request
#[derive(Debug)]
pub struct RequestCompletion {
    action: ShadowAction,
    receiver: oneshot::Receiver<Result<(), ShadowError>>,
}

impl RequestCompletion {
    pub fn action(&self) -> ShadowAction {
        self.action
    }
}

impl Future for RequestCompletion {
    type Output = Result<(), ShadowError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ShadowError::channel_closed(
                "shadow request queue",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    request: ShadowRequest,
    completion: Completion,
}

/// What a call to `mark_complete` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The head request was completed
    Completed,
    /// The token belonged to a request that had already timed out
    Stale,
}

/// What a call to `dispatch` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No connection, nothing pending, or a request is already outstanding
    Idle,
    /// Sent and awaiting acknowledgment under `token`
    AwaitingAck {
        action: ShadowAction,
        token: CorrelationToken,
    },
    /// Fire-and-forget request sent and completed
    Sent { action: ShadowAction },
}

#[derive(Debug)]
pub struct RequestQueue {
    client_id: String,
    next_sequence: u64,
    connection: Option<Arc<dyn ShadowConnection>>,
    pending: VecDeque<PendingRequest>,
    outstanding: Option<CorrelationToken>,
    /// Tokens that timed out or were dropped by a reset, newest last
    retired: VecDeque<CorrelationToken>,
    retired_capacity: usize,
    dispatch_scheduled: bool,
}

impl RequestQueue {
    pub fn new(client_id: impl Into<String>, retired_capacity: usize) -> Self {
        Self {
            client_id: client_id.into(),
            next_sequence: 1,
            connection: None,
            pending: VecDeque::new(),
            outstanding: None,
            retired: VecDeque::with_capacity(retired_capacity),
            retired_capacity,
            dispatch_scheduled: false,
        }
    }

    /// Validate and enqueue `request`. Invalid requests are rejected here and
    /// never enter the queue.
    pub fn add(&mut self, request: ShadowRequest) -> Result<RequestCompletion, ShadowError> {
        request.validate()?;

        let (completion, receiver) = oneshot::channel();
        let action = request.action();
        log_queue_operation(
            "add",
            action.as_str(),
            Some(request.target()),
            None,
            self.pending.len() + 1,
        );
        self.pending.push_back(PendingRequest {
            request,
            completion,
        });
        self.schedule_dispatch();

        Ok(RequestCompletion { action, receiver })
    }

    /// Attach or detach the connection. Detaching keeps every pending request
    /// and the outstanding token.
    pub fn set_connection(&mut self, connection: Option<Arc<dyn ShadowConnection>>) {
        self.connection = connection;
        self.schedule_dispatch();
    }

    /// Detach the connection and discard every pending request. Each discarded
    /// completion resolves with [`ShadowError::QueueReset`]. Returns the number
    /// of requests discarded.
    pub fn reset(&mut self) -> usize {
        self.connection = None;
        self.dispatch_scheduled = false;
        if let Some(token) = self.outstanding.take() {
            self.retire(token);
        }

        let discarded = self.pending.len();
        for pending in self.pending.drain(..) {
            let action = pending.request.action();
            let _ = pending
                .completion
                .send(Err(ShadowError::queue_reset(action.as_str())));
        }
        if discarded > 0 {
            info!(discarded = discarded, "🧹 Shadow request queue reset");
        }
        discarded
    }

    /// Complete the outstanding request. `failed` rejects it with a protocol
    /// failure.
    pub fn mark_complete(&mut self, token: &str, failed: bool) -> Result<AckOutcome, ShadowError> {
        if !self.is_outstanding(token) {
            if self.retired.iter().any(|retired| retired.as_str() == token) {
                warn!(request_id = token, "Ignoring acknowledgment for retired request");
                return Ok(AckOutcome::Stale);
            }
            return Err(ShadowError::internal_consistency(format!(
                "pending token mismatch: outstanding {}, acknowledged {token}",
                self.outstanding
                    .as_ref()
                    .map_or("<none>", CorrelationToken::as_str)
            )));
        }

        let Some(pending) = self.pending.pop_front() else {
            return Err(ShadowError::internal_consistency(format!(
                "token {token} outstanding with no pending request"
            )));
        };
        self.outstanding = None;

        let action = pending.request.action();
        let target = pending.request.target();
        let result = if failed {
            error!(action = %action, thing = %target, request_id = token, "❌ Shadow request failed");
            Err(ShadowError::protocol_failure(action.as_str(), Some(target), token))
        } else {
            info!(action = %action, thing = %target, request_id = token, "✅ Shadow request complete");
            Ok(())
        };
        let _ = pending.completion.send(result);

        self.schedule_dispatch();
        Ok(AckOutcome::Completed)
    }

    /// Handle a timeout for `token`. The head request is resent under a new
    /// token. Returns false when `token` is not outstanding.
    pub fn retry_request(&mut self, token: &str) -> bool {
        if !self.is_outstanding(token) {
            warn!(request_id = token, "Request not pending");
            return false;
        }

        if let Some(expired) = self.outstanding.take() {
            self.retire(expired);
        }
        debug!(request_id = token, "🔁 Retrying timed out request");
        self.schedule_dispatch();
        true
    }

    /// Consume the scheduled-dispatch flag
    pub fn take_scheduled_dispatch(&mut self) -> bool {
        std::mem::take(&mut self.dispatch_scheduled)
    }

    /// Send the head request if the connection is attached and nothing is
    /// outstanding. A send error detaches the connection and leaves the
    /// request at the head.
    pub async fn dispatch(&mut self) -> Result<DispatchOutcome, ShadowError> {
        let Some(connection) = self.connection.clone() else {
            return Ok(DispatchOutcome::Idle);
        };
        if self.outstanding.is_some() || self.pending.is_empty() {
            return Ok(DispatchOutcome::Idle);
        }

        let token = self.next_token();
        let Some(head) = self.pending.front() else {
            return Ok(DispatchOutcome::Idle);
        };
        let action = head.request.action();
        let sent = match &head.request {
            ShadowRequest::Get { thing_name } => connection.get(thing_name, &token).await,
            ShadowRequest::Update { thing_name, state } => {
                connection.update(thing_name, state, &token).await
            }
            ShadowRequest::Register { thing_name } => connection.register(thing_name, &token).await,
            ShadowRequest::Unregister { thing_name } => connection.unregister(thing_name).await,
            ShadowRequest::Publish { topic, message } => connection.publish(topic, message).await,
        };

        if let Err(error) = sent {
            warn!(
                action = %action,
                request_id = %token,
                error = %error,
                "Send failed, detaching connection"
            );
            self.connection = None;
            return Err(error);
        }

        if action.expects_ack() {
            log_queue_operation(
                "sent",
                action.as_str(),
                self.pending.front().map(|p| p.request.target()),
                Some(token.as_str()),
                self.pending.len(),
            );
            self.outstanding = Some(token.clone());
            return Ok(DispatchOutcome::AwaitingAck { action, token });
        }

        if let Some(pending) = self.pending.pop_front() {
            info!(action = %action, target = %pending.request.target(), "📤 Sent message");
            let _ = pending.completion.send(Ok(()));
        }
        self.schedule_dispatch();
        Ok(DispatchOutcome::Sent { action })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn outstanding_token(&self) -> Option<&CorrelationToken> {
        self.outstanding.as_ref()
    }

    /// Actions of the pending requests, head first
    pub fn pending_actions(&self) -> Vec<ShadowAction> {
        self.pending.iter().map(|p| p.request.action()).collect()
    }

    fn is_outstanding(&self, token: &str) -> bool {
        self.outstanding
            .as_ref()
            .is_some_and(|outstanding| outstanding.as_str() == token)
    }

    fn schedule_dispatch(&mut self) {
        if self.connection.is_some() {
            self.dispatch_scheduled = true;
        }
    }

    fn next_token(&mut self) -> CorrelationToken {
        let token = CorrelationToken::new(&self.client_id, self.next_sequence);
        self.next_sequence += 1;
        token
    }

    fn retire(&mut self, token: CorrelationToken) {
        if self.retired_capacity == 0 {
            return;
        }
        if self.retired.len() == self.retired_capacity {
            self.retired.pop_front();
        }
        self.retired.push_back(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockShadowConnection, RecordedCall};
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

    fn connected_queue() -> (RequestQueue, Arc<MockShadowConnection>) {
        let connection = MockShadowConnection::new();
        let mut queue = RequestQueue::new("client", 4);
        queue.set_connection(Some(connection.clone()));
        (queue, connection)
    }

    async fn drain(queue: &mut RequestQueue) {
        while queue.take_scheduled_dispatch() {
            let _ = queue.dispatch().await;
        }
    }

    #[tokio::test]
    async fn test_add_while_disconnected_enqueues_without_sending() {
        let mut queue = RequestQueue::new("client", 4);
        let mut completion = task::spawn(queue.add(ShadowRequest::get("pod")).unwrap());

        assert!(!queue.take_scheduled_dispatch());
        assert_eq!(queue.dispatch().await.unwrap(), DispatchOutcome::Idle);
        assert_eq!(queue.pending_len(), 1);
        assert_pending!(completion.poll());
    }

    #[tokio::test]
    async fn test_invalid_request_is_never_enqueued() {
        let (mut queue, _) = connected_queue();
        assert!(matches!(
            queue.add(ShadowRequest::get("")),
            Err(ShadowError::Validation { .. })
        ));
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_single_outstanding_and_fifo_completion() {
        let (mut queue, connection) = connected_queue();
        let mut first = task::spawn(queue.add(ShadowRequest::get("pod")).unwrap());
        let mut second = task::spawn(
            queue
                .add(ShadowRequest::update("pod", Some(json!({"a": 1}))))
                .unwrap(),
        );

        drain(&mut queue).await;
        assert_eq!(connection.call_count(), 1);
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-1");

        // nothing more goes out while a request is outstanding
        assert_eq!(queue.dispatch().await.unwrap(), DispatchOutcome::Idle);
        assert_eq!(connection.call_count(), 1);

        assert_eq!(queue.mark_complete("client-1", false).unwrap(), AckOutcome::Completed);
        assert_ready_eq!(first.poll(), Ok(()));
        assert_pending!(second.poll());

        drain(&mut queue).await;
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-2");
        queue.mark_complete("client-2", true).unwrap();
        assert!(matches!(
            assert_ready!(second.poll()),
            Err(ShadowError::ProtocolFailure { .. })
        ));
        assert!(queue.outstanding_token().is_none());
    }

    #[tokio::test]
    async fn test_timeout_retries_head_with_new_token() {
        let (mut queue, connection) = connected_queue();
        let mut get = task::spawn(queue.add(ShadowRequest::get("pod")).unwrap());
        let _update = queue.add(ShadowRequest::update("pod", None)).unwrap();
        drain(&mut queue).await;

        assert!(queue.retry_request("client-1"));
        drain(&mut queue).await;

        let calls = connection.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            RecordedCall::Get {
                thing_name: "pod".into(),
                token: "client-2".into()
            }
        );
        assert_eq!(queue.pending_actions(), vec![ShadowAction::Get, ShadowAction::Update]);
        assert_pending!(get.poll());

        // a stale timeout changes nothing
        assert!(!queue.retry_request("client-1"));
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-2");
    }

    #[tokio::test]
    async fn test_mismatched_ack_is_fatal_and_leaves_queue_unchanged() {
        let (mut queue, _) = connected_queue();
        let _get = queue.add(ShadowRequest::get("pod")).unwrap();
        drain(&mut queue).await;

        let err = queue.mark_complete("someone-else-9", false).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-1");
    }

    #[tokio::test]
    async fn test_late_ack_for_timed_out_token_is_ignored() {
        let (mut queue, _) = connected_queue();
        let _get = queue.add(ShadowRequest::get("pod")).unwrap();
        drain(&mut queue).await;
        queue.retry_request("client-1");
        drain(&mut queue).await;

        assert_eq!(queue.mark_complete("client-1", false).unwrap(), AckOutcome::Stale);
        assert_eq!(queue.pending_len(), 1);
        assert_eq!(queue.mark_complete("client-2", false).unwrap(), AckOutcome::Completed);
    }

    #[tokio::test]
    async fn test_fire_and_forget_completes_on_send_and_continues() {
        let (mut queue, connection) = connected_queue();
        let mut publish = task::spawn(
            queue
                .add(ShadowRequest::publish("lwt/client", &json!({"hello": true})))
                .unwrap(),
        );
        let mut unregister = task::spawn(queue.add(ShadowRequest::unregister("pod")).unwrap());
        let _get = queue.add(ShadowRequest::get("pod")).unwrap();

        drain(&mut queue).await;

        assert_ready_eq!(publish.poll(), Ok(()));
        assert_ready_eq!(unregister.poll(), Ok(()));
        assert_eq!(connection.call_count(), 3);
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-3");
    }

    #[tokio::test]
    async fn test_offline_preserves_pending_and_resumes() {
        let (mut queue, connection) = connected_queue();
        let _get = queue.add(ShadowRequest::get("pod")).unwrap();
        drain(&mut queue).await;

        queue.set_connection(None);
        let _update = queue.add(ShadowRequest::update("pod", None)).unwrap();
        drain(&mut queue).await;
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-1");

        queue.set_connection(Some(connection.clone()));
        queue.mark_complete("client-1", false).unwrap();
        drain(&mut queue).await;
        assert_eq!(connection.call_count(), 2);
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-2");
    }

    #[tokio::test]
    async fn test_reset_rejects_pending_completions() {
        let (mut queue, _) = connected_queue();
        let mut get = task::spawn(queue.add(ShadowRequest::get("pod")).unwrap());
        let mut update = task::spawn(queue.add(ShadowRequest::update("pod", None)).unwrap());
        drain(&mut queue).await;

        assert_eq!(queue.reset(), 2);
        assert!(!queue.is_connected());
        assert!(queue.outstanding_token().is_none());
        assert!(matches!(
            assert_ready!(get.poll()),
            Err(ShadowError::QueueReset { .. })
        ));
        assert!(matches!(
            assert_ready!(update.poll()),
            Err(ShadowError::QueueReset { .. })
        ));

        // the ack of the discarded request arrives afterwards
        assert_eq!(queue.mark_complete("client-1", false).unwrap(), AckOutcome::Stale);
    }

    #[tokio::test]
    async fn test_send_failure_detaches_connection_and_keeps_request() {
        let (mut queue, connection) = connected_queue();
        connection.fail_sends(true);
        let _get = queue.add(ShadowRequest::get("pod")).unwrap();

        assert!(queue.take_scheduled_dispatch());
        assert!(matches!(
            queue.dispatch().await,
            Err(ShadowError::Transport { .. })
        ));
        assert!(!queue.is_connected());
        assert_eq!(queue.pending_len(), 1);
        assert!(queue.outstanding_token().is_none());

        connection.fail_sends(false);
        queue.set_connection(Some(connection.clone()));
        drain(&mut queue).await;
        assert_eq!(queue.outstanding_token().unwrap().as_str(), "client-2");
    }
}
