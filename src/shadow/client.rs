//! # Shadow Client
//!
//! Binds the request queue to the transport lifecycle and exposes the
//! application operations: publish, report, register and unregister.
//!
//! A single worker task owns the [`RequestQueue`] and the registration list.
//! It serves transport events ahead of commands from [`ShadowClient`] handles
//! and dispatches queued requests between them, so the queue is never touched
//! re-entrantly.

use super::connection::{decode_payload, ShadowConnection, TransportEvent};
use super::errors::ShadowError;
use super::events::{ShadowEvent, ShadowEventPublisher};
use super::queue::{AckOutcome, DispatchOutcome, RequestCompletion, RequestQueue};
use super::request::ShadowRequest;
use super::stats::{ClientStats, ClientStatsSnapshot};
use crate::config::ShadowClientConfig;
use crate::constants::shadow::STATUS_REJECTED;
use crate::logging::log_error;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type CommandResponder<T> = oneshot::Sender<Result<T, ShadowError>>;

/// Commands served by the client worker
#[derive(Debug)]
enum ClientCommand {
    Enqueue {
        request: ShadowRequest,
        resp: CommandResponder<RequestCompletion>,
    },
    /// Add `thing_name` to the registrations; replies whether it was new
    ClaimRegistration {
        thing_name: String,
        resp: CommandResponder<bool>,
    },
    /// Remove `thing_name` and queue its unregister; `None` when it was not registered
    ReleaseRegistration {
        thing_name: String,
        resp: CommandResponder<Option<RequestCompletion>>,
    },
    IsRegistered {
        thing_name: String,
        resp: CommandResponder<bool>,
    },
    Disconnect {
        resp: CommandResponder<()>,
    },
}

/// Cloneable handle to the shadow client worker
#[derive(Debug, Clone)]
pub struct ShadowClient {
    client_id: String,
    commands: mpsc::Sender<ClientCommand>,
    events: ShadowEventPublisher,
    stats: Arc<ClientStats>,
    register_retry_delay: Option<Duration>,
}

impl ShadowClient {
    /// Start the client worker over `connection`, consuming the transport's
    /// lifecycle events from `transport_events`.
    pub fn spawn(
        config: &ShadowClientConfig,
        connection: Arc<dyn ShadowConnection>,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> (Self, JoinHandle<Result<(), ShadowError>>) {
        let client_id = config.resolved_client_id();
        let (command_sender, command_receiver) = mpsc::channel(config.command_channel_capacity);
        let events = ShadowEventPublisher::new(config.event_channel_capacity);
        let stats = Arc::new(ClientStats::default());

        info!(
            client_id = %client_id,
            thing = %config.thing_name,
            "🔌 Starting shadow client"
        );

        let worker = ClientWorker {
            queue: RequestQueue::new(client_id.clone(), config.retired_token_capacity),
            registrations: Vec::new(),
            connection,
            commands: command_receiver,
            transport_events,
            events: events.clone(),
            stats: Arc::clone(&stats),
            debug: config.debug,
        };
        let handle = tokio::spawn(worker.run());

        let client = Self {
            client_id,
            commands: command_sender,
            events,
            stats,
            register_retry_delay: config.register_retry_delay(),
        };
        (client, handle)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShadowEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> ClientStatsSnapshot {
        self.stats.snapshot()
    }

    /// Publish `message` (serialized as JSON) on `topic`
    pub async fn publish(&self, topic: &str, message: &Value) -> Result<(), ShadowError> {
        self.enqueue(ShadowRequest::publish(topic, message)).await?.await
    }

    /// Report `state` as the thing's reported state; `None` clears it
    pub async fn report(&self, thing_name: &str, state: Option<Value>) -> Result<(), ShadowError> {
        self.enqueue(ShadowRequest::update(thing_name, state)).await?.await
    }

    /// Register the thing and fetch its shadow. A no-op while the thing is
    /// already registered. Failed attempts are retried until they succeed or
    /// the registration is withdrawn by `unregister` or `disconnect`.
    pub async fn register(&self, thing_name: &str) -> Result<(), ShadowError> {
        let claimed = self
            .request(|resp| ClientCommand::ClaimRegistration {
                thing_name: thing_name.to_string(),
                resp,
            })
            .await?;
        if !claimed {
            debug!(thing = %thing_name, "Already registered");
            return Ok(());
        }

        let mut attempt: u64 = 0;
        let mut reset = false;
        loop {
            match self.is_registered(thing_name).await {
                Ok(true) => {}
                Ok(false) => break,
                // `disconnect` resets the queue and then stops the worker
                Err(ShadowError::ChannelClosed { .. }) if reset => break,
                Err(error) => return Err(error),
            }
            attempt += 1;
            match self.register_once(thing_name).await {
                Ok(()) => {
                    info!(thing = %thing_name, attempts = attempt, "📝 Registered");
                    return Ok(());
                }
                Err(error) if error.is_fatal() || matches!(error, ShadowError::ChannelClosed { .. }) => {
                    return Err(error);
                }
                Err(error) => {
                    reset = matches!(error, ShadowError::QueueReset { .. });
                    warn!(
                        thing = %thing_name,
                        attempt = attempt,
                        error = %error,
                        "Register attempt failed, retrying"
                    );
                    match self.register_retry_delay {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => tokio::task::yield_now().await,
                    }
                }
            }
        }
        debug!(thing = %thing_name, "Registration withdrawn before it completed");
        Ok(())
    }

    /// Unregister the thing. A no-op when it is not registered.
    pub async fn unregister(&self, thing_name: &str) -> Result<(), ShadowError> {
        let completion = self
            .request(|resp| ClientCommand::ReleaseRegistration {
                thing_name: thing_name.to_string(),
                resp,
            })
            .await?;
        match completion {
            Some(completion) => completion.await,
            None => Ok(()),
        }
    }

    pub async fn is_registered(&self, thing_name: &str) -> Result<bool, ShadowError> {
        self.request(|resp| ClientCommand::IsRegistered {
            thing_name: thing_name.to_string(),
            resp,
        })
        .await
    }

    /// Reset the queue, drop all registrations and end the connection
    /// immediately. The worker exits afterwards.
    pub async fn disconnect(&self) -> Result<(), ShadowError> {
        self.request(|resp| ClientCommand::Disconnect { resp }).await
    }

    /// Enqueue a raw request, returning its completion without awaiting it
    pub async fn enqueue(&self, request: ShadowRequest) -> Result<RequestCompletion, ShadowError> {
        self.request(|resp| ClientCommand::Enqueue { request, resp })
            .await
    }

    async fn register_once(&self, thing_name: &str) -> Result<(), ShadowError> {
        self.enqueue(ShadowRequest::register(thing_name)).await?.await?;
        self.enqueue(ShadowRequest::get(thing_name)).await?.await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(CommandResponder<T>) -> ClientCommand,
    ) -> Result<T, ShadowError> {
        let (resp, receiver) = oneshot::channel();
        self.commands
            .send(command(resp))
            .await
            .map_err(|_| ShadowError::channel_closed("shadow client"))?;
        receiver
            .await
            .map_err(|_| ShadowError::channel_closed("shadow client"))?
    }
}

struct ClientWorker {
    queue: RequestQueue,
    registrations: Vec<String>,
    connection: Arc<dyn ShadowConnection>,
    commands: mpsc::Receiver<ClientCommand>,
    transport_events: mpsc::Receiver<TransportEvent>,
    events: ShadowEventPublisher,
    stats: Arc<ClientStats>,
    debug: bool,
}

enum Flow {
    Continue,
    Stop,
}

impl ClientWorker {
    async fn run(mut self) -> Result<(), ShadowError> {
        let result = self.serve().await;
        if let Err(error) = &result {
            log_error("shadow_client", "serve", &error.to_string(), None);
            self.queue.reset();
        }
        info!(client_id = %self.queue.client_id(), "🔌 Shadow client stopped");
        result
    }

    async fn serve(&mut self) -> Result<(), ShadowError> {
        loop {
            // Dispatch deferred from the previous command or event
            if self.queue.take_scheduled_dispatch() {
                self.dispatch().await;
                continue;
            }

            // Transport events take priority over commands
            let flow = tokio::select! {
                biased;

                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event)?,
                    None => {
                        warn!("Transport event stream ended");
                        Flow::Stop
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All client handles dropped");
                        Flow::Stop
                    }
                },
            };

            if let Flow::Stop = flow {
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self) {
        match self.queue.dispatch().await {
            Ok(DispatchOutcome::Idle) => {}
            Ok(DispatchOutcome::AwaitingAck { .. }) => self.stats.record_message_out(),
            Ok(DispatchOutcome::Sent { .. }) => self.stats.record_message_out(),
            Err(error) => {
                error!(error = %error, "Shadow request send failed, awaiting reconnect");
            }
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Flow {
        match command {
            ClientCommand::Enqueue { request, resp } => {
                let _ = resp.send(self.queue.add(request));
            }
            ClientCommand::ClaimRegistration { thing_name, resp } => {
                let claimed = !self.registrations.contains(&thing_name);
                if claimed {
                    self.registrations.push(thing_name);
                }
                let _ = resp.send(Ok(claimed));
            }
            ClientCommand::ReleaseRegistration { thing_name, resp } => {
                let reply = match self.registrations.iter().position(|t| *t == thing_name) {
                    Some(index) => {
                        self.registrations.remove(index);
                        self.queue.add(ShadowRequest::unregister(thing_name)).map(Some)
                    }
                    None => Ok(None),
                };
                let _ = resp.send(reply);
            }
            ClientCommand::IsRegistered { thing_name, resp } => {
                let _ = resp.send(Ok(self.registrations.contains(&thing_name)));
            }
            ClientCommand::Disconnect { resp } => {
                info!("Disconnecting shadow client");
                self.queue.reset();
                self.registrations.clear();
                let result = self.connection.end(true).await;
                let _ = resp.send(result);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn handle_transport_event(&mut self, event: TransportEvent) -> Result<Flow, ShadowError> {
        match event {
            TransportEvent::Connect => {
                info!("Connected");
                self.queue.set_connection(Some(Arc::clone(&self.connection)));
                self.events.publish(ShadowEvent::Connected);
            }
            TransportEvent::Reconnect => info!("Reconnect"),
            TransportEvent::Close => {
                info!("Connection closed");
                self.events.publish(ShadowEvent::Closed);
            }
            TransportEvent::Offline => {
                info!("Disconnected");
                self.queue.set_connection(None);
                self.events.publish(ShadowEvent::Offline);
            }
            TransportEvent::Error(message) => {
                error!(error = %message, "Connection error");
            }
            TransportEvent::Status {
                thing_name,
                result,
                token,
                shadow,
            } => {
                self.stats.record_status();
                let failed = result == STATUS_REJECTED;
                if failed {
                    error!(thing = %thing_name, request_id = %token, result = %result, "Received rejected status");
                }
                self.acknowledge(&token, failed)?;
                self.events
                    .publish(ShadowEvent::ThingShadowChanged { thing_name, shadow });
            }
            TransportEvent::Timeout { thing_name, token } => {
                warn!(thing = %thing_name, request_id = %token, "Request timed out");
                self.queue.retry_request(&token);
            }
            TransportEvent::ForeignStateChange {
                thing_name,
                operation,
                shadow,
            } => {
                self.stats.record_foreign_state_change();
                info!(thing = %thing_name, operation = %operation, "Remote shadow change");
                self.events
                    .publish(ShadowEvent::ThingShadowChanged { thing_name, shadow });
            }
            TransportEvent::Registered { token, error } => {
                if let Some(reason) = &error {
                    warn!(request_id = %token, error = %reason, "Register rejected");
                }
                self.acknowledge(&token, error.is_some())?;
            }
            TransportEvent::Message { topic, payload } => {
                self.stats.record_message_in();
                info!(topic = %topic, message = %String::from_utf8_lossy(&payload), "Message received");
            }
            TransportEvent::PacketSent(packet) => {
                self.stats.record_packet_out();
                if self.debug {
                    debug!(payload = %decode_payload(&packet), "Send");
                }
            }
            TransportEvent::PacketReceived(packet) => {
                self.stats.record_packet_in(packet.len());
                if self.debug {
                    debug!(payload = %decode_payload(&packet), "Receive");
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn acknowledge(&mut self, token: &str, failed: bool) -> Result<(), ShadowError> {
        match self.queue.mark_complete(token, failed) {
            Ok(AckOutcome::Completed | AckOutcome::Stale) => Ok(()),
            Err(error) => {
                error!(request_id = %token, error = %error, "💥 Shadow queue corrupted");
                Err(error)
            }
        }
    }
}
