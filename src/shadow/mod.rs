//! # Device Shadow
//!
//! Request queue and client for synchronizing a device shadow over a
//! single-channel request/response transport.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sequencer_core::config::ShadowClientConfig;
//! use sequencer_core::shadow::{ShadowClient, ShadowConnection, TransportEvent};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(
//! #     connection: Arc<dyn ShadowConnection>,
//! #     transport_events: mpsc::Receiver<TransportEvent>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ShadowClientConfig::default();
//! let (client, _worker) = ShadowClient::spawn(&config, connection, transport_events);
//!
//! client.register(&config.thing_name).await?;
//! client
//!     .report(&config.thing_name, Some(serde_json::json!({"status": "ready"})))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod errors;
pub mod events;
pub mod queue;
pub mod request;
pub mod stats;

pub use client::ShadowClient;
pub use connection::{decode_payload, ShadowConnection, TransportEvent};
pub use errors::ShadowError;
pub use events::{ShadowEvent, ShadowEventPublisher};
pub use queue::{AckOutcome, DispatchOutcome, RequestCompletion, RequestQueue};
pub use request::{CorrelationToken, ShadowAction, ShadowRequest};
pub use stats::{ClientStats, ClientStatsSnapshot};
