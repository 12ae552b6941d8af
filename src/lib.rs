#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sequencer Core
//!
//! Timeline sequencing and device-shadow synchronization for live session pods.
//!
//! ## Overview
//!
//! A pod plays a session: an ordered list of typed parts (pre-roll, warmup,
//! live class, post-roll, ...) anchored to a wall-clock start time. The
//! session arrives as the desired state of the pod's device shadow. This
//! crate turns that document into a canonical timeline, decides at any
//! instant which part is active and which one must start preloading, and
//! keeps the shadow in sync over a transport that can only correlate one
//! request at a time.
//!
//! ## Module Organization
//!
//! - [`timeline`] - Session data model, normalization and the timeline memo
//! - [`scheduler`] - Active/next part resolution and deadline computation
//! - [`timing`] - Clock sources and the adaptive deadline timer
//! - [`sequencer`] - The long-running scheduler loop and its published state
//! - [`shadow`] - Serialized request queue and device shadow client
//! - [`runtime`] - Binding between the shadow client and the sequencer
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sequencer_core::config::ConfigManager;
//! use sequencer_core::runtime::PodRuntime;
//! use sequencer_core::scheduler::default_metadata;
//! use sequencer_core::sequencer::SequencerService;
//! use sequencer_core::shadow::{ShadowClient, ShadowConnection, TransportEvent};
//! use sequencer_core::timing::SystemClock;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(
//! #     connection: Arc<dyn ShadowConnection>,
//! #     transport_events: mpsc::Receiver<TransportEvent>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//! sequencer_core::logging::init_structured_logging(&config.logging);
//!
//! let (client, _client_task) = ShadowClient::spawn(&config.shadow, connection, transport_events);
//! let (sequencer, _sequencer_task) = SequencerService::spawn(
//!     &config.sequencer,
//!     config.timer,
//!     Arc::new(SystemClock),
//!     default_metadata(&config.sequencer),
//! );
//!
//! PodRuntime::new(client, sequencer, config).run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Timing tests run on tokio's paused clock through [`timing::TokioClock`],
//! so hour-long sessions complete instantly:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod scheduler;
pub mod sequencer;
pub mod shadow;
pub mod test_helpers;
pub mod timeline;
pub mod timing;

pub use config::{ConfigManager, SequencerConfig};
pub use error::{ErrorClass, Result, SequencerError};
pub use runtime::PodRuntime;
pub use scheduler::{PartMetadata, PartScheduler, ResolvedPart, SchedulerDecision};
pub use sequencer::{SequencerHandle, SequencerService, SequencerSnapshot, SequencerState};
pub use shadow::{ShadowClient, ShadowConnection, ShadowError, ShadowEvent, TransportEvent};
pub use timeline::{normalize, RawPart, RawSequence, Timeline, TimelinePart};
pub use timing::{Clock, DeadlineTimer, SystemClock, TokioClock};
