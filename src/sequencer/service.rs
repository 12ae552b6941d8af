//! # Sequencer Service
//!
//! The explicit scheduler loop. One task owns the timeline cache, the
//! deadline timer and the current sequence. Every evaluation re-arms the
//! timer with the computed deadline, and the result is published on a
//! `watch` channel.
//!
//! ```rust,no_run
//! use sequencer_core::config::SequencerConfig;
//! use sequencer_core::scheduler::default_metadata;
//! use sequencer_core::sequencer::SequencerService;
//! use sequencer_core::timing::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn example(session: sequencer_core::timeline::RawSequence) -> sequencer_core::Result<()> {
//! let config = SequencerConfig::default();
//! let (sequencer, _task) = SequencerService::spawn(
//!     &config.sequencer,
//!     config.timer,
//!     Arc::new(SystemClock),
//!     default_metadata(&config.sequencer),
//! );
//!
//! sequencer.set_sequence(Some(session)).await?;
//! let mut states = sequencer.subscribe();
//! while states.changed().await.is_ok() {
//!     println!("{:?}", states.borrow().current_type());
//! }
//! # Ok(())
//! # }
//! ```

use super::snapshot::{SequencerSnapshot, SequencerState};
use crate::config::{DeadlineTimerConfig, SchedulingConfig};
use crate::error::{Result, SequencerError};
use crate::logging::{log_error, log_sequencer_transition};
use crate::scheduler::{PartMetadata, PartScheduler, SchedulerDecision};
use crate::timeline::{RawSequence, SequenceKey, TimelineCache};
use crate::timing::{Clock, DeadlineTimer};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type CommandResponder<T> = oneshot::Sender<Result<T>>;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
enum SequencerCommand {
    SetSequence {
        sequence: Option<RawSequence>,
        resp: CommandResponder<()>,
    },
    SetSpeed {
        speed: f64,
        resp: CommandResponder<()>,
    },
    EvaluateNow {
        resp: CommandResponder<SequencerState>,
    },
    Shutdown {
        resp: CommandResponder<()>,
    },
}

/// Cloneable handle to a running sequencer service
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    commands: mpsc::Sender<SequencerCommand>,
    state: watch::Receiver<SequencerState>,
}

impl SequencerHandle {
    /// Load a sequence, or clear it with `None`. A sequence that fails
    /// validation is rejected and the previous one stays active.
    pub async fn set_sequence(&self, sequence: Option<RawSequence>) -> Result<()> {
        self.request(|resp| SequencerCommand::SetSequence { sequence, resp })
            .await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        self.request(|resp| SequencerCommand::SetSpeed { speed, resp })
            .await
    }

    /// Evaluate immediately instead of waiting for the next deadline
    pub async fn evaluate_now(&self) -> Result<SequencerState> {
        self.request(|resp| SequencerCommand::EvaluateNow { resp })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request(|resp| SequencerCommand::Shutdown { resp })
            .await
    }

    /// Latest published state
    pub fn state(&self) -> SequencerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SequencerState> {
        self.state.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(CommandResponder<T>) -> SequencerCommand,
    ) -> Result<T> {
        let (resp, receiver) = oneshot::channel();
        self.commands
            .send(command(resp))
            .await
            .map_err(|_| SequencerError::channel_closed("sequencer"))?;
        receiver
            .await
            .map_err(|_| SequencerError::channel_closed("sequencer"))?
    }
}

/// Tracks what was last logged as a transition
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransitionKey {
    current: String,
    next: Option<String>,
    preloading: bool,
}

impl TransitionKey {
    fn of(decision: &SchedulerDecision) -> Self {
        Self {
            current: decision.current.part_type.clone(),
            next: decision.next.as_ref().map(|n| n.part_type.clone()),
            preloading: decision.next.as_ref().is_some_and(|n| n.preloading),
        }
    }
}

pub struct SequencerService {
    scheduler: PartScheduler,
    metadata: Arc<dyn PartMetadata>,
    clock: Arc<dyn Clock>,
    timer: DeadlineTimer,
    cache: TimelineCache,
    sequence: Option<RawSequence>,
    /// Bumped whenever `sequence` is replaced; keys the timeline cache
    sequence_version: u64,
    speed: f64,
    debug: bool,
    commands: mpsc::Receiver<SequencerCommand>,
    wake_sender: mpsc::Sender<()>,
    wake_receiver: mpsc::Receiver<()>,
    state: watch::Sender<SequencerState>,
    evaluations: u64,
    last_transition: Option<TransitionKey>,
}

impl SequencerService {
    /// Start the service task
    pub fn spawn(
        config: &SchedulingConfig,
        timer_config: DeadlineTimerConfig,
        clock: Arc<dyn Clock>,
        metadata: Arc<dyn PartMetadata>,
    ) -> (SequencerHandle, JoinHandle<Result<()>>) {
        let (command_sender, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        // One slot: a pending wake already covers any later one
        let (wake_sender, wake_receiver) = mpsc::channel(1);
        let (state, state_receiver) = watch::channel(SequencerState::Idle);

        let service = Self {
            scheduler: PartScheduler::from_config(config),
            metadata,
            timer: DeadlineTimer::new(Arc::clone(&clock), timer_config),
            clock,
            cache: TimelineCache::new(),
            sequence: None,
            sequence_version: 0,
            speed: config.speed,
            debug: config.debug,
            commands,
            wake_sender,
            wake_receiver,
            state,
            evaluations: 0,
            last_transition: None,
        };

        info!(speed = config.speed, "🎬 Starting sequencer service");
        let task = tokio::spawn(service.run());

        let handle = SequencerHandle {
            commands: command_sender,
            state: state_receiver,
        };
        (handle, task)
    }

    async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.timer.cancel();

        if let Err(error) = &result {
            log_error("sequencer", "evaluate", &error.to_string(), None);
            self.state
                .send_replace(SequencerState::Faulted(error.to_string()));
        }
        info!(evaluations = self.evaluations, "🎬 Sequencer service stopped");
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SequencerCommand::Shutdown { resp }) => {
                        let _ = resp.send(Ok(()));
                        return Ok(());
                    }
                    Some(command) => self.handle_command(command)?,
                    None => return Ok(()),
                },
                Some(()) = self.wake_receiver.recv() => {
                    if let Err(error) = self.evaluate() {
                        if error.is_fatal() {
                            return Err(error);
                        }
                        warn!(error = %error, "Evaluation failed");
                    }
                }
            }
        }
    }

    /// Returns an error only when the service must stop
    fn handle_command(&mut self, command: SequencerCommand) -> Result<()> {
        match command {
            SequencerCommand::SetSequence {
                sequence: Some(sequence),
                resp,
            } => {
                let version = self.sequence_version + 1;
                let key = SequenceKey::versioned(version, self.speed);
                if let Err(error) = self.cache.get_or_normalize_keyed(key, &sequence, self.speed) {
                    warn!(error = %error, "Rejected sequence");
                    let _ = resp.send(Err(error));
                    return Ok(());
                }
                info!(
                    starts_at = %sequence.starts_at,
                    parts = sequence.parts.len(),
                    "Sequence loaded"
                );
                self.sequence = Some(sequence);
                self.sequence_version = version;
                self.evaluate_and_reply(resp, |_| ())
            }
            SequencerCommand::SetSequence {
                sequence: None,
                resp,
            } => {
                self.clear();
                let _ = resp.send(Ok(()));
                Ok(())
            }
            SequencerCommand::SetSpeed { speed, resp } => {
                if !speed.is_finite() || speed <= 0.0 {
                    let _ = resp.send(Err(SequencerError::validation(
                        "sequencer",
                        format!("speed must be a finite number greater than zero, got {speed}"),
                    )));
                    return Ok(());
                }
                if let Some(sequence) = &self.sequence {
                    let key = SequenceKey::versioned(self.sequence_version, speed);
                    if let Err(error) = self.cache.get_or_normalize_keyed(key, sequence, speed) {
                        let _ = resp.send(Err(error));
                        return Ok(());
                    }
                }
                info!(speed = speed, "Playback speed changed");
                self.speed = speed;
                self.evaluate_and_reply(resp, |_| ())
            }
            SequencerCommand::EvaluateNow { resp } => self.evaluate_and_reply(resp, |state| state),
            SequencerCommand::Shutdown { resp } => {
                let _ = resp.send(Ok(()));
                Ok(())
            }
        }
    }

    fn evaluate_and_reply<T>(
        &mut self,
        resp: CommandResponder<T>,
        reply: impl FnOnce(SequencerState) -> T,
    ) -> Result<()> {
        match self.evaluate() {
            Ok(state) => {
                let _ = resp.send(Ok(reply(state)));
                Ok(())
            }
            Err(error) if error.is_fatal() => {
                let _ = resp.send(Err(SequencerError::internal_consistency(
                    "sequencer",
                    error.to_string(),
                )));
                Err(error)
            }
            Err(error) => {
                let _ = resp.send(Err(error));
                Ok(())
            }
        }
    }

    fn clear(&mut self) {
        if self.sequence.take().is_some() {
            info!("Sequence cleared");
        }
        self.cache.clear();
        self.timer.cancel();
        self.last_transition = None;
        self.state.send_replace(SequencerState::Idle);
    }

    /// Run the scheduler at the current instant, publish the result and
    /// re-arm the timer with its deadline
    fn evaluate(&mut self) -> Result<SequencerState> {
        let Some(sequence) = &self.sequence else {
            return Ok(SequencerState::Idle);
        };
        let key = SequenceKey::versioned(self.sequence_version, self.speed);
        let timeline = self.cache.get_or_normalize_keyed(key, sequence, self.speed)?;
        let now = self.clock.now();
        let decision = self
            .scheduler
            .evaluate(&timeline, now, self.metadata.as_ref())?;
        self.evaluations += 1;

        self.log_transition(&decision);
        self.arm(decision.deadline);

        let snapshot = SequencerSnapshot::from_decision(decision, now, self.evaluations, self.speed);
        if self.debug {
            debug!(summary = %snapshot.debug_summary(), "Sequencer evaluated");
        }
        let state = SequencerState::Active(snapshot);
        self.state.send_replace(state.clone());
        Ok(state)
    }

    fn arm(&mut self, deadline: DateTime<Utc>) {
        let wake = self.wake_sender.clone();
        self.timer.arm(deadline, move || {
            let _ = wake.try_send(());
        });
    }

    fn log_transition(&mut self, decision: &SchedulerDecision) {
        let key = TransitionKey::of(decision);
        if self.last_transition.as_ref() == Some(&key) {
            return;
        }
        log_sequencer_transition(
            &key.current,
            key.next.as_deref(),
            key.preloading,
            &decision.deadline,
        );
        self.last_transition = Some(key);
    }
}
