//! # Pod Runtime
//!
//! Binds a [`ShadowClient`] to a [`SequencerHandle`]: the thing is registered
//! on every connect, the desired session in its shadow drives the sequencer,
//! and a lost connection clears the sequence. With `report_sequence_part`
//! enabled the active part type is reported back to the shadow whenever it
//! changes.

use crate::config::SequencerConfig;
use crate::error::{Result, SequencerError};
use crate::sequencer::{SequencerHandle, SequencerState};
use crate::shadow::{ShadowClient, ShadowEvent};
use crate::timeline::extract_session;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct PodRuntime {
    client: ShadowClient,
    sequencer: SequencerHandle,
    events: broadcast::Receiver<ShadowEvent>,
    states: watch::Receiver<SequencerState>,
    thing_name: String,
    report_sequence_part: bool,
    reported_part: Option<String>,
}

impl PodRuntime {
    /// Subscribes to both sides immediately, so events published after `new`
    /// returns are never missed
    pub fn new(client: ShadowClient, sequencer: SequencerHandle, config: &SequencerConfig) -> Self {
        Self {
            events: client.subscribe(),
            states: sequencer.subscribe(),
            client,
            sequencer,
            thing_name: config.shadow.thing_name.clone(),
            report_sequence_part: config.sequencer.report_sequence_part,
            reported_part: None,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Serve shadow events and sequencer updates until either side stops.
    /// Returns an error when the sequencer faults.
    pub async fn run(mut self) -> Result<()> {
        info!(thing = %self.thing_name, "🚀 Pod runtime started");

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Ok(event) => self.handle_event(event).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Shadow events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Shadow client stopped");
                        return Ok(());
                    }
                },
                changed = self.states.changed() => {
                    if changed.is_err() {
                        info!("Sequencer stopped");
                        return Ok(());
                    }
                    let state = self.states.borrow_and_update().clone();
                    self.handle_state(state)?;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ShadowEvent) -> Result<()> {
        match event {
            ShadowEvent::Connected => {
                let client = self.client.clone();
                let thing_name = self.thing_name.clone();
                // Registration retries until it succeeds, so keep it off the event loop
                tokio::spawn(async move {
                    if let Err(error) = client.register(&thing_name).await {
                        warn!(thing = %thing_name, error = %error, "Register failed");
                    }
                });
                Ok(())
            }
            ShadowEvent::Closed | ShadowEvent::Offline => {
                debug!(event = event.name(), "Connection lost, clearing sequence");
                self.reported_part = None;
                self.sequencer.set_sequence(None).await
            }
            ShadowEvent::ThingShadowChanged { thing_name, shadow } => {
                if thing_name != self.thing_name || !has_desired_state(&shadow) {
                    return Ok(());
                }
                let session = match extract_session(&shadow) {
                    Ok(session) => session,
                    Err(error) => {
                        warn!(thing = %thing_name, error = %error, "Ignoring malformed session");
                        return Ok(());
                    }
                };
                match self.sequencer.set_sequence(session).await {
                    Err(error @ SequencerError::Validation { .. }) => {
                        warn!(thing = %thing_name, error = %error, "Session rejected");
                        Ok(())
                    }
                    result => result,
                }
            }
        }
    }

    fn handle_state(&mut self, state: SequencerState) -> Result<()> {
        if let SequencerState::Faulted(message) = state {
            return Err(SequencerError::internal_consistency("sequencer", message));
        }
        if !self.report_sequence_part {
            return Ok(());
        }
        let Some(part_type) = state.current_type() else {
            return Ok(());
        };
        if self.reported_part.as_deref() == Some(part_type) {
            return Ok(());
        }
        self.reported_part = Some(part_type.to_string());

        let client = self.client.clone();
        let thing_name = self.thing_name.clone();
        let report = sequence_part_report(part_type);
        tokio::spawn(async move {
            if let Err(error) = client.report(&thing_name, Some(report)).await {
                warn!(thing = %thing_name, error = %error, "Sequence part report failed");
            }
        });
        Ok(())
    }
}

fn has_desired_state(shadow: &Value) -> bool {
    shadow
        .pointer("/state/desired")
        .is_some_and(|desired| !desired.is_null())
}

/// Reported state announcing the active part type
pub fn sequence_part_report(part_type: &str) -> Value {
    json!({ "status": { "sequencePart": part_type } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_state_detection() {
        assert!(has_desired_state(&json!({"state": {"desired": {"app": {}}}})));
        assert!(!has_desired_state(&json!({"state": {"reported": {"status": {}}}})));
        assert!(!has_desired_state(&json!({"state": {"desired": null}})));
    }

    #[test]
    fn test_sequence_part_report_shape() {
        assert_eq!(
            sequence_part_report("live"),
            json!({"status": {"sequencePart": "live"}})
        );
    }
}
