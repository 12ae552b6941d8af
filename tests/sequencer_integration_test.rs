//! End-to-end sequencing of the reference pod session on tokio's paused clock.

mod common;

use chrono::Duration;
use common::session_start;
use sequencer_core::config::{DeadlineTimerConfig, SchedulingConfig};
use sequencer_core::scheduler::{PartMetadata, PreloadByType};
use sequencer_core::sequencer::{SequencerHandle, SequencerService, SequencerState};
use sequencer_core::test_helpers::{fake_pod_session, POD_PART_TYPES};
use sequencer_core::timing::TokioClock;
use std::sync::Arc;

fn spawn_sequencer(metadata: Arc<dyn PartMetadata>) -> SequencerHandle {
    let config = SchedulingConfig {
        debug: true,
        ..SchedulingConfig::default()
    };
    let (sequencer, _task) = SequencerService::spawn(
        &config,
        DeadlineTimerConfig::default(),
        Arc::new(TokioClock::new(session_start())),
        metadata,
    );
    sequencer
}

#[tokio::test(start_paused = true)]
async fn test_pod_session_plays_every_part_in_order() {
    let sequencer = spawn_sequencer(Arc::new(PreloadByType::new().with("live", 30.0)));
    let mut states = sequencer.subscribe();
    sequencer
        .set_sequence(Some(fake_pod_session(session_start())))
        .await
        .unwrap();

    let mut played: Vec<String> = Vec::new();
    let mut live_preload_seen_at = None;
    loop {
        let state = states.borrow_and_update().clone();
        let snapshot = state.snapshot().expect("sequencer active").clone();

        if played.last() != Some(&snapshot.current.part_type) {
            played.push(snapshot.current.part_type.clone());
        }
        if live_preload_seen_at.is_none()
            && snapshot.preloading().is_some_and(|next| next.part_type == "live")
        {
            live_preload_seen_at = Some(snapshot.evaluated_at);
        }
        if snapshot.ended {
            break;
        }
        states.changed().await.unwrap();
    }

    assert_eq!(played, POD_PART_TYPES);

    // 30s lead plus the 1s margin before live starts at 240s
    let preload_at = live_preload_seen_at.expect("live preloaded");
    let expected = session_start() + Duration::seconds(209);
    assert!(preload_at >= expected, "preloaded early at {preload_at}");
    assert!(preload_at < expected + Duration::seconds(1));
}

#[tokio::test(start_paused = true)]
async fn test_transitions_fire_close_to_part_boundaries() {
    let sequencer = spawn_sequencer(Arc::new(PreloadByType::new()));
    let mut states = sequencer.subscribe();
    sequencer
        .set_sequence(Some(fake_pod_session(session_start())))
        .await
        .unwrap();

    let live = states
        .wait_for(|state| state.current_type() == Some("live"))
        .await
        .unwrap()
        .clone();
    let snapshot = live.snapshot().unwrap();
    let lateness = snapshot.evaluated_at - snapshot.current.starts_at;
    assert!(lateness >= Duration::zero());
    assert!(lateness < Duration::milliseconds(50), "late by {lateness}");
}

#[tokio::test(start_paused = true)]
async fn test_session_replaced_mid_flight() {
    let sequencer = spawn_sequencer(Arc::new(PreloadByType::new()));
    sequencer
        .set_sequence(Some(fake_pod_session(session_start())))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(300)).await;
    assert_eq!(sequencer.state().current_type(), Some("live"));

    // A rescheduled session starting an hour later puts the pod back in pre
    let later = session_start() + Duration::hours(1);
    sequencer
        .set_sequence(Some(fake_pod_session(later)))
        .await
        .unwrap();
    let state = sequencer.state();
    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.current.part_type, "pre");
    assert_eq!(snapshot.deadline, later + Duration::seconds(1));

    sequencer.set_sequence(None).await.unwrap();
    assert_eq!(sequencer.state(), SequencerState::Idle);
}
