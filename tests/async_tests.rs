//! Async integration tests for the session loop.
//!
//! These tests are only compiled when the `async` feature is enabled.

#![cfg(feature = "async")]

use core::time::Duration;

use hil_optimizer::cost::ReplayCostSource;
use hil_optimizer::hil::{HilConfig, HilSession, RecordingAnnouncer};
use hil_optimizer::human::{Decision, ScriptedDecisions};
use hil_optimizer::{Error, Result};

fn config(n_exploration: usize, n_steps: usize) -> HilConfig {
    HilConfig::builder()
        .range(vec![(0.0, 100.0)])
        .n_exploration(n_exploration)
        .n_steps(n_steps)
        .dwell_time(0.0)
        .window_min_size(1)
        .without_checkpoints()
        .poll_interval(Duration::from_millis(1))
        .build()
        .unwrap()
}

#[tokio::test]
async fn run_async_completes_session() {
    let values: Vec<f64> = (0..30_i32).map(|i| 4.0 + 0.5 * f64::from(i % 3)).collect();
    let session = HilSession::new(
        config(2, 4),
        ReplayCostSource::from_values(values, 0.0, 1.0),
        ScriptedDecisions::new([Decision::Reject]),
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let summary = session.run_async().await.unwrap();
    assert_eq!(summary.history.len(), 4);
    assert_eq!(summary.rejected_windows, 1);
    assert!(summary.final_proposal.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sessions_run_concurrently() {
    let handles: Vec<_> = (0..3_u32)
        .map(|k| {
            let values: Vec<f64> = (0..12_u32).map(|i| f64::from(k + i % 4)).collect();
            let session = HilSession::new(
                config(2, 3),
                ReplayCostSource::from_values(values, 0.0, 1.0),
                ScriptedDecisions::accept_all(),
                RecordingAnnouncer::new(),
            )
            .unwrap();
            tokio::spawn(session.run_async())
        })
        .collect();

    for handle in handles {
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.history.len(), 3);
    }
}

/// An operator whose terminal went away.
struct ClosedTerminal;

impl hil_optimizer::human::HumanDecision for ClosedTerminal {
    fn wait_for_go(&mut self, _prompt: &str) -> Result<()> {
        Err(Error::Prompt("input closed".into()))
    }

    fn confirm(&mut self, _summary: &hil_optimizer::human::WindowSummary<'_>) -> Result<Decision> {
        Err(Error::Prompt("input closed".into()))
    }
}

#[tokio::test]
async fn prompt_failure_ends_the_session() {
    let session = HilSession::new(
        config(2, 2),
        ReplayCostSource::default(),
        ClosedTerminal,
        RecordingAnnouncer::new(),
    )
    .unwrap();

    let err = session.run_async().await.unwrap_err();
    assert!(matches!(err, Error::Prompt(_)));
}
