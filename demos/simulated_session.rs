//! A complete session against a simulated subject.
//!
//! A background thread plays the subject: it publishes a noisy cost on the
//! `Met_cost` channel that depends on the parameter currently applied. The
//! session explores three parameters, asks for confirmation, then lets the
//! GP drive the parameter toward the subject's optimum at 62.
//!
//! Run with: `cargo run --example simulated_session`
//! Add `-- --interactive` to answer the prompts yourself.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hil_optimizer::prelude::*;
use parking_lot::Mutex;

const OPTIMUM: f64 = 62.0;

/// Reported value for parameter `p`: higher is better, as the sensor sends it.
fn subject_response(p: f64, rng: &mut fastrand::Rng) -> f64 {
    -(3.0 + (p - OPTIMUM).powi(2) / 400.0) + 0.05 * (rng.f64() - 0.5)
}

fn main() -> hil_optimizer::Result<()> {
    let hub = StreamHub::new();
    let config = HilConfig::builder()
        .range(vec![(0.0, 100.0)])
        .n_exploration(3)
        .n_steps(10)
        .fixed_initial_points(vec![vec![10.0], vec![50.0], vec![90.0]])
        .dwell_time(0.2)
        .window_min_size(5)
        .cost_buffer_len(64)
        .model_save_path(std::env::temp_dir().join(format!("hil_optimizer_demo_{}", std::process::id())))
        .poll_interval(Duration::from_millis(2))
        .build()?;

    let outlet = hub.advertise(&config.cost_channel_name, 1)?;
    let cost = ChannelCostSource::connect(&hub, &config.cost_channel_name, config.cost_buffer_len)?;
    let announcer =
        ChannelAnnouncer::advertise(&hub, &config.announce_channel_name, config.n_parms())?;

    let human: Box<dyn HumanDecision> = if std::env::args().any(|a| a == "--interactive") {
        Box::new(ConsoleDecision::stdio())
    } else {
        Box::new(ScriptedDecisions::accept_all())
    };

    let applied = Arc::new(Mutex::new(0.0_f64));
    let stop = Arc::new(AtomicBool::new(false));
    let subject = {
        let applied = Arc::clone(&applied);
        let stop = Arc::clone(&stop);
        let hub = hub.clone();
        std::thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(11);
            while !stop.load(Ordering::Relaxed) {
                let value = subject_response(*applied.lock(), &mut rng);
                if outlet.push_sample(&[value], hub.local_clock()).is_err() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let mut session = HilSession::new(config, cost, human, announcer)?;
    while session.phase() != Phase::Done {
        match session.tick()? {
            TickOutcome::Accepted { observation, .. } => println!(
                "n={:>2}  parameter={:>6.2}  cost={:.3}",
                session.n(),
                observation.parameter[0],
                observation.cost
            ),
            TickOutcome::TransitionAccepted { proposal } => {
                println!("first model proposes {:.2}", proposal[0]);
            }
            TickOutcome::FitFailed(failure) => println!("fit failed: {failure}"),
            _ => {}
        }
        if let Some(p) = session.current_parameter() {
            *applied.lock() = p[0];
        }
        std::thread::sleep(session.config().poll_interval);
    }

    stop.store(true, Ordering::Relaxed);
    subject.join().ok();

    let summary = session.summary();
    if let Some(best) = &summary.best {
        println!(
            "best observed: parameter={:.2} cost={:.3}",
            best.parameter[0], best.cost
        );
    }
    if let Some(next) = &summary.final_proposal {
        println!("recommendation: {:.2} (true optimum {OPTIMUM})", next[0]);
    }
    println!(
        "rejected windows: {}, dropped samples: {}",
        summary.rejected_windows,
        session.dropped_samples()
    );
    Ok(())
}
