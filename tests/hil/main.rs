#![allow(clippy::float_cmp, clippy::cast_precision_loss)]

mod checkpoint_resume;
mod fit_failure;
mod phases;
mod rejection;
mod scenarios;
mod stream_session;

use core::time::Duration;

use hil_optimizer::acquisition::AcquisitionOptimizer;
use hil_optimizer::hil::{HilConfig, HilConfigBuilder};

/// Small acquisition budget so tests stay fast.
pub fn fast_acquisition() -> AcquisitionOptimizer {
    AcquisitionOptimizer::builder()
        .n_restarts(3)
        .n_raw_samples(128)
        .n_mc_samples(64)
        .build()
        .unwrap()
}

/// One dimension on `[0, 100]`, exploration at 10, 20, 30, ...; a window is
/// ready after two samples with distinct timestamps.
pub fn quick_config(n_exploration: usize, n_steps: usize) -> HilConfigBuilder {
    let fixed = (1..=n_exploration).map(|i| vec![10.0 * i as f64]).collect();
    HilConfig::builder()
        .range(vec![(0.0, 100.0)])
        .n_exploration(n_exploration)
        .n_steps(n_steps)
        .fixed_initial_points(fixed)
        .dwell_time(0.0)
        .window_min_size(1)
        .acquisition(fast_acquisition())
        .without_checkpoints()
        .poll_interval(Duration::ZERO)
}

pub fn temp_dir(label: &str) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut path = std::env::temp_dir();
    path.push(format!(
        "hil_optimizer_{label}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}
