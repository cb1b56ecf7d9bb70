//! The cost window collected under one parameter.
//!
//! A window turns the raw sample stream into a single observation: samples
//! are negated on entry, dropped when non-finite or out of order, and
//! summarized by the mean of the newest few.

use crate::cost::CostSample;

/// Why a sample did not enter the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The value was NaN or infinite.
    NonFinite,
    /// The timestamp was older than the newest sample in the window.
    Stale,
}

/// Cost samples collected under the current parameter.
///
/// Values are stored negated, on the minimization scale the engine works
/// on. The window starts at the timestamp of its first sample and its
/// timestamps never decrease.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostWindow {
    values: Vec<f64>,
    start: Option<f64>,
    last: Option<f64>,
}

impl CostWindow {
    /// An empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw (maximize-oriented) sample, negating it.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reason if the sample was dropped.
    pub fn ingest(&mut self, sample: CostSample) -> Result<(), Rejection> {
        if !(sample.value.is_finite() && sample.timestamp.is_finite()) {
            return Err(Rejection::NonFinite);
        }
        if self.last.is_some_and(|last| sample.timestamp < last) {
            return Err(Rejection::Stale);
        }
        self.values.push(-sample.value);
        self.start.get_or_insert(sample.timestamp);
        self.last = Some(sample.timestamp);
        Ok(())
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if no sample has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored (negated) values, oldest first.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Seconds between the first and the newest sample.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        match (self.start, self.last) {
            (Some(start), Some(last)) => last - start,
            _ => 0.0,
        }
    }

    /// `true` once the window spans more than `dwell_time` seconds and
    /// holds more than `min_size` samples.
    #[must_use]
    pub fn is_ready(&self, dwell_time: f64, min_size: usize) -> bool {
        self.elapsed() > dwell_time && self.values.len() > min_size
    }

    /// Mean of the last `k` stored values, or `None` for an empty window.
    ///
    /// Finite samples always give a finite mean, even when their sum
    /// overflows.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tail_mean(&self, k: usize) -> Option<f64> {
        let k = k.min(self.values.len());
        if k == 0 {
            return None;
        }
        let tail = &self.values[self.values.len() - k..];
        let sum = tail.iter().sum::<f64>();
        if sum.is_finite() {
            return Some(sum / k as f64);
        }
        let magnitude = tail.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        Some(tail.iter().map(|v| v / magnitude).sum::<f64>() / k as f64 * magnitude)
    }

    /// Discard every sample.
    pub fn reset(&mut self) {
        self.values.clear();
        self.start = None;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::float_cmp)]
    fn samples_are_negated_once() {
        let mut w = CostWindow::new();
        w.ingest(CostSample::new(4.0, 0.0)).unwrap();
        w.ingest(CostSample::new(-2.5, 1.0)).unwrap();
        assert_eq!(w.values(), &[-4.0, 2.5]);
        assert_eq!(w.values(), &[-4.0, 2.5]);
    }

    #[test]
    fn stale_and_non_finite_samples_dropped() {
        let mut w = CostWindow::new();
        w.ingest(CostSample::new(1.0, 5.0)).unwrap();
        assert_eq!(w.ingest(CostSample::new(1.0, 4.0)), Err(Rejection::Stale));
        assert_eq!(
            w.ingest(CostSample::new(f64::NAN, 6.0)),
            Err(Rejection::NonFinite)
        );
        assert!(w.ingest(CostSample::new(1.0, 5.0)).is_ok());
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn readiness_needs_dwell_and_size() {
        let mut w = CostWindow::new();
        for t in 0..3 {
            w.ingest(CostSample::new(1.0, f64::from(t) * 10.0)).unwrap();
        }
        assert!(w.is_ready(15.0, 2));
        assert!(!w.is_ready(20.0, 2));
        assert!(!w.is_ready(15.0, 3));
    }

    #[test]
    fn tail_mean_uses_last_k() {
        let mut w = CostWindow::new();
        for (i, v) in [10.0, 1.0, 2.0, 3.0].into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            w.ingest(CostSample::new(v, i as f64)).unwrap();
        }
        assert!((w.tail_mean(3).unwrap() + 2.0).abs() < 1e-12);
        assert!((w.tail_mean(10).unwrap() + 4.0).abs() < 1e-12);
        w.reset();
        assert!(w.tail_mean(3).is_none());
        assert!(w.elapsed().abs() < f64::EPSILON);
    }

    #[test]
    fn tail_mean_survives_overflowing_sum() {
        let mut w = CostWindow::new();
        w.ingest(CostSample::new(f64::MAX, 0.0)).unwrap();
        w.ingest(CostSample::new(f64::MAX, 1.0)).unwrap();
        let mean = w.tail_mean(2).unwrap();
        assert!(mean.is_finite());
        assert!((mean / f64::MAX + 1.0).abs() < 1e-12);
    }
}
