//! Sources of timestamped cost samples.
//!
//! The control loop only needs [`CostSource::poll`]: a non-blocking read
//! of the next `(value, timestamp)` pair, `None` when nothing new arrived.
//! Values are reported as the collaborator produces them (maximize
//! orientation); negation happens once, in the session's cost window.

use std::collections::VecDeque;

use crate::error::Result;
use crate::stream::{Inlet, StreamHub};

/// One raw cost reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostSample {
    /// The reported value, maximize-oriented.
    pub value: f64,
    /// Collaborator timestamp in seconds.
    pub timestamp: f64,
}

impl CostSample {
    /// Creates a sample.
    #[must_use]
    pub const fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// A non-blocking source of cost samples.
pub trait CostSource: Send {
    /// The next available sample, or `None` if nothing new is waiting.
    fn poll(&mut self) -> Option<CostSample>;

    /// Discard samples that arrived while the session was not listening.
    ///
    /// Returns how many were dropped. The default keeps everything.
    fn discard_pending(&mut self) -> usize {
        0
    }
}

impl<T: CostSource + ?Sized> CostSource for Box<T> {
    fn poll(&mut self) -> Option<CostSample> {
        (**self).poll()
    }

    fn discard_pending(&mut self) -> usize {
        (**self).discard_pending()
    }
}

/// Reads cost from a named channel of a [`StreamHub`].
///
/// Multi-value samples contribute their last value.
#[derive(Debug)]
pub struct ChannelCostSource {
    inlet: Inlet,
}

impl ChannelCostSource {
    /// Connect to the channel called exactly `name`.
    ///
    /// `max_buflen` bounds how many unread samples are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if
    /// no channel of that name is advertised. The error lists advertised
    /// channels whose name contains "cost".
    pub fn connect(hub: &StreamHub, name: &str, max_buflen: usize) -> Result<Self> {
        let inlet = hub.open_inlet(name, max_buflen)?;
        trace_info!(channel = name, "connected to cost channel");
        Ok(Self { inlet })
    }

    /// The channel this source reads.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.inlet.info().name
    }
}

impl CostSource for ChannelCostSource {
    fn poll(&mut self) -> Option<CostSample> {
        let (values, timestamp) = self.inlet.pull_sample()?;
        let value = values.last().copied()?;
        Some(CostSample { value, timestamp })
    }

    fn discard_pending(&mut self) -> usize {
        self.inlet.flush()
    }
}

/// Replays a fixed list of samples, one per poll.
///
/// # Examples
///
/// ```
/// use hil_optimizer::cost::{CostSource, ReplayCostSource};
///
/// let mut source = ReplayCostSource::from_values([4.0, 4.5], 0.0, 10.0);
/// assert_eq!(source.poll().map(|s| s.timestamp), Some(0.0));
/// assert_eq!(source.poll().map(|s| s.value), Some(4.5));
/// assert!(source.poll().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReplayCostSource {
    samples: VecDeque<CostSample>,
}

impl ReplayCostSource {
    /// Replay `samples` in order.
    pub fn new(samples: impl IntoIterator<Item = CostSample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    /// Replay `values`, timestamped `start`, `start + period`, ...
    pub fn from_values(values: impl IntoIterator<Item = f64>, start: f64, period: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let samples = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| CostSample::new(v, start + period * i as f64))
            .collect();
        Self { samples }
    }

    /// Queue another sample at the end.
    pub fn push(&mut self, sample: CostSample) {
        self.samples.push_back(sample);
    }

    /// Samples not yet replayed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl CostSource for ReplayCostSource {
    fn poll(&mut self) -> Option<CostSample> {
        self.samples.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn missing_channel_lists_cost_candidates() {
        let hub = StreamHub::new();
        let _a = hub.advertise("rmssd_cost", 1).unwrap();
        let _b = hub.advertise("ecg_raw", 3).unwrap();
        let err = ChannelCostSource::connect(&hub, "metabolic_cost", 10).unwrap_err();
        match err {
            Error::ChannelNotFound { name, candidates } => {
                assert_eq!(name, "metabolic_cost");
                assert_eq!(candidates, vec!["rmssd_cost".to_owned()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn multi_value_samples_use_last_value() {
        let hub = StreamHub::new();
        let outlet = hub.advertise("cost", 3).unwrap();
        let mut source = ChannelCostSource::connect(&hub, "cost", 10).unwrap();
        assert!(source.poll().is_none());
        outlet.push_sample(&[1.0, 2.0, 3.5], 12.0).unwrap();
        let sample = source.poll().unwrap();
        assert_eq!(sample.value, 3.5);
        assert_eq!(sample.timestamp, 12.0);
    }

    #[test]
    fn discard_pending_flushes_inlet() {
        let hub = StreamHub::new();
        let outlet = hub.advertise("cost", 1).unwrap();
        let mut source = ChannelCostSource::connect(&hub, "cost", 10).unwrap();
        outlet.push_sample(&[1.0], 0.0).unwrap();
        outlet.push_sample(&[1.0], 1.0).unwrap();
        assert_eq!(source.discard_pending(), 2);
        assert!(source.poll().is_none());
    }
}
