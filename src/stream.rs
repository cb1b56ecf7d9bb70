//! In-process publish/subscribe of named numeric channels.
//!
//! A [`StreamHub`] is the rendezvous point: producers [`advertise`] a
//! channel and push samples through the returned [`Outlet`]; consumers
//! [`open_inlet`] on an advertised name and pull samples without blocking.
//! Each inlet owns a bounded buffer; when it is full the oldest sample is
//! dropped.
//!
//! [`advertise`]: StreamHub::advertise
//! [`open_inlet`]: StreamHub::open_inlet
//!
//! # Examples
//!
//! ```
//! use hil_optimizer::stream::StreamHub;
//!
//! let hub = StreamHub::new();
//! let outlet = hub.advertise("rmssd_cost", 1).unwrap();
//! let inlet = hub.open_inlet("rmssd_cost", 8).unwrap();
//!
//! outlet.push_sample(&[42.0], 1.5).unwrap();
//! assert_eq!(inlet.pull_sample(), Some((vec![42.0], 1.5)));
//! assert_eq!(inlet.pull_sample(), None);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata of an advertised channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Channel name; inlets resolve by exact match.
    pub name: String,
    /// Number of values in every sample.
    pub channel_count: usize,
}

type Buffer = Arc<Mutex<SampleBuffer>>;

struct SampleBuffer {
    samples: VecDeque<(Vec<f64>, f64)>,
    max_buflen: usize,
}

impl SampleBuffer {
    fn push(&mut self, values: Vec<f64>, timestamp: f64) {
        if self.samples.len() == self.max_buflen {
            self.samples.pop_front();
        }
        self.samples.push_back((values, timestamp));
    }
}

struct Channel {
    info: StreamInfo,
    subscribers: Mutex<Vec<Weak<Mutex<SampleBuffer>>>>,
}

struct HubInner {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    epoch: Instant,
}

/// Registry of advertised channels. Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamHub")
            .field("channels", &self.resolve())
            .finish_non_exhaustive()
    }
}

impl StreamHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: RwLock::new(HashMap::new()),
                epoch: Instant::now(),
            }),
        }
    }

    /// Seconds since the hub was created; use it to timestamp samples.
    #[must_use]
    pub fn local_clock(&self) -> f64 {
        self.inner.epoch.elapsed().as_secs_f64()
    }

    /// Publish a channel. It stays advertised until the outlet is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is already advertised or
    /// `channel_count` is zero.
    pub fn advertise(&self, name: impl Into<String>, channel_count: usize) -> Result<Outlet> {
        let name = name.into();
        if channel_count == 0 {
            return Err(Error::Configuration(format!(
                "stream '{name}' needs at least one channel"
            )));
        }
        let mut channels = self.inner.channels.write();
        if channels.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "stream '{name}' is already advertised"
            )));
        }
        let channel = Arc::new(Channel {
            info: StreamInfo {
                name: name.clone(),
                channel_count,
            },
            subscribers: Mutex::new(Vec::new()),
        });
        channels.insert(name, Arc::clone(&channel));
        Ok(Outlet {
            channel,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// All currently advertised channels, sorted by name.
    #[must_use]
    pub fn resolve(&self) -> Vec<StreamInfo> {
        let mut infos: Vec<StreamInfo> = self
            .inner
            .channels
            .read()
            .values()
            .map(|c| c.info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Subscribe to the channel called exactly `name`.
    ///
    /// Only samples pushed after this call are received.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`] (listing advertised channels whose
    /// name contains "cost") if nothing is advertised under `name`, and
    /// [`Error::Configuration`] if `max_buflen` is zero.
    pub fn open_inlet(&self, name: &str, max_buflen: usize) -> Result<Inlet> {
        if max_buflen == 0 {
            return Err(Error::Configuration(
                "inlet buffer length must be positive".into(),
            ));
        }
        let channels = self.inner.channels.read();
        let Some(channel) = channels.get(name) else {
            let mut candidates: Vec<String> = channels
                .keys()
                .filter(|k| k.to_lowercase().contains("cost"))
                .cloned()
                .collect();
            candidates.sort();
            return Err(Error::ChannelNotFound {
                name: name.to_owned(),
                candidates,
            });
        };

        let buffer: Buffer = Arc::new(Mutex::new(SampleBuffer {
            samples: VecDeque::with_capacity(max_buflen),
            max_buflen,
        }));
        channel.subscribers.lock().push(Arc::downgrade(&buffer));
        Ok(Inlet {
            info: channel.info.clone(),
            buffer,
        })
    }
}

/// Producer side of an advertised channel.
pub struct Outlet {
    channel: Arc<Channel>,
    hub: Weak<HubInner>,
}

impl Outlet {
    /// The channel metadata.
    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.channel.info
    }

    /// Deliver one sample to every open inlet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `values` does not have
    /// `channel_count` entries.
    pub fn push_sample(&self, values: &[f64], timestamp: f64) -> Result<()> {
        if values.len() != self.channel.info.channel_count {
            return Err(Error::DimensionMismatch {
                expected: self.channel.info.channel_count,
                got: values.len(),
            });
        }
        let mut subscribers = self.channel.subscribers.lock();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(buffer) => {
                buffer.lock().push(values.to_vec(), timestamp);
                true
            }
            None => false,
        });
        Ok(())
    }

    /// Number of inlets still subscribed.
    #[must_use]
    pub fn n_subscribers(&self) -> usize {
        self.channel
            .subscribers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl Drop for Outlet {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut channels = hub.channels.write();
            if channels
                .get(&self.channel.info.name)
                .is_some_and(|c| Arc::ptr_eq(c, &self.channel))
            {
                channels.remove(&self.channel.info.name);
            }
        }
    }
}

impl core::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Outlet")
            .field("info", &self.channel.info)
            .finish_non_exhaustive()
    }
}

/// Consumer side of a channel, with its own bounded buffer.
pub struct Inlet {
    info: StreamInfo,
    buffer: Buffer,
}

impl Inlet {
    /// The channel metadata.
    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// The oldest buffered `(values, timestamp)`, or `None` if nothing is waiting.
    #[must_use]
    pub fn pull_sample(&self) -> Option<(Vec<f64>, f64)> {
        self.buffer.lock().samples.pop_front()
    }

    /// Number of buffered samples.
    #[must_use]
    pub fn samples_available(&self) -> usize {
        self.buffer.lock().samples.len()
    }

    /// Drop every buffered sample and return how many were dropped.
    pub fn flush(&self) -> usize {
        let mut buffer = self.buffer.lock();
        let n = buffer.samples.len();
        buffer.samples.clear();
        n
    }
}

impl core::fmt::Debug for Inlet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inlet")
            .field("info", &self.info)
            .field("buffered", &self.samples_available())
            .finish()
    }
}
