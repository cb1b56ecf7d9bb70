use crate::error::Result;
use crate::stream::{Outlet, StreamHub};

/// A state change downstream consumers (plots, loggers) may want to see.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session started.
    Started,
    /// An observation was accepted.
    Observation {
        /// Parameter the cost was measured under.
        parameter: Vec<f64>,
        /// Accepted cost (minimization scale).
        cost: f64,
    },
    /// The engine proposed the next parameter.
    Proposal {
        /// The new parameter.
        parameter: Vec<f64>,
    },
}

/// Sink for [`SessionEvent`]s.
pub trait Announcer: Send {
    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Implementations may fail if the event cannot be delivered.
    fn announce(&mut self, event: &SessionEvent) -> Result<()>;
}

impl<T: Announcer + ?Sized> Announcer for Box<T> {
    fn announce(&mut self, event: &SessionEvent) -> Result<()> {
        (**self).announce(event)
    }
}

/// Publishes events as `n_parms + 1` values on a hub channel.
///
/// | Event | Sample |
/// |-------|--------|
/// | `Started` | all zeros |
/// | `Observation` | `parameter ++ [cost]` |
/// | `Proposal` | `parameter ++ [NaN]` |
#[derive(Debug)]
pub struct ChannelAnnouncer {
    outlet: Outlet,
    hub: StreamHub,
    n_parms: usize,
}

impl ChannelAnnouncer {
    /// Advertise `name` on `hub` with `n_parms + 1` channels.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is already advertised.
    pub fn advertise(hub: &StreamHub, name: &str, n_parms: usize) -> Result<Self> {
        Ok(Self {
            outlet: hub.advertise(name, n_parms + 1)?,
            hub: hub.clone(),
            n_parms,
        })
    }
}

impl Announcer for ChannelAnnouncer {
    fn announce(&mut self, event: &SessionEvent) -> Result<()> {
        let sample = match event {
            SessionEvent::Started => vec![0.0; self.n_parms + 1],
            SessionEvent::Observation { parameter, cost } => {
                let mut s = parameter.clone();
                s.push(*cost);
                s
            }
            SessionEvent::Proposal { parameter } => {
                let mut s = parameter.clone();
                s.push(f64::NAN);
                s
            }
        };
        self.outlet.push_sample(&sample, self.hub.local_clock())
    }
}

/// Keeps every event in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingAnnouncer {
    events: Vec<SessionEvent>,
}

impl RecordingAnnouncer {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events announced so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&mut self, event: &SessionEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}
