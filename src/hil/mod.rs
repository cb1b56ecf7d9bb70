//! The human-in-the-loop control loop.
//!
//! A [`HilSession`] owns the observation history, the current cost window
//! and the [`Engine`]. Every [`tick`](HilSession::tick) performs one
//! iteration of the state machine:
//!
//! ```text
//! WARMUP ──go──▶ EXPLORATION ──n == n_exploration──▶ CONFIRM_TRANSITION
//!                   ▲   │                                │ accept: first fit
//!              reject└───┘                                ▼
//!                          DONE ◀──n == n_steps── OPTIMIZATION ◀┐
//!                                                      │ reject │
//!                                                      └────────┘
//! ```
//!
//! - **Warmup** waits for the operator's go-ahead.
//! - **Exploration** and **Optimization** poll one cost sample per tick.
//!   Once the window is long enough the operator accepts or rejects it.
//!   Accepting records `(parameter, tail mean)`. In optimization it also
//!   refits the engine warm and takes its proposal as the next parameter.
//! - **`ConfirmTransition`** shows the exploration history once more. On
//!   accept the engine fits its first (cold) model.
//!
//! Samples are negated when they enter the window, so every stored cost is
//! on the minimization scale. A failed fit during optimization keeps the
//! window and the candidate, and the operator is asked again on the next tick.

mod announce;
#[cfg(feature = "async")]
mod async_impl;
mod config;
mod window;

use serde::{Deserialize, Serialize};

pub use self::announce::{Announcer, ChannelAnnouncer, RecordingAnnouncer, SessionEvent};
pub use self::config::{
    DEFAULT_ANNOUNCE_CHANNEL, DEFAULT_COST_CHANNEL, HilConfig, HilConfigBuilder,
};
pub use self::window::{CostWindow, Rejection};
use crate::cost::CostSource;
use crate::engine::Engine;
use crate::error::{Error, FitFailure, Result};
use crate::human::{Decision, HumanDecision, WindowSummary};
use crate::storage::Checkpoint;
#[cfg(feature = "journal")]
use crate::storage::ObservationJournal;
pub use crate::storage::Observation;

const WARMUP_PROMPT: &str = "Please give 2 min of warmup and hit enter to continue";

/// Where the session is in its protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for the operator's go-ahead.
    Warmup,
    /// Collecting costs at the initial design points.
    Exploration,
    /// One-shot operator confirmation before the first fit.
    ConfirmTransition,
    /// Collecting costs at engine proposals.
    Optimization,
    /// The step budget is spent.
    Done,
}

/// What a single [`tick`](HilSession::tick) did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The operator gave the warm-up go-ahead.
    WarmedUp,
    /// The window is not ready yet.
    Collecting {
        /// Samples in the window after this tick.
        window_len: usize,
    },
    /// The operator rejected the window; it was discarded.
    Rejected,
    /// The operator accepted the window.
    Accepted {
        /// The recorded observation.
        observation: Observation,
        /// The engine's next parameter, in optimization.
        proposal: Option<Vec<f64>>,
    },
    /// The operator rejected the exploration history at the gate.
    TransitionRejected,
    /// The gate was accepted and the first model proposed a parameter.
    TransitionAccepted {
        /// The first engine proposal.
        proposal: Vec<f64>,
    },
    /// The GP could not be fitted; nothing was recorded and the window is kept.
    FitFailed(FitFailure),
    /// The session is finished.
    Done,
}

/// Result of a completed session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// All accepted observations, in order.
    pub history: Vec<Observation>,
    /// The observation with the lowest cost.
    pub best: Option<Observation>,
    /// The engine's last proposal (its recommendation).
    pub final_proposal: Option<Vec<f64>>,
    /// Windows the operator rejected.
    pub rejected_windows: usize,
    /// Ticks on which the GP fit failed.
    pub fit_failures: usize,
}

/// One supervised optimization session.
///
/// # Examples
///
/// ```no_run
/// use hil_optimizer::cost::ChannelCostSource;
/// use hil_optimizer::hil::{ChannelAnnouncer, HilConfig, HilSession};
/// use hil_optimizer::human::ConsoleDecision;
/// use hil_optimizer::stream::StreamHub;
///
/// let hub = StreamHub::new();
/// let config = HilConfig::builder()
///     .range(vec![(0.0, 100.0)])
///     .n_exploration(3)
///     .n_steps(10)
///     .build()
///     .unwrap();
/// let cost = ChannelCostSource::connect(&hub, &config.cost_channel_name, config.cost_buffer_len)
///     .unwrap();
/// let announcer =
///     ChannelAnnouncer::advertise(&hub, &config.announce_channel_name, config.n_parms()).unwrap();
/// let mut session =
///     HilSession::new(config, cost, ConsoleDecision::stdio(), announcer).unwrap();
/// let summary = session.run().unwrap();
/// println!("best: {:?}", summary.best);
/// ```
pub struct HilSession<C, H, A> {
    config: HilConfig,
    engine: Engine,
    phase: Phase,
    /// Parameter `i` is the one observation `i` is (or will be) measured under.
    candidates: Vec<Vec<f64>>,
    history: Vec<Observation>,
    window: CostWindow,
    cost: C,
    human: H,
    announcer: A,
    rejected_windows: usize,
    fit_failures: usize,
    dropped_samples: usize,
    #[cfg(feature = "journal")]
    journal: Option<ObservationJournal>,
}

impl<C, H, A> HilSession<C, H, A>
where
    C: CostSource,
    H: HumanDecision,
    A: Announcer,
{
    /// Start a new session: validate `config`, build the engine and
    /// generate the exploration parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config.
    pub fn new(config: HilConfig, cost: C, human: H, announcer: A) -> Result<Self> {
        config.validate()?;
        let engine = Engine::new(config.engine.clone())?;
        let candidates = config
            .initial_design
            .generate(engine.domain(), config.n_start_points)?;

        trace_info!(
            n_exploration = config.n_exploration,
            n_steps = config.n_steps,
            "session created"
        );

        Ok(Self {
            engine,
            phase: Phase::Warmup,
            candidates,
            history: Vec::new(),
            window: CostWindow::new(),
            cost,
            human,
            announcer,
            rejected_windows: 0,
            fit_failures: 0,
            dropped_samples: 0,
            #[cfg(feature = "journal")]
            journal: None,
            config,
        })
    }

    /// Rebuild a session from a checkpoint and continue in optimization.
    ///
    /// The engine takes the saved hyperparameters, refits warm on the saved
    /// history and proposes the next parameter. No warm-up is requested and
    /// the checkpoint being resumed from is left as it was.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the checkpoint does not match the
    /// config (dimension, kernel family, fewer than `n_exploration`
    /// observations), or any engine error from the refit.
    pub fn resume(
        config: HilConfig,
        checkpoint: &Checkpoint,
        cost: C,
        human: H,
        announcer: A,
    ) -> Result<Self> {
        config.validate()?;
        if checkpoint.x.len() < config.n_exploration {
            return Err(Error::Configuration(format!(
                "checkpoint holds {} observations, fewer than n_exploration ({})",
                checkpoint.x.len(),
                config.n_exploration
            )));
        }
        if checkpoint.x.len() != checkpoint.y.len() {
            return Err(Error::Shape {
                x_rows: checkpoint.x.len(),
                y_rows: checkpoint.y.len(),
            });
        }

        let mut engine = Engine::new(config.engine.clone())?;
        engine.restore(checkpoint)?;
        let history: Vec<Observation> = checkpoint
            .x
            .iter()
            .zip(&checkpoint.y)
            .map(|(p, &c)| Observation {
                parameter: p.clone(),
                cost: c,
            })
            .collect();

        let mut candidates = checkpoint.x.clone();
        let phase = if history.len() >= config.n_steps {
            Phase::Done
        } else {
            candidates.push(engine.run_unsaved(&checkpoint.x, &checkpoint.y, true)?);
            Phase::Optimization
        };

        trace_info!(n = history.len(), ?phase, "session resumed from checkpoint");

        Ok(Self {
            engine,
            phase,
            candidates,
            history,
            window: CostWindow::new(),
            cost,
            human,
            announcer,
            rejected_windows: 0,
            fit_failures: 0,
            dropped_samples: 0,
            #[cfg(feature = "journal")]
            journal: None,
            config,
        })
    }

    /// Record every accepted observation in `journal` too.
    #[cfg(feature = "journal")]
    #[must_use]
    pub fn with_journal(mut self, journal: ObservationJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The session config.
    #[must_use]
    pub fn config(&self) -> &HilConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of accepted observations.
    #[must_use]
    pub fn n(&self) -> usize {
        self.history.len()
    }

    /// Accepted observations, in order.
    #[must_use]
    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    /// Accepted parameters, one row per observation.
    #[must_use]
    pub fn x_opt(&self) -> Vec<Vec<f64>> {
        self.history.iter().map(|o| o.parameter.clone()).collect()
    }

    /// Accepted costs (minimization scale).
    #[must_use]
    pub fn y_opt(&self) -> Vec<f64> {
        self.history.iter().map(|o| o.cost).collect()
    }

    /// The parameter the current window is collected under.
    ///
    /// When the session is done this is the engine's final recommendation.
    #[must_use]
    pub fn current_parameter(&self) -> Option<&[f64]> {
        self.candidates
            .get(self.history.len())
            .or_else(|| self.candidates.last())
            .map(Vec::as_slice)
    }

    /// The pending window.
    #[must_use]
    pub fn window(&self) -> &CostWindow {
        &self.window
    }

    /// The engine (last model, checkpoints, predictions).
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The operator.
    #[must_use]
    pub fn human(&self) -> &H {
        &self.human
    }

    /// The operator, mutably (e.g. to queue scripted answers).
    pub fn human_mut(&mut self) -> &mut H {
        &mut self.human
    }

    /// The announcer.
    #[must_use]
    pub fn announcer(&self) -> &A {
        &self.announcer
    }

    /// The cost source.
    pub fn cost_source_mut(&mut self) -> &mut C {
        &mut self.cost
    }

    /// Samples dropped at ingestion (non-finite or out of order).
    #[must_use]
    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples
    }

    /// Perform one control-loop iteration.
    ///
    /// # Errors
    ///
    /// Fit failures are reported as [`TickOutcome::FitFailed`], not as
    /// errors. Errors returned here are fatal: a prompt that cannot be
    /// answered, an announcement that cannot be delivered, or an engine
    /// error other than a fit failure.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        match self.phase {
            Phase::Warmup => self.warm_up(),
            Phase::Exploration | Phase::Optimization => self.collect(),
            Phase::ConfirmTransition => self.confirm_transition(),
            Phase::Done => Ok(TickOutcome::Done),
        }
    }

    /// Tick until the session is done, sleeping `poll_interval` between ticks.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from [`tick`](Self::tick).
    pub fn run(&mut self) -> Result<SessionSummary> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("hil_session", n_steps = self.config.n_steps).entered();

        while self.phase != Phase::Done {
            self.tick()?;
            if self.phase != Phase::Done && !self.config.poll_interval.is_zero() {
                std::thread::sleep(self.config.poll_interval);
            }
        }
        Ok(self.summary())
    }

    /// Snapshot of the session's results so far.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            history: self.history.clone(),
            best: self
                .history
                .iter()
                .min_by(|a, b| a.cost.total_cmp(&b.cost))
                .cloned(),
            final_proposal: self.engine.last_proposal().map(|p| p.candidate.clone()),
            rejected_windows: self.rejected_windows,
            fit_failures: self.fit_failures,
        }
    }

    fn warm_up(&mut self) -> Result<TickOutcome> {
        self.announcer.announce(&SessionEvent::Started)?;
        self.human.wait_for_go(WARMUP_PROMPT)?;
        self.discard_pending();
        self.set_phase(Phase::Exploration);
        Ok(TickOutcome::WarmedUp)
    }

    fn collect(&mut self) -> Result<TickOutcome> {
        if let Some(sample) = self.cost.poll()
            && self.window.ingest(sample).is_err()
        {
            self.dropped_samples += 1;
            trace_debug!(
                value = sample.value,
                timestamp = sample.timestamp,
                "cost sample dropped"
            );
        }

        if !self
            .window
            .is_ready(self.config.dwell_time, self.config.window_min_size)
        {
            return Ok(TickOutcome::Collecting {
                window_len: self.window.len(),
            });
        }

        let Some(cost) = self.window.tail_mean(self.config.window_tail) else {
            return Ok(TickOutcome::Collecting { window_len: 0 });
        };
        let parameter = self.parameter_for_next_observation()?;

        let decision = self.human.confirm(&WindowSummary {
            phase: self.phase,
            iteration: self.history.len(),
            parameter: &parameter,
            n_samples: self.window.len(),
            cost: Some(cost),
            elapsed: self.window.elapsed(),
            history: &self.history,
        })?;
        self.discard_pending();

        if decision == Decision::Reject {
            self.window.reset();
            self.rejected_windows += 1;
            trace_info!(n = self.history.len(), ?parameter, "window rejected");
            return Ok(TickOutcome::Rejected);
        }

        let observation = Observation { parameter, cost };
        if self.phase == Phase::Exploration {
            self.commit(observation.clone())?;
            if self.history.len() == self.config.n_exploration {
                self.set_phase(Phase::ConfirmTransition);
            }
            return Ok(TickOutcome::Accepted {
                observation,
                proposal: None,
            });
        }

        let mut x = self.x_opt();
        let mut y = self.y_opt();
        x.push(observation.parameter.clone());
        y.push(observation.cost);
        let proposal = match self.engine.run(&x, &y, true) {
            Ok(p) => p,
            Err(Error::Fit(failure)) => return Ok(self.fit_failed(failure)),
            Err(e) => return Err(e),
        };

        self.commit(observation.clone())?;
        self.propose(proposal.clone())?;
        if self.history.len() >= self.config.n_steps {
            self.set_phase(Phase::Done);
        }
        Ok(TickOutcome::Accepted {
            observation,
            proposal: Some(proposal),
        })
    }

    fn confirm_transition(&mut self) -> Result<TickOutcome> {
        let parameter = self
            .history
            .last()
            .map(|o| o.parameter.clone())
            .unwrap_or_default();
        let decision = self.human.confirm(&WindowSummary {
            phase: Phase::ConfirmTransition,
            iteration: self.history.len(),
            parameter: &parameter,
            n_samples: 0,
            cost: None,
            elapsed: 0.0,
            history: &self.history,
        })?;
        self.discard_pending();

        if decision == Decision::Reject {
            self.window.reset();
            trace_info!(n = self.history.len(), "transition rejected");
            return Ok(TickOutcome::TransitionRejected);
        }

        let proposal = match self.engine.run(&self.x_opt(), &self.y_opt(), false) {
            Ok(p) => p,
            Err(Error::Fit(failure)) => return Ok(self.fit_failed(failure)),
            Err(e) => return Err(e),
        };
        self.propose(proposal.clone())?;
        self.window.reset();
        if self.history.len() >= self.config.n_steps {
            self.set_phase(Phase::Done);
        } else {
            self.set_phase(Phase::Optimization);
        }
        Ok(TickOutcome::TransitionAccepted { proposal })
    }

    /// The parameter the next accepted observation will be recorded under.
    fn parameter_for_next_observation(&self) -> Result<Vec<f64>> {
        self.candidates
            .get(self.history.len())
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no candidate parameter for observation {}",
                    self.history.len()
                ))
            })
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn commit(&mut self, observation: Observation) -> Result<()> {
        trace_info!(
            n = self.history.len() + 1,
            parameter = ?observation.parameter,
            cost = observation.cost,
            "observation recorded"
        );
        self.announcer.announce(&SessionEvent::Observation {
            parameter: observation.parameter.clone(),
            cost: observation.cost,
        })?;
        #[cfg(feature = "journal")]
        if let Some(journal) = &self.journal
            && let Err(err) = journal.append(&observation)
        {
            trace_warn!(error = %err, "journal append failed");
        }
        self.history.push(observation);
        self.window.reset();
        Ok(())
    }

    fn propose(&mut self, proposal: Vec<f64>) -> Result<()> {
        trace_info!(n = self.history.len(), parameter = ?proposal, "next parameter");
        self.announcer.announce(&SessionEvent::Proposal {
            parameter: proposal.clone(),
        })?;
        self.candidates.truncate(self.history.len());
        self.candidates.push(proposal);
        Ok(())
    }

    fn fit_failed(&mut self, failure: FitFailure) -> TickOutcome {
        self.fit_failures += 1;
        trace_warn!(%failure, n = self.history.len(), phase = ?self.phase, "GP fit failed");
        let retried = if self.phase == Phase::ConfirmTransition {
            "the transition"
        } else {
            "the window"
        };
        self.human
            .notify(&format!("model fit failed ({failure}); {retried} will be offered again"));
        TickOutcome::FitFailed(failure)
    }

    fn discard_pending(&mut self) {
        let dropped = self.cost.discard_pending();
        self.dropped_samples += dropped;
        if dropped > 0 {
            trace_debug!(dropped, "samples arrived during a prompt and were discarded");
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        trace_info!(from = ?self.phase, to = ?phase, n = self.history.len(), "phase transition");
        self.phase = phase;
    }
}

impl<C, H, A> core::fmt::Debug for HilSession<C, H, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HilSession")
            .field("phase", &self.phase)
            .field("n", &self.history.len())
            .field("window_len", &self.window.len())
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}
