use super::{HilSession, Phase, SessionSummary};
use crate::cost::CostSource;
use crate::error::{Error, Result};
use crate::hil::Announcer;
use crate::human::HumanDecision;

impl<C, H, A> HilSession<C, H, A>
where
    C: CostSource + 'static,
    H: HumanDecision + 'static,
    A: Announcer + 'static,
{
    /// Run the session on a tokio runtime.
    ///
    /// Like [`run`](Self::run), but each tick (operator prompts and GP
    /// fits included) runs inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking) and the loop sleeps
    /// with [`tokio::time::sleep`], keeping the runtime responsive.
    ///
    /// # Errors
    ///
    /// Returns the first fatal tick error, or `Error::TaskError` if a
    /// blocking task panics.
    ///
    /// # Examples
    ///
    /// ```
    /// use hil_optimizer::cost::ReplayCostSource;
    /// use hil_optimizer::hil::{HilConfig, HilSession, RecordingAnnouncer};
    /// use hil_optimizer::human::ScriptedDecisions;
    ///
    /// # async fn example() -> hil_optimizer::Result<()> {
    /// let config = HilConfig::builder()
    ///     .range(vec![(0.0, 100.0)])
    ///     .n_exploration(2)
    ///     .n_steps(2)
    ///     .dwell_time(0.0)
    ///     .window_min_size(1)
    ///     .without_checkpoints()
    ///     .poll_interval(core::time::Duration::ZERO)
    ///     .build()?;
    /// let cost = ReplayCostSource::from_values([4.0, 4.1, 3.0, 3.2], 0.0, 1.0);
    /// let session = HilSession::new(
    ///     config,
    ///     cost,
    ///     ScriptedDecisions::accept_all(),
    ///     RecordingAnnouncer::new(),
    /// )?;
    /// let summary = session.run_async().await?;
    /// assert_eq!(summary.history.len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_async(self) -> Result<SessionSummary> {
        trace_info!(n_steps = self.config.n_steps, "async session started");

        let poll_interval = self.config.poll_interval;
        let mut session = self;
        while session.phase != Phase::Done {
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = session.tick();
                (session, outcome)
            })
            .await
            .map_err(|e| Error::TaskError(e.to_string()))?;
            session = returned;
            outcome?;

            if session.phase != Phase::Done && !poll_interval.is_zero() {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Ok(session.summary())
    }
}
