//! The operator in the loop.
//!
//! The session never reads a terminal directly. It asks a [`HumanDecision`]
//! for the warm-up go-ahead and for an accept/reject verdict on every
//! window, so tests and demos can script the operator.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hil::Phase;
use crate::storage::Observation;

/// The operator's verdict on a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Record the window as an observation.
    Accept,
    /// Discard the window and collect again.
    Reject,
}

/// What the operator is asked to judge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSummary<'a> {
    /// Phase the session is in.
    pub phase: Phase,
    /// Number of accepted observations so far.
    pub iteration: usize,
    /// The parameter the window was collected under.
    pub parameter: &'a [f64],
    /// Number of samples in the window.
    pub n_samples: usize,
    /// Mean of the window tail on the minimization scale, if the window is non-empty.
    pub cost: Option<f64>,
    /// Seconds between the first and the last sample of the window.
    pub elapsed: f64,
    /// Observations accepted so far.
    pub history: &'a [Observation],
}

/// Source of operator decisions.
pub trait HumanDecision: Send {
    /// Block until the operator says the subject has settled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Prompt`] if the operator cannot be reached.
    fn wait_for_go(&mut self, prompt: &str) -> Result<()>;

    /// Ask the operator to accept or reject a window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Prompt`] if the operator cannot be reached.
    fn confirm(&mut self, summary: &WindowSummary<'_>) -> Result<Decision>;

    /// Show a status message (e.g. a failed fit). Ignored by default.
    fn notify(&mut self, message: &str) {
        let _ = message;
    }
}

impl<T: HumanDecision + ?Sized> HumanDecision for Box<T> {
    fn wait_for_go(&mut self, prompt: &str) -> Result<()> {
        (**self).wait_for_go(prompt)
    }

    fn confirm(&mut self, summary: &WindowSummary<'_>) -> Result<Decision> {
        (**self).confirm(summary)
    }

    fn notify(&mut self, message: &str) {
        (**self).notify(message);
    }
}

/// Line-oriented prompts on a reader/writer pair.
///
/// `N` or `n` rejects a window; any other answer accepts it.
///
/// # Examples
///
/// ```
/// use hil_optimizer::human::{ConsoleDecision, HumanDecision};
///
/// let input = b"\n" as &[u8];
/// let mut console = ConsoleDecision::new(input, Vec::new());
/// console.wait_for_go("warm up, then press enter").unwrap();
/// ```
#[derive(Debug)]
pub struct ConsoleDecision<R, W> {
    input: R,
    output: W,
}

impl ConsoleDecision<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    /// Prompt on the process's stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleDecision<R, W> {
    /// Creates a console over `input` and `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consume the console and return the writer.
    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        writeln!(self.output, "{prompt}").map_err(|e| Error::Prompt(e.to_string()))?;
        self.output
            .flush()
            .map_err(|e| Error::Prompt(e.to_string()))?;
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| Error::Prompt(e.to_string()))?;
        if n == 0 {
            return Err(Error::Prompt("operator input closed".into()));
        }
        Ok(line.trim().to_owned())
    }
}

impl<R: BufRead + Send, W: Write + Send> HumanDecision for ConsoleDecision<R, W> {
    fn wait_for_go(&mut self, prompt: &str) -> Result<()> {
        self.ask(prompt).map(drop)
    }

    fn confirm(&mut self, summary: &WindowSummary<'_>) -> Result<Decision> {
        let header = match summary.cost {
            Some(cost) => format!(
                "[{:?} {}] parameter {:?}: cost is {cost} ({} samples over {:.1}s)",
                summary.phase,
                summary.iteration,
                summary.parameter,
                summary.n_samples,
                summary.elapsed
            ),
            None => format!(
                "[{:?} {}] {} observations recorded, last parameter {:?}",
                summary.phase,
                summary.iteration,
                summary.history.len(),
                summary.parameter
            ),
        };
        let answer = self.ask(&format!(
            "{header}\nPress Y to record the data: N to remove it:"
        ))?;
        Ok(if answer == "N" || answer == "n" {
            Decision::Reject
        } else {
            Decision::Accept
        })
    }

    fn notify(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }
}

/// A pre-recorded operator: answers from a queue, accepting once it runs out.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDecisions {
    answers: VecDeque<Decision>,
    prompts: usize,
    go_signals: usize,
    messages: Vec<String>,
}

impl ScriptedDecisions {
    /// Answer with `answers` in order.
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// An operator who accepts everything.
    #[must_use]
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Queue another answer.
    pub fn push(&mut self, decision: Decision) {
        self.answers.push_back(decision);
    }

    /// Number of accept/reject prompts answered.
    #[must_use]
    pub fn prompts(&self) -> usize {
        self.prompts
    }

    /// Number of warm-up go-aheads given.
    #[must_use]
    pub fn go_signals(&self) -> usize {
        self.go_signals
    }

    /// Messages passed to [`HumanDecision::notify`].
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl HumanDecision for ScriptedDecisions {
    fn wait_for_go(&mut self, _prompt: &str) -> Result<()> {
        self.go_signals += 1;
        Ok(())
    }

    fn confirm(&mut self, _summary: &WindowSummary<'_>) -> Result<Decision> {
        self.prompts += 1;
        Ok(self.answers.pop_front().unwrap_or(Decision::Accept))
    }

    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }
}
