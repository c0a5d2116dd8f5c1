//! Execution engine: debounce, resolve the chart, evaluate, isolate errors.
//!
//! The engine is driven by its owner. `schedule` records a candidate script and
//! restarts the quiet period; `poll` runs the candidate once the quiet period
//! has elapsed. Attempts run to completion inside `poll`, one at a time.

use std::rc::Rc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::debounce::Debouncer;
use crate::error::SandboxError;
use crate::evaluator::{EvaluationScope, Evaluator};
use crate::host::HandleProvider;
use crate::namespace::ChartsNamespace;
use crate::report::{Report, ReportSink};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Result of one execution attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(SandboxError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Succeeded)
    }

    pub fn error(&self) -> Option<&SandboxError> {
        match self {
            AttemptOutcome::Succeeded => None,
            AttemptOutcome::Failed(err) => Some(err),
        }
    }
}

/// Short content hash used to tell attempts apart in logs.
pub fn script_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

pub struct ExecutionEngine<E, P> {
    evaluator: E,
    provider: P,
    namespace: ChartsNamespace,
    reporter: Rc<dyn ReportSink>,
    pending: Debouncer<String>,
    attempts: u64,
    last_outcome: Option<AttemptOutcome>,
}

impl<E, P> ExecutionEngine<E, P> {
    pub fn quiet_period(&self) -> Duration {
        self.pending.quiet_period()
    }

    /// Drop the pending candidate without running it.
    pub fn cancel_pending(&mut self) {
        if let Some(text) = self.pending.cancel() {
            log::debug!("cancelled pending attempt [{}]", script_digest(&text));
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// When the pending candidate becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.deadline()
    }

    pub fn pending_text(&self) -> Option<&str> {
        self.pending.peek().map(String::as_str)
    }

    /// Number of attempts run so far, including ones that failed early.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn last_outcome(&self) -> Option<&AttemptOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<E: Evaluator, P: HandleProvider> ExecutionEngine<E, P> {
    pub fn new(evaluator: E, provider: P, reporter: Rc<dyn ReportSink>) -> Self {
        Self {
            evaluator,
            provider,
            namespace: ChartsNamespace,
            reporter,
            pending: Debouncer::new(DEFAULT_QUIET_PERIOD),
            attempts: 0,
            last_outcome: None,
        }
    }

    pub fn with_quiet_period(mut self, quiet: Duration) -> Self {
        self.pending = Debouncer::new(quiet);
        self
    }

    /// Make `text` the candidate and restart the quiet period. A candidate that
    /// was still waiting is discarded and never runs.
    pub fn schedule(&mut self, text: impl Into<String>, now: Instant) {
        let text = text.into();
        log::debug!("scheduled attempt [{}]", script_digest(&text));
        if let Some(superseded) = self.pending.push(text, now) {
            log::debug!("superseded attempt [{}]", script_digest(&superseded));
        }
    }

    /// Run the candidate if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<AttemptOutcome> {
        let text = self.pending.poll(now)?;
        Some(self.attempt(&text))
    }

    fn attempt(&mut self, text: &str) -> AttemptOutcome {
        self.attempts += 1;
        let digest = script_digest(text);

        let outcome = match self.provider.current() {
            None => AttemptOutcome::Failed(SandboxError::HandleNotReady),
            Some(chart) => {
                let scope = EvaluationScope {
                    chart,
                    namespace: self.namespace,
                };
                match self.evaluator.evaluate(text, scope) {
                    Ok(()) => AttemptOutcome::Succeeded,
                    Err(err) => AttemptOutcome::Failed(err.into()),
                }
            }
        };

        match &outcome {
            AttemptOutcome::Succeeded => {
                log::info!("attempt #{} [{}] succeeded", self.attempts, digest);
            }
            AttemptOutcome::Failed(err) => {
                log::warn!("attempt #{} [{}] failed ({}): {}", self.attempts, digest, err.kind(), err);
                self.reporter.report(Report::execution_error(err));
            }
        }

        self.last_outcome = Some(outcome.clone());
        outcome
    }
}
