//! Trailing-edge debounce buffer.
//!
//! A single slot holding the latest candidate and the instant it becomes due.
//! Time is passed in by the caller, so the buffer works the same under a real
//! clock and in tests.

use std::time::{Duration, Instant};

#[derive(Debug)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Record `value` as the candidate and restart the quiet period.
    /// Returns the candidate it replaced, which will never fire.
    pub fn push(&mut self, value: T, now: Instant) -> Option<T> {
        let previous = self.pending.replace(Pending {
            value,
            deadline: now + self.quiet,
        });
        previous.map(|p| p.value)
    }

    /// Take the candidate if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(p) if now >= p.deadline => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Drop the candidate without firing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|p| &p.value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
