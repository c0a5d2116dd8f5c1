//! User-visible notifications.
//!
//! Reports are transient and non-blocking: a sink shows or records them and
//! returns immediately. Every failure in the sandbox ends in exactly one.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
}

impl Report {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Report for a failed execution attempt.
    pub fn execution_error(err: &SandboxError) -> Self {
        Self::error(format!("execution error: {}", err))
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

pub trait ReportSink {
    fn report(&self, report: Report);
}

impl<S: ReportSink + ?Sized> ReportSink for Rc<S> {
    fn report(&self, report: Report) {
        (**self).report(report)
    }
}

/// Writes reports to stderr and the `report` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ReportSink for ConsoleReporter {
    fn report(&self, report: Report) {
        match report.severity {
            Severity::Success => {
                log::info!(target: "report", "{}", report.message);
                eprintln!("[ok] {}", report.message);
            }
            Severity::Error => {
                log::warn!(target: "report", "{}", report.message);
                eprintln!("[error] {}", report.message);
            }
        }
    }
}

/// Keeps every report in memory. Clones share the same list.
#[derive(Debug, Default, Clone)]
pub struct ReportLog {
    entries: Rc<RefCell<Vec<Report>>>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Report> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn last(&self) -> Option<Report> {
        self.entries.borrow().last().cloned()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Report> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

impl ReportSink for ReportLog {
    fn report(&self, report: Report) {
        self.entries.borrow_mut().push(report);
    }
}

/// Sends every report to two sinks, e.g. the console and a recorder.
pub struct Tee<A, B>(pub A, pub B);

impl<A: ReportSink, B: ReportSink> ReportSink for Tee<A, B> {
    fn report(&self, report: Report) {
        self.0.report(report.clone());
        self.1.report(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message() {
        let report = Report::execution_error(&SandboxError::HandleNotReady);
        assert!(report.is_error());
        assert_eq!(report.message, "execution error: chart instance is not initialised");
    }

    #[test]
    fn test_report_log_shares_entries() {
        let log = ReportLog::new();
        let clone = log.clone();
        clone.report(Report::success("rerun requested"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().message, "rerun requested");

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(clone.is_empty());
    }

    #[test]
    fn test_tee_reports_to_both() {
        let a = ReportLog::new();
        let b = ReportLog::new();
        Tee(a.clone(), b.clone()).report(Report::error("copy failed: no clipboard"));
        assert_eq!(a.entries(), b.entries());
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_severity_serializes_snake_case() {
        let json = serde_json::to_value(Report::success("ok")).unwrap();
        assert_eq!(json["severity"], "success");
    }
}
