//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. The sandbox
//! only shows the user a message line, but keeps the structured form around so
//! tests and `--json` output can inspect what went wrong and where.

use rhai::{Dynamic, EvalAltResult};
use serde::Serialize;

use crate::script_log::stringify_dynamic;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code, including values raised with `throw`.
    RuntimeError,
    /// Script attempted to use the chart API incorrectly (missing members, wrong types, etc).
    HostApiMisuse,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    Run,
    /// A callback registered with `myChart.on(..)` failed when the event fired.
    Listener,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the user script.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub phase: ScriptPhase,
    /// Message text as shown to the user (no position suffix).
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(default)]
    pub raw: Option<String>,
}

impl ScriptDiagnostic {
    /// Diagnostic for failures raised by the host rather than by Rhai itself.
    pub fn runtime(phase: ScriptPhase, message: impl Into<String>) -> Self {
        Self {
            kind: ScriptDiagnosticKind::RuntimeError,
            phase,
            message: message.into(),
            location: None,
            raw: None,
        }
    }
}

fn classify_message(message: &str) -> ScriptDiagnosticKind {
    // Rhai error strings are fairly stable; this provides a pragmatic
    // classification without depending on Rhai's internal enum variants.
    let lower = message.to_ascii_lowercase();

    if lower.contains("property not found")
        || lower.contains("function not found")
        || lower.contains("mismatched types")
        || lower.contains("disposed")
    {
        return ScriptDiagnosticKind::HostApiMisuse;
    }

    ScriptDiagnosticKind::RuntimeError
}

fn location_of(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    let column = pos.position().unwrap_or(0) as u32;
    Some(ScriptLocation {
        line,
        column: column.max(1),
    })
}

/// Value passed to `throw`, looking through errors wrapped by function calls.
fn thrown_value(err: &EvalAltResult) -> Option<&Dynamic> {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => Some(value),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => thrown_value(inner),
        _ => None,
    }
}

/// Message text for an evaluation error, without Rhai's ` (line x, position y)` suffix.
pub fn eval_error_message(err: &EvalAltResult) -> String {
    if let Some(value) = thrown_value(err) {
        if value.is_unit() {
            return "Runtime error".to_string();
        }
        return stringify_dynamic(value);
    }

    let raw = err.to_string();
    let pos = err.position();
    if pos.is_none() {
        return raw;
    }
    let suffix = format!(" ({pos})");
    match raw.strip_suffix(&suffix) {
        Some(trimmed) => trimmed.to_string(),
        None => raw,
    }
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptDiagnostic {
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        phase: ScriptPhase::Compile,
        message: err.err_type().to_string(),
        location: location_of(err.position()),
        raw: Some(err.to_string()),
    }
}

pub fn from_eval_error(phase: ScriptPhase, err: &EvalAltResult) -> ScriptDiagnostic {
    let raw = err.to_string();
    let kind = if thrown_value(err).is_some() {
        ScriptDiagnosticKind::RuntimeError
    } else {
        classify_message(&raw)
    };

    ScriptDiagnostic {
        kind,
        phase,
        message: eval_error_message(err),
        location: location_of(err.position()),
        raw: Some(raw),
    }
}
