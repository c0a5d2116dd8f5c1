use thiserror::Error;

use crate::script_diagnostics::ScriptDiagnostic;

/// Every way a sandbox action can fail. None of these are fatal: each one
/// ends in a report and the session carries on.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    /// The chart instance was not mounted when an attempt or export needed it.
    #[error("chart instance is not initialised")]
    HandleNotReady,

    /// The user script failed to compile or raised an error while running.
    #[error("{message}")]
    ScriptRuntime {
        message: String,
        diagnostic: ScriptDiagnostic,
    },

    #[error("{0}")]
    ClipboardFailure(String),

    #[error("{0}")]
    ExportFailure(String),
}

impl SandboxError {
    /// Short stable name used in log lines and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::HandleNotReady => "handle_not_ready",
            SandboxError::ScriptRuntime { .. } => "script_runtime_error",
            SandboxError::ClipboardFailure(_) => "clipboard_failure",
            SandboxError::ExportFailure(_) => "export_failure",
        }
    }

    pub fn diagnostic(&self) -> Option<&ScriptDiagnostic> {
        match self {
            SandboxError::ScriptRuntime { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

/// Errors loading a [`crate::config::SandboxConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
