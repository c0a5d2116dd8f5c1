//! Evaluation seam between the execution engine and the script language.

use crate::chart::ChartHandle;
use crate::error::SandboxError;
use crate::namespace::ChartsNamespace;
use crate::script_diagnostics::{ScriptDiagnostic, ScriptPhase};

/// Name the chart instance is bound to inside scripts.
pub const CHART_BINDING: &str = "myChart";
/// Name the library namespace is bound to inside scripts.
pub const NAMESPACE_BINDING: &str = "echarts";

/// The two bindings a script runs against. Built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct EvaluationScope {
    pub chart: ChartHandle,
    pub namespace: ChartsNamespace,
}

#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub diagnostic: ScriptDiagnostic,
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            diagnostic: ScriptDiagnostic::runtime(ScriptPhase::Run, message.clone()),
            message,
        }
    }
}

impl From<ScriptDiagnostic> for EvalError {
    fn from(diagnostic: ScriptDiagnostic) -> Self {
        Self {
            message: diagnostic.message.clone(),
            diagnostic,
        }
    }
}

impl From<EvalError> for SandboxError {
    fn from(err: EvalError) -> Self {
        SandboxError::ScriptRuntime {
            message: err.message,
            diagnostic: err.diagnostic,
        }
    }
}

/// Runs script text as a function body over `(myChart, echarts)`.
///
/// Implementations must not expose anything else to the script, must discard
/// the script's return value, and must turn every failure (parse or runtime)
/// into an [`EvalError`] instead of panicking.
pub trait Evaluator {
    fn evaluate(&self, source: &str, scope: EvaluationScope) -> Result<(), EvalError>;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&self, source: &str, scope: EvaluationScope) -> Result<(), EvalError> {
        (**self).evaluate(source, scope)
    }
}
