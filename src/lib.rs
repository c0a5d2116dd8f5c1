pub mod chart;
pub mod config;
pub mod error;
pub mod host;
pub mod namespace;
pub mod raster;

// Scripting
pub mod evaluator;
pub mod scripting;
pub mod script_diagnostics;
pub mod script_log;
pub mod script_source;

// Execution pipeline
pub mod actions;
pub mod debounce;
pub mod engine;
pub mod report;
pub mod session;

pub mod cli;

pub use error::SandboxError;
