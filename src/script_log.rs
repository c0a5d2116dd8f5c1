//! Script output for Rhai scripts.
//!
//! Rhai's `print` and `debug` statements are routed here. Output goes to
//! stderr with level prefixes, keeping stdout free for command output, and is
//! mirrored to the `log` facade under the `script` target. The sandbox does not
//! intercept or collect it.

use std::cell::Cell;

/// Maximum number of messages a single execution attempt may emit.
const MAX_LOGS_PER_ATTEMPT: u32 = 100;

thread_local! {
    /// Counter for messages in the current attempt.
    static LOG_COUNT: Cell<u32> = const { Cell::new(0) };
    /// Whether we've already warned about exceeding the limit this attempt.
    static WARNED_LIMIT: Cell<bool> = const { Cell::new(false) };
}

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
}

impl LogLevel {
    /// Get the prefix string for CLI output.
    fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Warn => "[WARN]",
        }
    }
}

/// Reset the per-attempt counter. Called before every evaluation.
pub fn reset_attempt_log_count() {
    LOG_COUNT.with(|count| count.set(0));
    WARNED_LIMIT.with(|warned| warned.set(false));
}

/// Returns true if under the per-attempt limit.
fn can_log() -> bool {
    let count = LOG_COUNT.with(|count| {
        let current = count.get();
        count.set(current.saturating_add(1));
        current
    });
    if count < MAX_LOGS_PER_ATTEMPT {
        return true;
    }

    // Only warn once per attempt
    if !WARNED_LIMIT.with(|warned| warned.replace(true)) {
        emit_log(
            LogLevel::Warn,
            &format!(
                "Script output limit exceeded ({} messages/run). Further output dropped.",
                MAX_LOGS_PER_ATTEMPT
            ),
        );
    }
    false
}

/// Emit a message at the given level.
pub fn emit_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Info => {
            log::info!(target: "script", "{}", message);
            eprintln!("{} {}", level.prefix(), message);
        }
        LogLevel::Debug => {
            log::debug!(target: "script", "{}", message);
            eprintln!("{} {}", level.prefix(), message);
        }
        LogLevel::Warn => {
            log::warn!(target: "script", "{}", message);
            eprintln!("{} {}", level.prefix(), message);
        }
    }
}

/// Log a message from a script, respecting the per-attempt limit.
pub fn script_log(level: LogLevel, message: &str) {
    if can_log() {
        emit_log(level, message);
    }
}

/// Hook Rhai's `print` and `debug` statements up to the script log.
pub fn register_output_hooks(engine: &mut rhai::Engine) {
    engine.on_print(|text| script_log(LogLevel::Info, text));
    engine.on_debug(|text, _source, pos| {
        let message = match pos.line() {
            Some(line) => format!("line {}: {}", line, text),
            None => text.to_string(),
        };
        script_log(LogLevel::Debug, &message);
    });
}

/// Convert a Rhai Dynamic value to a string safely.
/// Never panics, handles all types gracefully.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if value.is_array() {
        if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
            let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
            return parts.join(" ");
        }
    }

    if value.is_map() {
        if let Some(map) = value.clone().try_cast::<rhai::Map>() {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
                .collect();
            return format!("{{{}}}", parts.join(", "));
        }
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }

    if let Ok(f) = value.as_float() {
        return format!("{}", f);
    }

    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }

    if value.is_unit() {
        return "()".to_string();
    }

    // Fallback: debug format
    format!("{:?}", value)
}
