use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::config::SandboxConfig;
use crate::report::{ConsoleReporter, Report, ReportLog, Tee};
use crate::script_diagnostics::ScriptDiagnostic;
use crate::script_source::DEFAULT_SCRIPT;
use crate::scripting::RhaiEvaluator;
use crate::session::Session;

/// How long the interactive loop waits for input when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file (debounceMs, chartWidth, chartHeight, exportDir, clipboardCommand)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script once against a fresh chart and print the result
    Run {
        /// Script file (defaults to the built-in sample)
        script: Option<PathBuf>,

        /// Also export the chart as a JPEG into the export directory
        #[arg(long)]
        export: bool,

        /// Print a JSON summary instead of the chart option
        #[arg(long)]
        json: bool,
    },
    /// Interactive session driven by commands on stdin (`:help` lists them)
    Session {
        /// Script file to start from (defaults to the built-in sample)
        script: Option<PathBuf>,
    },
    /// Print the built-in sample script
    DefaultScript,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SandboxConfig::load(path)?,
        None => SandboxConfig::default(),
    };

    match cli.command {
        Commands::Run { script, export, json } => run_once(&config, script.as_deref(), export, json)?,
        Commands::Session { script } => run_session(&config, script.as_deref())?,
        Commands::DefaultScript => print!("{}", DEFAULT_SCRIPT),
    }
    Ok(())
}

fn load_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read script {:?}", path)),
        None => Ok(DEFAULT_SCRIPT.to_string()),
    }
}

#[derive(Serialize)]
struct ErrorSummary {
    kind: &'static str,
    message: String,
    diagnostic: Option<ScriptDiagnostic>,
}

#[derive(Serialize)]
struct RunSummary {
    success: bool,
    error: Option<ErrorSummary>,
    option: Value,
    reports: Vec<Report>,
    exported: Option<String>,
}

fn run_once(config: &SandboxConfig, script: Option<&Path>, export: bool, json: bool) -> Result<()> {
    let text = load_script(script)?;
    let reports = ReportLog::new();
    let mut session = Session::new(
        RhaiEvaluator::new(),
        config,
        Rc::new(Tee(ConsoleReporter, reports.clone())),
    )
    .with_script(text);

    let chart = session.mount_chart();
    session.start(Instant::now());

    let mut outcome = None;
    while let Some(deadline) = session.next_deadline() {
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        outcome = session.tick(Instant::now()).or(outcome);
    }

    let exported = if export { session.export(Utc::now()) } else { None };
    let error = outcome.as_ref().and_then(|o| o.error()).map(|err| ErrorSummary {
        kind: err.kind(),
        message: err.to_string(),
        diagnostic: err.diagnostic().cloned(),
    });
    let success = outcome.as_ref().is_some_and(|o| o.is_success());

    if json {
        let summary = RunSummary {
            success,
            error,
            option: chart.option(),
            reports: reports.entries(),
            exported,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if success {
        println!("{}", serde_json::to_string_pretty(&chart.option())?);
    }

    session.end();
    if !success {
        anyhow::bail!("script did not run successfully");
    }
    Ok(())
}

/// A line of input in an interactive session.
#[derive(Debug, Clone, PartialEq)]
enum SessionCommand {
    Load(PathBuf),
    Append(String),
    Reset,
    Rerun,
    Copy,
    Export,
    Click { series: usize, index: usize },
    Show,
    Option,
    Mount,
    Unmount,
    Help,
    Quit,
}

const SESSION_HELP: &str = "\
:load <path>            replace the script with a file
:append <text>          append a line to the script
:reset                  restore the sample script
:rerun                  run the current script again
:copy                   copy the script to the clipboard
:export                 save the chart as a JPEG
:click <series> <index> click a data item
:show                   print the script
:option                 print the chart option
:mount / :unmount       create or dispose of the chart
:quit                   end the session";

impl SessionCommand {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(':') else {
            return Err(format!("expected a command starting with ':' (got {:?}); try :help", line));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let no_arg = |cmd: SessionCommand| {
            if arg.is_empty() {
                Ok(cmd)
            } else {
                Err(format!(":{} takes no arguments", name))
            }
        };

        match name {
            "load" if !arg.is_empty() => Ok(SessionCommand::Load(PathBuf::from(arg))),
            "load" => Err(":load needs a path".to_string()),
            "append" => Ok(SessionCommand::Append(arg.to_string())),
            "click" => {
                let mut parts = arg.split_whitespace().map(str::parse::<usize>);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(Ok(series)), Some(Ok(index)), None) => Ok(SessionCommand::Click { series, index }),
                    _ => Err(":click needs <series> <index>".to_string()),
                }
            }
            "reset" => no_arg(SessionCommand::Reset),
            "rerun" => no_arg(SessionCommand::Rerun),
            "copy" => no_arg(SessionCommand::Copy),
            "export" => no_arg(SessionCommand::Export),
            "show" => no_arg(SessionCommand::Show),
            "option" => no_arg(SessionCommand::Option),
            "mount" => no_arg(SessionCommand::Mount),
            "unmount" => no_arg(SessionCommand::Unmount),
            "help" => no_arg(SessionCommand::Help),
            "quit" | "q" => no_arg(SessionCommand::Quit),
            other => Err(format!("unknown command :{}; try :help", other)),
        }
    }
}

/// Apply one command. Returns false when the session should end.
fn apply(session: &mut Session<RhaiEvaluator>, command: SessionCommand) -> bool {
    let now = Instant::now();
    match command {
        SessionCommand::Load(path) => match load_script(Some(&path)) {
            Ok(text) => session.on_change(text, now),
            Err(e) => eprintln!("Error: {:#}", e),
        },
        SessionCommand::Append(line) => {
            let mut text = session.script().to_string();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&line);
            text.push('\n');
            session.on_change(text, now);
        }
        SessionCommand::Reset => session.reset_script(now),
        SessionCommand::Rerun => session.rerun(now),
        SessionCommand::Copy => {
            session.copy();
        }
        SessionCommand::Export => {
            session.export(Utc::now());
        }
        SessionCommand::Click { series, index } => {
            if session.click(series, index).is_none() {
                eprintln!("no data item at series {} index {}", series, index);
            }
        }
        SessionCommand::Show => print!("{}", session.script()),
        SessionCommand::Option => match session.chart() {
            Some(chart) => match serde_json::to_string_pretty(&chart.option()) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            },
            None => eprintln!("chart is not mounted"),
        },
        SessionCommand::Mount => {
            session.mount_chart();
        }
        SessionCommand::Unmount => {
            if !session.unmount_chart() {
                eprintln!("chart is not mounted");
            }
        }
        SessionCommand::Help => println!("{}", SESSION_HELP),
        SessionCommand::Quit => return false,
    }
    true
}

fn run_session(config: &SandboxConfig, script: Option<&Path>) -> Result<()> {
    let text = load_script(script)?;
    let mut session = Session::new(RhaiEvaluator::new(), config, Rc::new(ConsoleReporter)).with_script(text);

    // Stdin is read on its own thread so the debounce deadline can fire while
    // waiting for input. Only lines cross over; the session stays on this thread.
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    session.mount_chart();
    session.start(Instant::now());

    loop {
        let now = Instant::now();
        session.tick(now);

        let wait = session
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(IDLE_WAIT);
        match rx.recv_timeout(wait) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match SessionCommand::parse(&line) {
                Ok(command) => {
                    if !apply(&mut session, command) {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.end();
    Ok(())
}
