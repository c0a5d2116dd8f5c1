//! One sandbox session: editor text, chart host, execution engine and the
//! rerun / copy / export actions, all reporting to a single sink.

use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::actions::{self, Clipboard, CommandClipboard, DirectoryDownloader, Downloader, UnavailableClipboard};
use crate::chart::{ChartHandle, DispatchOutcome};
use crate::config::SandboxConfig;
use crate::engine::{AttemptOutcome, ExecutionEngine};
use crate::evaluator::Evaluator;
use crate::host::{ChartHost, HandleProvider, SlotProvider};
use crate::report::{Report, ReportSink};
use crate::script_source::ScriptSource;

pub struct Session<E: Evaluator> {
    source: ScriptSource,
    host: ChartHost,
    engine: ExecutionEngine<E, SlotProvider>,
    reporter: Rc<dyn ReportSink>,
    clipboard: Box<dyn Clipboard>,
    downloader: Box<dyn Downloader>,
}

impl<E: Evaluator> Session<E> {
    /// Session over the default script, with clipboard and downloads taken
    /// from `config`. The chart is not mounted yet.
    pub fn new(evaluator: E, config: &SandboxConfig, reporter: Rc<dyn ReportSink>) -> Self {
        let host = ChartHost::new(config.chart_width, config.chart_height);
        let engine = ExecutionEngine::new(evaluator, host.provider(), reporter.clone())
            .with_quiet_period(config.quiet_period());
        let clipboard: Box<dyn Clipboard> = match &config.clipboard_command {
            Some(argv) => Box::new(CommandClipboard::new(argv.clone())),
            None => Box::new(UnavailableClipboard),
        };

        Self {
            source: ScriptSource::default(),
            host,
            engine,
            reporter,
            clipboard,
            downloader: Box::new(DirectoryDownloader::new(config.export_dir.clone())),
        }
    }

    pub fn with_script(mut self, text: impl Into<String>) -> Self {
        self.source = ScriptSource::new(text);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Box<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_downloader(mut self, downloader: Box<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Schedule the initial script. The chart may or may not be mounted yet.
    pub fn start(&mut self, now: Instant) {
        log::info!("session started (revision {})", self.source.revision());
        self.engine.schedule(self.source.text(), now);
    }

    // === Editor ===

    pub fn script(&self) -> &str {
        self.source.text()
    }

    pub fn revision(&self) -> u64 {
        self.source.revision()
    }

    /// An edit: store the text and schedule it.
    pub fn on_change(&mut self, text: impl Into<String>, now: Instant) {
        let text = self.source.replace(text).to_string();
        self.engine.schedule(text, now);
    }

    pub fn reset_script(&mut self, now: Instant) {
        let text = self.source.reset().to_string();
        self.engine.schedule(text, now);
    }

    // === Chart host ===

    pub fn mount_chart(&mut self) -> ChartHandle {
        self.host.mount()
    }

    pub fn unmount_chart(&mut self) -> bool {
        self.host.unmount()
    }

    pub fn chart(&self) -> Option<ChartHandle> {
        self.host.current()
    }

    // === Actions ===

    /// Schedule the current text through the usual debounce path and
    /// acknowledge straight away.
    pub fn rerun(&mut self, now: Instant) {
        self.engine.schedule(self.source.text(), now);
        self.reporter.report(Report::success("rerun requested"));
    }

    pub fn copy(&self) -> bool {
        match actions::copy_script(self.clipboard.as_ref(), self.source.text()) {
            Ok(()) => {
                self.reporter.report(Report::success("script copied to clipboard"));
                true
            }
            Err(err) => {
                self.reporter.report(Report::error(format!("copy failed: {}", err)));
                false
            }
        }
    }

    /// Export the chart as an image. Returns the filename on success.
    pub fn export(&self, at: DateTime<Utc>) -> Option<String> {
        match actions::export_chart(&self.host, self.downloader.as_ref(), at) {
            Ok(filename) => {
                self.reporter.report(Report::success(format!("image saved: {}", filename)));
                Some(filename)
            }
            Err(err) => {
                self.reporter.report(Report::error(format!("failed to save image: {}", err)));
                None
            }
        }
    }

    // === Events ===

    /// Fire a chart event at the script's listeners. Listener failures are
    /// reported like execution errors.
    pub fn dispatch_event(&self, event: &str, params: &Value) -> DispatchOutcome {
        let Some(chart) = self.host.current() else {
            return DispatchOutcome::default();
        };
        let outcome = chart.dispatch(event, params);
        for err in &outcome.errors {
            log::warn!("{} listener failed: {}", event, err);
            self.reporter.report(Report::execution_error(err));
        }
        outcome
    }

    /// Simulate a click on one data item. `None` if there is no such item.
    pub fn click(&self, series_index: usize, data_index: usize) -> Option<DispatchOutcome> {
        let params = self.host.current()?.click_params(series_index, data_index)?;
        Some(self.dispatch_event("click", &params))
    }

    // === Scheduling ===

    /// Run the pending attempt if it is due.
    pub fn tick(&mut self, now: Instant) -> Option<AttemptOutcome> {
        self.engine.poll(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.engine.next_deadline()
    }

    pub fn engine(&self) -> &ExecutionEngine<E, SlotProvider> {
        &self.engine
    }

    /// Tear down: drop any pending attempt, then dispose of the chart. The
    /// session stays usable; a later edit schedules as usual.
    pub fn shutdown(&mut self) {
        self.engine.cancel_pending();
        self.host.unmount();
        log::info!("session ended after {} attempts", self.engine.attempts());
    }

    pub fn end(mut self) {
        self.shutdown();
    }
}

impl<E: Evaluator> Drop for Session<E> {
    fn drop(&mut self) {
        self.engine.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::MemoryClipboard;
    use crate::report::{ReportLog, Severity};
    use crate::scripting::RhaiEvaluator;
    use crate::evaluator::{EvalError, EvaluationScope};
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::time::Duration;

    fn session(reports: &ReportLog) -> Session<RhaiEvaluator> {
        Session::new(RhaiEvaluator::new(), &SandboxConfig::default(), Rc::new(reports.clone()))
    }

    /// Counts attempts that reach evaluation.
    #[derive(Clone, Default)]
    struct CountingEvaluator {
        runs: Rc<Cell<usize>>,
    }

    impl Evaluator for CountingEvaluator {
        fn evaluate(&self, _source: &str, _scope: EvaluationScope) -> Result<(), EvalError> {
            self.runs.set(self.runs.get() + 1);
            Ok(())
        }
    }

    fn counting_session(reports: &ReportLog) -> (Session<CountingEvaluator>, Rc<Cell<usize>>) {
        let evaluator = CountingEvaluator::default();
        let runs = evaluator.runs.clone();
        let session = Session::new(evaluator, &SandboxConfig::default(), Rc::new(reports.clone()));
        (session, runs)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_default_script_renders_after_mount() {
        let reports = ReportLog::new();
        let mut session = session(&reports);
        let t0 = Instant::now();

        session.mount_chart();
        session.start(t0);
        assert!(session.tick(t0 + ms(100)).is_none());
        assert!(session.tick(t0 + ms(300)).unwrap().is_success());

        assert!(reports.is_empty());
        assert_eq!(session.chart().unwrap().option()["series"][0]["type"], "bar");
    }

    #[test]
    fn test_rerun_acknowledges_and_uses_current_text() {
        let reports = ReportLog::new();
        let mut session = session(&reports).with_script("myChart.setOption(#{ a: 1 });");
        let t0 = Instant::now();
        session.mount_chart();

        session.on_change("myChart.setOption(#{ b: 2 });", t0);
        session.rerun(t0 + ms(50));
        assert_eq!(reports.last().unwrap(), Report::success("rerun requested"));
        assert_eq!(session.engine().pending_text(), Some("myChart.setOption(#{ b: 2 });"));

        assert!(session.tick(t0 + ms(349)).is_none());
        assert!(session.tick(t0 + ms(350)).unwrap().is_success());
        assert_eq!(session.chart().unwrap().option(), serde_json::json!({ "b": 2 }));
        assert_eq!(session.engine().attempts(), 1);
    }

    #[test]
    fn test_copy_reports() {
        let reports = ReportLog::new();
        let clipboard = MemoryClipboard::new();
        let session = session(&reports).with_clipboard(Box::new(clipboard.clone()));

        assert!(session.copy());
        assert_eq!(clipboard.contents().as_deref(), Some(session.script()));
        assert_eq!(reports.last().unwrap().message, "script copied to clipboard");

        let session = session.with_clipboard(Box::new(UnavailableClipboard));
        assert!(!session.copy());
        let last = reports.last().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.starts_with("copy failed: "));
    }

    #[test]
    fn test_export_reports() {
        let reports = ReportLog::new();
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&reports).with_downloader(Box::new(DirectoryDownloader::new(dir.path())));
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert!(session.export(at).is_none());
        assert_eq!(
            reports.last().unwrap().message,
            "failed to save image: chart instance is not initialised"
        );

        session.mount_chart();
        assert_eq!(session.export(at).as_deref(), Some("echarts-1700000000000.jpg"));
        assert_eq!(reports.last().unwrap().message, "image saved: echarts-1700000000000.jpg");
        assert!(dir.path().join("echarts-1700000000000.jpg").exists());
    }

    #[test]
    fn test_click_runs_listener_and_reports_failures() {
        let reports = ReportLog::new();
        let mut session = session(&reports).with_script(
            r#"
myChart.setOption(#{ series: [#{ "type": "bar", data: [5, 6] }] });
myChart.on("click", |params| { if params.value == 6 { throw "six"; } });
"#,
        );
        let t0 = Instant::now();
        session.mount_chart();
        session.start(t0);
        session.tick(t0 + ms(300));

        assert_eq!(session.click(0, 0).unwrap().invoked, 1);
        assert!(reports.is_empty());

        let outcome = session.click(0, 1).unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(reports.last().unwrap().message, "execution error: six");

        assert!(session.click(0, 7).is_none());
        assert!(session.click(3, 0).is_none());
    }

    #[test]
    fn test_end_cancels_pending() {
        let reports = ReportLog::new();
        let mut session = session(&reports);
        let t0 = Instant::now();
        let chart = session.mount_chart();
        session.start(t0);
        assert!(session.engine().is_pending());
        session.end();

        assert!(chart.is_disposed());
        assert!(reports.is_empty());
    }

    #[test]
    fn test_shutdown_drops_pending_attempt() {
        let reports = ReportLog::new();
        let (mut session, runs) = counting_session(&reports);
        let t0 = Instant::now();
        let chart = session.mount_chart();
        session.start(t0);
        session.on_change("myChart.clear();", t0 + ms(100));

        session.shutdown();
        assert!(!session.engine().is_pending());
        assert!(session.next_deadline().is_none());
        assert!(session.tick(t0 + ms(1_000)).is_none());

        assert_eq!(runs.get(), 0);
        assert_eq!(session.engine().attempts(), 0);
        assert!(chart.is_disposed());
        assert!(session.chart().is_none());
        assert!(reports.is_empty());
    }

    #[test]
    fn test_drop_does_not_flush_pending_attempt() {
        let reports = ReportLog::new();
        let (mut session, runs) = counting_session(&reports);
        let t0 = Instant::now();
        session.mount_chart();
        session.start(t0);
        assert!(session.tick(t0 + ms(300)).unwrap().is_success());
        assert_eq!(runs.get(), 1);

        session.on_change("myChart.clear();", t0 + ms(400));
        assert!(session.engine().is_pending());
        drop(session);

        assert_eq!(runs.get(), 1);
        assert!(reports.is_empty());
    }
}
