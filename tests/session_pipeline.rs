//! End-to-end behaviour of a sandbox session with the Rhai evaluator.

use std::rc::Rc;
use std::time::{Duration, Instant};

use chart_sandbox::actions::{DirectoryDownloader, MemoryClipboard};
use chart_sandbox::config::SandboxConfig;
use chart_sandbox::report::{ReportLog, Severity};
use chart_sandbox::scripting::RhaiEvaluator;
use chart_sandbox::session::Session;
use chrono::{TimeZone, Utc};
use serde_json::json;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn new_session(reports: &ReportLog) -> Session<RhaiEvaluator> {
    Session::new(RhaiEvaluator::new(), &SandboxConfig::default(), Rc::new(reports.clone()))
}

#[test]
fn test_burst_of_edits_runs_only_the_last() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports);
    session.mount_chart();
    let t0 = Instant::now();

    session.on_change("myChart.setOption(#{ step: 1 });", t0);
    session.on_change("myChart.setOption(#{ step: 2 });", t0 + ms(120));
    session.on_change("this is not rhai (", t0 + ms(240));
    session.on_change("myChart.setOption(#{ step: 4 });", t0 + ms(360));

    for t in [400, 500, 600, 659] {
        assert!(session.tick(t0 + ms(t)).is_none());
    }
    assert!(session.tick(t0 + ms(660)).unwrap().is_success());
    assert!(session.tick(t0 + ms(5000)).is_none());

    assert_eq!(session.chart().unwrap().option(), json!({ "step": 4 }));
    assert_eq!(session.engine().attempts(), 1);
    assert!(reports.is_empty());
}

#[test]
fn test_eager_run_before_mount_then_rerun() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports);
    let t0 = Instant::now();

    session.start(t0);
    let outcome = session.tick(t0 + ms(300)).unwrap();
    assert_eq!(outcome.error().unwrap().kind(), "handle_not_ready");
    assert_eq!(
        reports.drain()[0].message,
        "execution error: chart instance is not initialised"
    );

    session.mount_chart();
    session.rerun(t0 + ms(1000));
    assert!(session.tick(t0 + ms(1300)).unwrap().is_success());

    let entries = reports.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Success);
    assert_eq!(entries[0].message, "rerun requested");
    assert_eq!(session.chart().unwrap().option()["series"][0]["type"], "bar");
}

#[test]
fn test_thrown_error_then_recovery() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports);
    session.mount_chart();
    let t0 = Instant::now();

    session.on_change(
        "myChart.setOption(#{ before: true });\nthrow \"bad data\";\nmyChart.setOption(#{ after: true });",
        t0,
    );
    let outcome = session.tick(t0 + ms(300)).unwrap();
    let err = outcome.error().unwrap();
    assert_eq!(err.to_string(), "bad data");
    assert_eq!(err.diagnostic().unwrap().location.as_ref().unwrap().line, 2);
    assert_eq!(reports.entries().len(), 1);
    assert_eq!(reports.last().unwrap().message, "execution error: bad data");
    assert_eq!(session.chart().unwrap().option(), json!({ "before": true }));

    session.on_change("myChart.setOption(#{ fixed: 1 }, true);", t0 + ms(400));
    assert!(session.tick(t0 + ms(700)).unwrap().is_success());
    assert_eq!(reports.entries().len(), 1);
    assert_eq!(session.chart().unwrap().option(), json!({ "fixed": 1 }));
}

#[test]
fn test_rerun_supersedes_pending_edit() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports).with_script("myChart.setOption(#{ v: \"current\" });");
    session.mount_chart();
    let t0 = Instant::now();

    session.start(t0);
    session.rerun(t0 + ms(100));
    assert!(session.tick(t0 + ms(300)).is_none());
    assert!(session.tick(t0 + ms(400)).unwrap().is_success());
    assert_eq!(session.engine().attempts(), 1);
    assert_eq!(session.chart().unwrap().option()["v"], "current");
}

#[test]
fn test_remount_gets_fresh_chart() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports).with_script("myChart.setOption(#{ n: 1 });");
    let first = session.mount_chart();
    let t0 = Instant::now();
    session.start(t0);
    session.tick(t0 + ms(300));
    assert_eq!(first.option(), json!({ "n": 1 }));

    assert!(session.unmount_chart());
    assert!(first.is_disposed());
    let second = session.mount_chart();
    assert_eq!(second.option(), json!({}));

    session.rerun(t0 + ms(400));
    session.tick(t0 + ms(700));
    assert_eq!(second.option(), json!({ "n": 1 }));
}

#[test]
fn test_copy_and_export_actions() {
    let reports = ReportLog::new();
    let clipboard = MemoryClipboard::new();
    let dir = tempfile::tempdir().unwrap();
    let mut session = new_session(&reports)
        .with_clipboard(Box::new(clipboard.clone()))
        .with_downloader(Box::new(DirectoryDownloader::new(dir.path())));
    session.mount_chart();
    let t0 = Instant::now();
    session.start(t0);
    session.tick(t0 + ms(300));
    let option_before = session.chart().unwrap().option();

    assert!(session.copy());
    assert_eq!(clipboard.contents().as_deref(), Some(session.script()));

    let first = session.export(Utc.timestamp_millis_opt(1_000).unwrap()).unwrap();
    let second = session.export(Utc.timestamp_millis_opt(2_000).unwrap()).unwrap();
    assert_eq!(first, "echarts-1000.jpg");
    assert_eq!(second, "echarts-2000.jpg");
    assert!(dir.path().join(&first).exists());
    assert!(dir.path().join(&second).exists());
    assert_eq!(session.chart().unwrap().option(), option_before);

    let messages: Vec<String> = reports.entries().into_iter().map(|r| r.message).collect();
    assert_eq!(
        messages,
        vec![
            "script copied to clipboard".to_string(),
            "image saved: echarts-1000.jpg".to_string(),
            "image saved: echarts-2000.jpg".to_string(),
        ]
    );
}

#[test]
fn test_oversized_chart_reports_instead_of_panicking() {
    let reports = ReportLog::new();
    let dir = tempfile::tempdir().unwrap();
    let mut session = new_session(&reports)
        .with_script("myChart.resize(#{ width: 4000000000, height: 4000000000 });\nmyChart.getDataURL();")
        .with_downloader(Box::new(DirectoryDownloader::new(dir.path())));
    session.mount_chart();
    let t0 = Instant::now();
    session.start(t0);

    let outcome = session.tick(t0 + ms(300)).unwrap();
    assert!(!outcome.is_success());
    let reported = reports.drain();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].severity, Severity::Error);
    assert!(reported[0].message.starts_with("execution error: "), "{}", reported[0].message);
    assert!(reported[0].message.contains("too large"), "{}", reported[0].message);

    // The resize stuck, so export hits the same limit
    assert!(session.export(Utc.timestamp_millis_opt(1_000).unwrap()).is_none());
    let message = reports.last().unwrap().message;
    assert!(message.starts_with("failed to save image: "), "{}", message);
    assert!(message.contains("too large"), "{}", message);
    assert!(!dir.path().join("echarts-1000.jpg").exists());

    // The session keeps working once the chart is a sane size again
    session.on_change("myChart.resize(#{ width: 200, height: 100 });\nmyChart.getDataURL();", t0 + ms(500));
    assert!(session.tick(t0 + ms(800)).unwrap().is_success());
}

#[test]
fn test_default_script_click_listener() {
    let reports = ReportLog::new();
    let mut session = new_session(&reports);
    session.mount_chart();
    let t0 = Instant::now();
    session.start(t0);
    assert!(session.tick(t0 + ms(300)).unwrap().is_success());

    let outcome = session.click(0, 2).unwrap();
    assert_eq!(outcome.invoked, 1);
    assert!(outcome.errors.is_empty());
    assert!(reports.is_empty());
}

#[test]
fn test_config_quiet_period_is_used() {
    let reports = ReportLog::new();
    let config = SandboxConfig::from_json_str(r#"{ "debounceMs": 50 }"#).unwrap();
    let mut session = Session::new(RhaiEvaluator::new(), &config, Rc::new(reports.clone()))
        .with_script("myChart.clear();");
    session.mount_chart();
    let t0 = Instant::now();
    session.start(t0);
    assert_eq!(session.next_deadline(), Some(t0 + ms(50)));
    assert!(session.tick(t0 + ms(50)).unwrap().is_success());
}
