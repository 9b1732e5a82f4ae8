//! Integration tests for the custom-element suite and the shared browser
//! lifecycle.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{
    unused_export_warning, GraphBundler, LogCapture, ScriptedBrowser, ScriptedCompiler, ScriptedLauncher, Workspace,
};
use domrig::{
    run_suite, run_suites, CaseOutcome, CustomElementSuite, HarnessError, RuntimeSuite, Suite, SuiteReport, Toolchain,
};

const ELEMENT: &str = "<svelte:options tag=\"my-element\"/>\n<h1>Hello</h1>\n";
const TEST_JS: &str = "import './main.svelte';\nimport * as assert from 'assert';\nexport default function (target) {}\n";

async fn run(ws: &Workspace) -> (SuiteReport, ScriptedBrowser) {
    common::init_tracing();
    let compiler = ScriptedCompiler::default();
    let bundler = GraphBundler::default();
    let tools = Toolchain {
        config: &ws.config,
        compiler: &compiler,
        bundler: &bundler,
    };
    let suite = CustomElementSuite::discover(tools).expect("discover fixtures");
    let browser = ScriptedBrowser::new();
    let report = run_suite(&suite, &browser).await;
    (report, browser)
}

#[tokio::test]
async fn test_custom_element_passes_with_fixed_options() {
    let ws = Workspace::new();
    let dir = ws.custom_element_fixture(
        "my-element",
        &[
            ("main.svelte", ELEMENT),
            ("test.js", TEST_JS),
            ("_config.json", r#"{ "dev": true, "compileOptions": { "css": false } }"#),
        ],
    );

    let (report, browser) = run(&ws).await;

    assert_eq!(report.suite, "custom-elements");
    assert_eq!(report.cases.len(), 1);
    assert_eq!(report.cases[0].name, "my-element");
    assert!(report.cases[0].outcome.is_passed());
    assert_eq!(browser.state.pages_closed(), 1);

    let bundles = browser.state.bundles_containing("my-element");
    assert_eq!(bundles.len(), 1);
    assert!(bundles[0].contains(r#"{"customElement":true,"dev":true}"#), "{}", bundles[0]);
    assert!(!bundles[0].contains("hydrate:"));
    assert!(dir.join("_output/custom-element/main.js").is_file());
}

#[tokio::test]
async fn test_undeclared_warning_is_a_mismatch() {
    let ws = Workspace::new();
    ws.custom_element_fixture(
        "warns",
        &[("main.svelte", "<script>export let unused;</script>\n"), ("test.js", TEST_JS)],
    );

    let (report, browser) = run(&ws).await;

    match report.cases[0].outcome.error() {
        Some(HarnessError::DiagnosticMismatch { expected, actual }) => {
            assert!(expected.is_empty());
            assert_eq!(actual, &vec![unused_export_warning(8)]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(browser.state.pages_opened(), 1);
}

#[tokio::test]
async fn test_declared_warning_passes() {
    let ws = Workspace::new();
    let config = json!({ "warnings": [unused_export_warning(8)] }).to_string();
    ws.custom_element_fixture(
        "warns",
        &[
            ("main.svelte", "<script>export let unused;</script>\n"),
            ("test.js", TEST_JS),
            ("_config.json", &config),
        ],
    );

    let (report, _) = run(&ws).await;

    assert!(report.cases[0].outcome.is_passed());
}

#[tokio::test]
async fn test_markers_only_count_as_suffix() {
    let ws = Workspace::new();
    for name in ["plain", "middle.solo.not", "ends.solo", "ends.skip"] {
        ws.custom_element_fixture(name, &[("main.svelte", ELEMENT), ("test.js", TEST_JS)]);
    }

    let (report, _) = run(&ws).await;

    let summary: Vec<_> = report
        .cases
        .iter()
        .map(|c| match &c.outcome {
            CaseOutcome::Skipped(reason) => format!("{}: {}", c.name, reason),
            other => format!("{}: {}", c.name, if other.is_passed() { "passed" } else { "failed" }),
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            "ends.skip: marked skip",
            "ends.solo: passed",
            "middle.solo.not: another fixture is solo",
            "plain: another fixture is solo",
        ]
    );
}

#[tokio::test]
async fn test_thrown_error_is_not_cached() {
    let ws = Workspace::new();
    ws.custom_element_fixture(
        "throws",
        &[("main.svelte", "<!-- throw: boom -->\n"), ("test.js", TEST_JS)],
    );

    let (report, browser) = run(&ws).await;

    assert!(matches!(
        report.cases[0].outcome.error(),
        Some(HarnessError::Execution { message }) if message == "Error: boom"
    ));
    assert_eq!(browser.state.pages_closed(), 1);
}

#[tokio::test]
async fn test_thrown_assertion_is_logged_as_diff() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let ws = Workspace::new();
    ws.custom_element_fixture(
        "wrong-tag",
        &[
            ("main.svelte", "<!-- throw: Expected \"<b>x</b>\" to equal \"<i>x</i>\" -->\n"),
            ("test.js", TEST_JS),
        ],
    );

    let (report, _) = run(&ws).await;

    assert!(matches!(report.cases[0].outcome.error(), Some(HarnessError::Execution { .. })));
    let out = logs.contents();
    assert!(out.contains("Expected: <i>x</i>"), "{}", out);
    assert!(out.contains("Received: <b>x</b>"), "{}", out);
}

// ────────────────────────────────────────────────────────────────────────────
// Browser lifecycle
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_suites_share_one_browser() {
    common::init_tracing();
    let ws = Workspace::new();
    ws.runtime_fixture("basic", &[("main.svelte", "<h1>Hello</h1>\n")]);
    ws.custom_element_fixture("my-element", &[("main.svelte", ELEMENT), ("test.js", TEST_JS)]);

    let compiler = ScriptedCompiler::default();
    let bundler = GraphBundler::default();
    let tools = Toolchain {
        config: &ws.config,
        compiler: &compiler,
        bundler: &bundler,
    };
    let runtime = RuntimeSuite::discover(tools).expect("runtime fixtures");
    let custom = CustomElementSuite::discover(tools).expect("custom element fixtures");
    let launcher = ScriptedLauncher::default();

    let suites: [&dyn Suite; 2] = [&runtime, &custom];
    let reports = run_suites(&launcher, &suites, domrig::LAUNCH_TIMEOUT)
        .await
        .expect("suites run");

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].passed(), 2);
    assert_eq!(reports[1].passed(), 1);
    assert_eq!(launcher.state.launches.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(launcher.state.browsers_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(launcher.state.pages_opened(), 3);
    assert_eq!(launcher.state.pages_closed(), 3);
}

#[tokio::test]
async fn test_launch_timeout() {
    let ws = Workspace::new();
    let compiler = ScriptedCompiler::default();
    let bundler = GraphBundler::default();
    let tools = Toolchain {
        config: &ws.config,
        compiler: &compiler,
        bundler: &bundler,
    };
    let runtime = RuntimeSuite::discover(tools).expect("runtime fixtures");
    let launcher = ScriptedLauncher {
        launch_delay: Some(Duration::from_secs(5)),
        ..ScriptedLauncher::default()
    };

    let suites: [&dyn Suite; 1] = [&runtime];
    let err = run_suites(&launcher, &suites, Duration::from_millis(50))
        .await
        .expect_err("launch should time out");

    assert!(matches!(err, HarnessError::Browser(ref message) if message.contains("timed out")));
    assert_eq!(launcher.state.pages_opened(), 0);
}
