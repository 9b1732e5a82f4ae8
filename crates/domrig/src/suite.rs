//! Suite orchestration.
//!
//! A suite turns every registered case into one compile → bundle → execute →
//! verify pass. Fixtures run concurrently; the variants of one fixture run in
//! order so a failure of the first can short-circuit the second.
//!
//! - **RuntimeSuite**: normal and hydrated variants, driver entry, failure set
//! - **CustomElementSuite**: one variant, the fixture's own script as entry
//! - **run_suites**: launches the browser once and runs suites against it

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::browser::{run_bundle, Browser, BrowserLauncher, PageOutput};
use crate::bundle::{assemble, Bundler, HarnessPlugin};
use crate::compiler::{CompileOptions, Compiler};
use crate::config::{HarnessConfig, RunPolicy};
use crate::diagnostic::{self, DiagnosticCollector};
use crate::error::{HarnessError, Result};
use crate::failure::FailureSet;
use crate::fixture::{Case, Fixture, FixtureRegistry, MarkerStyle, Selection};
use crate::report;
use crate::resolve::{VirtualResolver, MAIN_SPECIFIER};
use crate::transform::CompileStage;
use crate::variant::Variant;

/// Directory inside a fixture that receives compiled artifacts.
pub const OUTPUT_DIR: &str = "_output";

/// Budget for starting the browser.
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

const RUNTIME_PLUGIN: &str = "testing-runtime-browser";
const CUSTOM_ELEMENT_PLUGIN: &str = "plugin-resolve-svelte";

/// Final state of one case.
#[derive(Debug)]
pub enum CaseOutcome {
    Passed(PageOutput),
    Failed(HarnessError),
    Skipped(String),
}

impl CaseOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaseOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&HarnessError> {
        match self {
            CaseOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// One reported case.
#[derive(Debug)]
pub struct CaseResult {
    pub name: String,
    pub fixture: String,
    pub variant: Variant,
    pub outcome: CaseOutcome,
    /// Executions made, including retries; 0 for skipped cases
    pub attempts: u32,
    pub duration: Duration,
}

/// Outcome of a whole suite, cases in registration order.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub suite: String,
    pub cases: Vec<CaseResult>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.cases.len() - self.passed() - self.failed()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Look a case up by its test name.
    pub fn case(&self, name: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.name == name)
    }
}

/// A set of fixture cases run against one shared browser.
#[async_trait]
pub trait Suite: Send + Sync {
    fn name(&self) -> &str;

    fn registry(&self) -> &FixtureRegistry;

    /// Variants registered per fixture, in execution order.
    fn variants(&self) -> &[Variant];

    fn policy(&self) -> RunPolicy;

    fn concurrency(&self) -> usize;

    /// One pass of the pipeline for a single (fixture, variant).
    async fn run_case(&self, browser: &dyn Browser, fixture: &Fixture, variant: Variant) -> Result<PageOutput>;

    /// Called after every failed attempt, timeouts included.
    fn record_failure(&self, _fixture: &Fixture, _error: &HarnessError) {}
}

/// Collaborators shared by both suites.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
    pub config: &'a HarnessConfig,
    pub compiler: &'a dyn Compiler,
    pub bundler: &'a dyn Bundler,
}

impl Toolchain<'_> {
    fn output_dir(&self, fixture: &Fixture, variant: Variant) -> std::path::PathBuf {
        fixture.dir.join(OUTPUT_DIR).join(variant.output_dir())
    }
}

/// Component runtime fixtures, each run with and without hydration.
pub struct RuntimeSuite<'a> {
    tools: Toolchain<'a>,
    registry: FixtureRegistry,
    failures: FailureSet,
    policy: RunPolicy,
}

impl<'a> RuntimeSuite<'a> {
    pub fn new(tools: Toolchain<'a>, registry: FixtureRegistry) -> Self {
        Self {
            policy: tools.config.run_policy(),
            tools,
            registry,
            failures: FailureSet::new(),
        }
    }

    /// Register every fixture under the configured runtime samples directory.
    pub fn discover(tools: Toolchain<'a>) -> Result<Self> {
        let registry = FixtureRegistry::discover(&tools.config.runtime_samples, MarkerStyle::Contains)?;
        Ok(Self::new(tools, registry))
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn failures(&self) -> &FailureSet {
        &self.failures
    }

    async fn execute(&self, browser: &dyn Browser, fixture: &Fixture, variant: Variant) -> Result<PageOutput> {
        let config = fixture.config()?;
        let diagnostics = DiagnosticCollector::new();
        let resolver = VirtualResolver::runtime(self.tools.config, fixture, variant);
        let stage = CompileStage::new(
            self.tools.compiler,
            CompileOptions::for_runtime(config, variant),
            &self.tools.config.component_extension,
            &diagnostics,
        )
        .with_output_dir(self.tools.output_dir(fixture, variant));
        let plugin = HarnessPlugin::new(RUNTIME_PLUGIN, &resolver, stage);

        let executed = match assemble(self.tools.bundler, MAIN_SPECIFIER, &plugin).await {
            Ok(code) => run_bundle(browser, &code).await,
            Err(e) => Err(e),
        };

        match executed {
            Ok(output) => {
                diagnostic::verify(config.warnings.as_deref(), &diagnostics.snapshot())?;
                Ok(output)
            }
            Err(e) => {
                log_thrown(fixture, variant, &e);
                if let Err(mismatch) = diagnostic::verify(config.warnings.as_deref(), &diagnostics.snapshot()) {
                    tracing::warn!(target: "domrig::suite", fixture = %fixture.name, "{}", mismatch);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Suite for RuntimeSuite<'_> {
    fn name(&self) -> &str {
        "runtime (browser)"
    }

    fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    fn variants(&self) -> &[Variant] {
        &Variant::RUNTIME
    }

    fn policy(&self) -> RunPolicy {
        self.policy
    }

    fn concurrency(&self) -> usize {
        self.tools.config.effective_concurrency()
    }

    async fn run_case(&self, browser: &dyn Browser, fixture: &Fixture, variant: Variant) -> Result<PageOutput> {
        if self.failures.contains(&fixture.name) {
            return Err(HarnessError::AlreadyFailed {
                fixture: fixture.name.clone(),
            });
        }

        self.execute(browser, fixture, variant).await
    }

    fn record_failure(&self, fixture: &Fixture, error: &HarnessError) {
        if self.failures.record(&fixture.name) {
            tracing::debug!(target: "domrig::suite", fixture = %fixture.name, category = error.category(), "recorded failure");
        }
    }
}

/// Custom-element fixtures: the fixture's own script drives the test.
pub struct CustomElementSuite<'a> {
    tools: Toolchain<'a>,
    registry: FixtureRegistry,
    policy: RunPolicy,
}

impl<'a> CustomElementSuite<'a> {
    pub fn new(tools: Toolchain<'a>, registry: FixtureRegistry) -> Self {
        Self {
            policy: tools.config.run_policy(),
            tools,
            registry,
        }
    }

    /// Register every fixture under the configured custom-element samples directory.
    pub fn discover(tools: Toolchain<'a>) -> Result<Self> {
        let registry = FixtureRegistry::discover(&tools.config.custom_element_samples, MarkerStyle::Suffix)?;
        Ok(Self::new(tools, registry))
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl Suite for CustomElementSuite<'_> {
    fn name(&self) -> &str {
        "custom-elements"
    }

    fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    fn variants(&self) -> &[Variant] {
        &[Variant::CustomElement]
    }

    fn policy(&self) -> RunPolicy {
        self.policy
    }

    fn concurrency(&self) -> usize {
        self.tools.config.effective_concurrency()
    }

    async fn run_case(&self, browser: &dyn Browser, fixture: &Fixture, variant: Variant) -> Result<PageOutput> {
        let config = fixture.config()?;
        let expected = config.warnings.clone().unwrap_or_default();
        let diagnostics = DiagnosticCollector::new();
        let resolver = VirtualResolver::custom_element(self.tools.config, fixture);
        let stage = CompileStage::new(
            self.tools.compiler,
            CompileOptions::for_custom_element(config),
            &self.tools.config.component_extension,
            &diagnostics,
        )
        .with_output_dir(self.tools.output_dir(fixture, variant));
        let plugin = HarnessPlugin::new(CUSTOM_ELEMENT_PLUGIN, &resolver, stage);

        let entry = resolver.entry().to_string_lossy().into_owned();
        let executed = match assemble(self.tools.bundler, &entry, &plugin).await {
            Ok(code) => run_bundle(browser, &code).await,
            Err(e) => Err(e),
        };

        let output = match executed {
            Ok(output) => output,
            Err(e) => {
                log_thrown(fixture, variant, &e);
                return Err(e);
            }
        };
        diagnostic::verify(Some(expected.as_slice()), &diagnostics.snapshot())?;
        Ok(output)
    }
}

/// Log a build or in-page failure with its pretty-printed details.
fn log_thrown(fixture: &Fixture, variant: Variant, error: &HarnessError) {
    tracing::error!(
        target: "domrig::suite",
        case = %variant.test_name(&fixture.name),
        "{}\n{}",
        error,
        report::render_failure(error).trim_end()
    );
}

/// Run one case under the suite's timeout and retry budget.
async fn run_guarded(suite: &dyn Suite, browser: &dyn Browser, case: &Case<'_>) -> CaseResult {
    let started = Instant::now();
    let name = case.name();
    let result = |outcome, attempts| CaseResult {
        name: name.clone(),
        fixture: case.fixture.name.clone(),
        variant: case.variant,
        outcome,
        attempts,
        duration: started.elapsed(),
    };

    if let Selection::Skip(reason) = &case.selection {
        tracing::debug!(target: "domrig::suite", case = %name, "skipped: {}", reason);
        return result(CaseOutcome::Skipped(reason.to_string()), 0);
    }

    let policy = suite.policy();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let run = suite.run_case(browser, case.fixture, case.variant);
        let outcome = match tokio::time::timeout(policy.timeout, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HarnessError::Timeout(policy.timeout)),
        };
        if let Err(e) = &outcome {
            suite.record_failure(case.fixture, e);
        }
        match outcome {
            Ok(output) => {
                tracing::info!(target: "domrig::suite", case = %name, attempts, "passed");
                return result(CaseOutcome::Passed(output), attempts);
            }
            Err(e) if attempts <= policy.retries => {
                tracing::warn!(target: "domrig::suite", case = %name, "attempt {} failed, retrying: {}", attempts, e);
            }
            Err(e) => {
                tracing::info!(target: "domrig::suite", case = %name, category = e.category(), "failed: {}", e);
                return result(CaseOutcome::Failed(e), attempts);
            }
        }
    }
}

/// Run every registered case of `suite` against `browser`.
///
/// Fixtures are scheduled concurrently up to the suite's concurrency; the
/// report lists cases in registration order regardless of completion order.
pub async fn run_suite(suite: &dyn Suite, browser: &dyn Browser) -> SuiteReport {
    let started = Instant::now();
    let registry = suite.registry();
    let cases = registry.cases(suite.variants());

    let mut groups: Vec<Vec<&Case<'_>>> = Vec::new();
    for case in &cases {
        match groups.last_mut() {
            Some(group) if group[0].fixture.name == case.fixture.name => group.push(case),
            _ => groups.push(vec![case]),
        }
    }

    tracing::info!(
        target: "domrig::suite",
        suite = suite.name(),
        fixtures = groups.len(),
        cases = cases.len(),
        "running suite"
    );

    let mut finished: Vec<(usize, Vec<CaseResult>)> = stream::iter(groups.into_iter().enumerate())
        .map(|(index, group)| async move {
            let mut results = Vec::with_capacity(group.len());
            for case in group {
                results.push(run_guarded(suite, browser, case).await);
            }
            (index, results)
        })
        .buffer_unordered(suite.concurrency().max(1))
        .collect()
        .await;
    finished.sort_by_key(|(index, _)| *index);

    SuiteReport {
        suite: suite.name().to_string(),
        cases: finished.into_iter().flat_map(|(_, results)| results).collect(),
        duration: started.elapsed(),
    }
}

/// Launch one browser, run `suites` against it in order, and close it.
///
/// Launch is bounded by `launch_timeout`, normally [`LAUNCH_TIMEOUT`]. The
/// browser is closed even when a suite reports failures; a close error is
/// logged, not returned.
pub async fn run_suites(
    launcher: &dyn BrowserLauncher,
    suites: &[&dyn Suite],
    launch_timeout: Duration,
) -> Result<Vec<SuiteReport>> {
    let browser = tokio::time::timeout(launch_timeout, launcher.launch())
        .await
        .map_err(|_| HarnessError::Browser(format!("launch timed out after {}ms", launch_timeout.as_millis())))??;
    tracing::info!(target: "domrig::suite", "[runtime-browser] Launched browser");

    let mut reports = Vec::with_capacity(suites.len());
    for suite in suites {
        reports.push(run_suite(*suite, browser.as_ref()).await);
    }

    if let Err(e) = browser.close().await {
        tracing::warn!(target: "domrig::suite", "failed to close browser: {}", e);
    }
    Ok(reports)
}
