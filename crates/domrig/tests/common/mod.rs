//! In-memory stand-ins for the compiler, the bundler and the browser.
//!
//! Fixture sources steer the fake browser through HTML comments that survive
//! compilation: `<!-- throw: msg -->`, `<!-- log: msg -->`,
//! `<!-- return: value -->` and `<!-- hang -->`.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tempfile::TempDir;

use domrig::browser::{ConsoleSender, ENTRY_INVOCATION, PAGE_HTML};
use domrig::{
    Browser, BrowserLauncher, Bundle, BundlePlugin, Bundler, CompileError, CompileOptions, CompileOutput, Compiler,
    CompilerWarning, ConsoleLevel, ConsoleMessage, ConsoleSubscription, Diagnostic, GeneratedBundle, HarnessConfig,
    HarnessError, OutputOptions, Page, Result,
};

pub const UNUSED_EXPORT: &str = "export let unused";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collects formatted log output for the current thread while installed.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Workspace
// ────────────────────────────────────────────────────────────────────────────

/// A throwaway repository with a runtime library and two samples roots.
pub struct Workspace {
    pub temp: TempDir,
    pub config: HarnessConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let config = HarnessConfig {
            concurrency: 4,
            retries: Some(0),
            ..HarnessConfig::default()
        }
        .rooted_at(temp.path());

        write(&config.runtime_index, "export { SvelteComponent } from './internal';\n");
        write(&config.runtime_internal, "export class SvelteComponent {}\n");
        std::fs::create_dir_all(&config.runtime_samples).expect("runtime samples");
        std::fs::create_dir_all(&config.custom_element_samples).expect("custom element samples");

        Self { temp, config }
    }

    /// Create a runtime fixture with the given files.
    pub fn runtime_fixture(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        fixture_dir(&self.config.runtime_samples, name, files)
    }

    /// Create a custom-element fixture with the given files.
    pub fn custom_element_fixture(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        fixture_dir(&self.config.custom_element_samples, name, files)
    }
}

fn fixture_dir(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(name);
    for (file, content) in files {
        write(&dir.join(file), content);
    }
    std::fs::create_dir_all(&dir).expect("fixture dir");
    dir
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("parent dir");
    }
    std::fs::write(path, content).expect("write file");
}

// ────────────────────────────────────────────────────────────────────────────
// Compiler
// ────────────────────────────────────────────────────────────────────────────

/// Echoes the source behind a header recording the options it saw.
///
/// Every `export let unused` yields an `unused-export-let` warning; a source
/// containing `<broken` fails to compile.
#[derive(Default)]
pub struct ScriptedCompiler {
    pub compilations: AtomicUsize,
}

impl ScriptedCompiler {
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }
}

/// The warning [`ScriptedCompiler`] reports for `export let unused` at `offset`.
pub fn unused_export_warning(offset: u64) -> Diagnostic {
    Diagnostic::new("unused-export-let", "Component has unused export property 'unused'").at(
        offset,
        offset,
        offset + UNUSED_EXPORT.len() as u64,
    )
}

impl Compiler for ScriptedCompiler {
    fn compile(&self, source: &str, options: &CompileOptions) -> std::result::Result<CompileOutput, CompileError> {
        self.compilations.fetch_add(1, Ordering::SeqCst);

        if let Some(offset) = source.find("<broken") {
            return Err(CompileError {
                message: "Expected >".to_string(),
                frame: Some(format!("1: {}\n   ^ at {}", source.lines().next().unwrap_or(""), offset)),
            });
        }

        let warnings = source
            .match_indices(UNUSED_EXPORT)
            .map(|(offset, _)| CompilerWarning::from(unused_export_warning(offset as u64)))
            .collect();

        let header = serde_json::to_string(options).expect("options serialize");
        Ok(CompileOutput {
            code: format!(
                "import {{ SvelteComponent }} from 'svelte/internal';\n/* options {} */\n{}\nexport default class Component extends SvelteComponent {{}}\n",
                header, source
            ),
            map: None,
            warnings,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bundler
// ────────────────────────────────────────────────────────────────────────────

/// Walks the import graph through the plugin hooks and concatenates modules.
///
/// Unresolved relative specifiers resolve against the importer's directory
/// and are read from disk, like a real bundler's defaults.
#[derive(Default)]
pub struct GraphBundler {
    pub builds: AtomicUsize,
}

pub struct GraphBundle {
    modules: Vec<(String, String)>,
}

fn import_specifiers(code: &str) -> Vec<String> {
    let pattern = Regex::new(r#"(?m)(?:from|^import)\s+['"]([^'"]+)['"]"#).expect("import pattern");
    pattern
        .captures_iter(code)
        .map(|c| c[1].to_string())
        .collect()
}

fn resolve(plugins: &[&dyn BundlePlugin], specifier: &str, importer: Option<&str>) -> Result<String> {
    for plugin in plugins {
        if let Some(id) = plugin.resolve_id(specifier, importer)? {
            return Ok(id);
        }
    }
    if Path::new(specifier).is_absolute() {
        return Ok(specifier.to_string());
    }
    match importer {
        Some(importer) if specifier.starts_with("./") || specifier.starts_with("../") => {
            let base = Path::new(importer).parent().unwrap_or(Path::new(""));
            Ok(base.join(specifier).to_string_lossy().into_owned())
        }
        _ => Err(HarnessError::Bundle(format!(
            "Could not resolve '{}' from {}",
            specifier,
            importer.unwrap_or("entry")
        ))),
    }
}

fn load(plugins: &[&dyn BundlePlugin], id: &str) -> Result<String> {
    for plugin in plugins {
        if let Some(code) = plugin.load(id)? {
            return Ok(code);
        }
    }
    std::fs::read_to_string(id).map_err(|e| HarnessError::Bundle(format!("Could not load {}: {}", id, e)))
}

fn transform(plugins: &[&dyn BundlePlugin], code: String, id: &str) -> Result<String> {
    let mut code = code;
    for plugin in plugins {
        if let Some(out) = plugin.transform(&code, id)? {
            code = out.code;
        }
    }
    Ok(code)
}

#[async_trait]
impl Bundler for GraphBundler {
    async fn rollup(&self, input: &str, plugins: &[&dyn BundlePlugin]) -> Result<Box<dyn Bundle>> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut queue = VecDeque::from([(input.to_string(), None::<String>)]);

        while let Some((specifier, importer)) = queue.pop_front() {
            let id = resolve(plugins, &specifier, importer.as_deref())?;
            if !seen.insert(id.clone()) {
                continue;
            }
            let code = transform(plugins, load(plugins, &id)?, &id)?;
            for dependency in import_specifiers(&code) {
                queue.push_back((dependency, Some(id.clone())));
            }
            modules.push((id, code));
        }

        Ok(Box::new(GraphBundle { modules }))
    }
}

#[async_trait]
impl Bundle for GraphBundle {
    async fn generate(&self, options: &OutputOptions) -> Result<GeneratedBundle> {
        let mut code = format!("var {} = (function () {{\n", options.name);
        for (id, source) in self.modules.iter().rev() {
            code.push_str(&format!("// {}\n{}\n", id, source));
        }
        code.push_str("})();\n");
        Ok(GeneratedBundle {
            output: vec![domrig::bundle::OutputChunk { code }],
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Browser
// ────────────────────────────────────────────────────────────────────────────

/// Counters and transcripts shared by every page of a scripted browser.
#[derive(Default)]
pub struct BrowserState {
    pub launches: AtomicUsize,
    pub browsers_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    /// Bundles evaluated, in evaluation order
    pub bundles: Mutex<Vec<String>>,
    pub contents: Mutex<Vec<String>>,
}

impl BrowserState {
    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }

    /// Bundles whose text contains `needle`.
    pub fn bundles_containing(&self, needle: &str) -> Vec<String> {
        self.bundles
            .lock()
            .iter()
            .filter(|b| b.contains(needle))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    pub state: Arc<BrowserState>,
    pub launch_delay: Option<Duration>,
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBrowser {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct ScriptedBrowser {
    pub state: Arc<BrowserState>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrowserState::default()),
        }
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            state: Arc::clone(&self.state),
            console: Mutex::new(None),
            bundle: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.state.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedPage {
    state: Arc<BrowserState>,
    console: Mutex<Option<ConsoleSender>>,
    bundle: Mutex<Option<String>>,
}

fn directive<'a>(bundle: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<!-- {}: ", name);
    let start = bundle.find(&open)? + open.len();
    let end = bundle[start..].find(" -->")? + start;
    Some(&bundle[start..end])
}

impl ScriptedPage {
    fn emit(&self, level: ConsoleLevel, text: &str) {
        if let Some(tx) = self.console.lock().as_ref() {
            let _ = tx.send(ConsoleMessage::new(level, text));
        }
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn console(&self) -> Result<ConsoleSubscription> {
        let (tx, subscription) = ConsoleSubscription::channel();
        *self.console.lock() = Some(tx);
        Ok(subscription)
    }

    async fn set_content(&self, html: &str) -> Result<()> {
        self.state.contents.lock().push(html.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if script != ENTRY_INVOCATION {
            if self.state.contents.lock().last().map(String::as_str) != Some(PAGE_HTML) {
                return Err(HarnessError::Browser("bundle evaluated before content was set".to_string()));
            }
            self.state.bundles.lock().push(script.to_string());
            *self.bundle.lock() = Some(script.to_string());
            return Ok(Value::Null);
        }

        let bundle = self
            .bundle
            .lock()
            .clone()
            .ok_or_else(|| HarnessError::Execution {
                message: "ReferenceError: test is not defined".to_string(),
            })?;

        if let Some(text) = directive(&bundle, "log") {
            self.emit(ConsoleLevel::Log, text);
        }
        if bundle.contains("<!-- hang -->") {
            std::future::pending::<()>().await;
        }
        if let Some(message) = directive(&bundle, "throw") {
            self.emit(ConsoleLevel::Error, message);
            return Err(HarnessError::Execution {
                message: format!("Error: {}", message),
            });
        }
        Ok(directive(&bundle, "return").map_or(Value::Null, |v| json!(v)))
    }

    async fn close(&self) -> Result<()> {
        self.console.lock().take();
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
