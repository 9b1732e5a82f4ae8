//! The component compiler, seen from the harness.
//!
//! The compiler is a black box: source text and options in, generated code
//! and warnings out, or an error carrying an optional source frame.
//! [`ProcessCompiler`] drives an external compiler process over JSON.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::FixtureConfig;
use crate::diagnostic::{Diagnostic, SourceLocation};
use crate::error::HarnessError;
use crate::variant::Variant;

/// Options handed to the compiler.
///
/// The typed flags are set by the harness; `extra` carries a fixture's
/// `compileOptions` through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydratable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessors: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_element: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompileOptions {
    /// Options for the runtime suite.
    ///
    /// Starts from the fixture's `compileOptions`, then sets `hydratable` from
    /// the variant, passes `immutable` through, and enables `accessors` unless
    /// the fixture turns them off. The harness flags win over pass-through keys.
    pub fn for_runtime(config: &FixtureConfig, variant: Variant) -> Self {
        let mut extra = config.compile_options.clone();
        for key in ["hydratable", "immutable", "accessors"] {
            extra.remove(key);
        }
        Self {
            hydratable: Some(variant.is_hydrate()),
            immutable: config.immutable,
            accessors: Some(config.accessors_enabled()),
            extra,
            ..Default::default()
        }
    }

    /// Options for the custom-element suite: fixed, nothing merged.
    pub fn for_custom_element(config: &FixtureConfig) -> Self {
        Self {
            custom_element: Some(true),
            dev: config.dev,
            ..Default::default()
        }
    }
}

/// A warning as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerWarning {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl CompilerWarning {
    /// Keep only the fields that take part in comparison.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            code: self.code.clone(),
            message: self.message.clone(),
            pos: self.pos,
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }
}

impl From<Diagnostic> for CompilerWarning {
    fn from(d: Diagnostic) -> Self {
        Self {
            code: d.code,
            message: d.message,
            pos: d.pos,
            start: d.start,
            end: d.end,
            filename: None,
            frame: None,
        }
    }
}

/// Successful compiler output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<serde_json::Value>,
    #[serde(default)]
    pub warnings: Vec<CompilerWarning>,
}

/// The compiler rejected its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frame: None,
        }
    }
}

impl From<CompileError> for HarnessError {
    fn from(e: CompileError) -> Self {
        HarnessError::Compile {
            message: e.message,
            frame: e.frame,
        }
    }
}

/// A component compiler. Compilation is synchronous.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompileOutput, CompileError>;
}

impl<F> Compiler for F
where
    F: Fn(&str, &CompileOptions) -> Result<CompileOutput, CompileError> + Send + Sync,
{
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompileOutput, CompileError> {
        self(source, options)
    }
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    source: &'a str,
    options: &'a CompileOptions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProcessResponse {
    Failed { error: CompileError },
    Compiled(CompileOutput),
}

/// Runs an external compiler command once per file.
///
/// The command receives `{"source": ..., "options": {...}}` on stdin and
/// answers on stdout with either `{"code", "map"?, "warnings"}` or
/// `{"error": {"message", "frame"?}}`.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Compiler for ProcessCompiler {
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompileOutput, CompileError> {
        let request = serde_json::to_vec(&ProcessRequest { source, options })
            .map_err(|e| CompileError::new(format!("Failed to encode compile request: {}", e)))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            CompileError::new(format!(
                "Failed to start compiler {}: {}",
                self.program.display(),
                e
            ))
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&request) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(CompileError::new(format!("Failed to write to compiler: {}", e)));
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|e| CompileError::new(format!("Compiler did not finish: {}", e)))?;

        match serde_json::from_slice::<ProcessResponse>(&output.stdout) {
            Ok(ProcessResponse::Compiled(out)) if output.status.success() => Ok(out),
            Ok(ProcessResponse::Failed { error }) => Err(error),
            _ => Err(CompileError::new(format!(
                "Compiler exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
