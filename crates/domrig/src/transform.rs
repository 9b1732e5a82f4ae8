//! Compile-transform stage: turns component sources into module code while
//! the bundler walks the module graph.

use std::path::{Path, PathBuf};

use crate::bundle::TransformOutput;
use crate::compiler::{CompileOptions, Compiler};
use crate::diagnostic::DiagnosticCollector;
use crate::error::Result;

/// Compiles every module whose id carries the component extension.
///
/// Each compiled artifact is also written to `output_dir` for inspection;
/// the harness never reads these files back. Warnings are appended to the
/// run's collector in emission order.
pub struct CompileStage<'a> {
    compiler: &'a dyn Compiler,
    options: CompileOptions,
    extension: String,
    output_dir: Option<PathBuf>,
    diagnostics: &'a DiagnosticCollector,
}

impl<'a> CompileStage<'a> {
    pub fn new(
        compiler: &'a dyn Compiler,
        options: CompileOptions,
        extension: &str,
        diagnostics: &'a DiagnosticCollector,
    ) -> Self {
        Self {
            compiler,
            options,
            extension: format!(".{}", extension.trim_start_matches('.')),
            output_dir: None,
            diagnostics,
        }
    }

    /// Write compiled artifacts under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Whether `id` names a component source.
    pub fn matches(&self, id: &str) -> bool {
        id.ends_with(&self.extension)
    }

    /// Compile `code` if `id` is a component; `Ok(None)` leaves other modules alone.
    ///
    /// Compiler errors are returned as-is so the bundle step fails.
    pub fn transform(&self, code: &str, id: &str) -> Result<Option<TransformOutput>> {
        if !self.matches(id) {
            return Ok(None);
        }

        let source = code.replace('\r', "");
        let compiled = self.compiler.compile(&source, &self.options)?;

        if let Some(dir) = &self.output_dir {
            let out = dir.join(artifact_name(id, &self.extension));
            std::fs::create_dir_all(dir)?;
            std::fs::write(&out, &compiled.code)?;
            tracing::debug!(target: "domrig::transform", path = %out.display(), "wrote compiled artifact");
        }

        self.diagnostics
            .extend(compiled.warnings.iter().map(|w| w.to_diagnostic()));

        Ok(Some(TransformOutput {
            code: compiled.code,
            map: compiled.map,
        }))
    }
}

/// `Nested.svelte` → `Nested.js`
fn artifact_name(id: &str, extension: &str) -> String {
    let base = Path::new(id)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string());
    match base.strip_suffix(extension) {
        Some(stem) => format!("{}.js", stem),
        None => format!("{}.js", base),
    }
}
