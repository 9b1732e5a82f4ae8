//! Bundle assembly.
//!
//! The bundler itself is external. The harness plugs the virtual resolver
//! and the compile stage into it as a single [`HarnessPlugin`], picks the
//! entry specifier, and asks for one self-contained IIFE exposing the
//! entry function under [`ENTRY_GLOBAL`].

use async_trait::async_trait;

use crate::error::{HarnessError, Result};
use crate::resolve::VirtualResolver;
use crate::transform::CompileStage;

/// Global name the generated bundle assigns its default export to.
pub const ENTRY_GLOBAL: &str = "test";

/// Code produced by a transform hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<serde_json::Value>,
}

/// Hooks a bundler calls while building the module graph.
///
/// Every hook returns `Ok(None)` to defer to the next plugin or to the
/// bundler's default behaviour. Errors abort the build.
pub trait BundlePlugin: Send + Sync {
    fn name(&self) -> &str;

    fn resolve_id(&self, _importee: &str, _importer: Option<&str>) -> Result<Option<String>> {
        Ok(None)
    }

    fn load(&self, _id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn transform(&self, _code: &str, _id: &str) -> Result<Option<TransformOutput>> {
        Ok(None)
    }
}

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Immediately-invoked function assigning exports to a global
    Iife,
    Es,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub name: String,
}

impl OutputOptions {
    pub fn iife(name: &str) -> Self {
        Self {
            format: OutputFormat::Iife,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub code: String,
}

/// Result of [`Bundle::generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedBundle {
    pub output: Vec<OutputChunk>,
}

impl GeneratedBundle {
    /// Code of the entry chunk.
    pub fn into_code(self) -> Result<String> {
        self.output
            .into_iter()
            .next()
            .map(|chunk| chunk.code)
            .ok_or_else(|| HarnessError::Bundle("bundle produced no output".to_string()))
    }
}

/// A built module graph.
#[async_trait]
pub trait Bundle: Send + Sync {
    async fn generate(&self, options: &OutputOptions) -> Result<GeneratedBundle>;
}

/// An external bundler.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Build the module graph reachable from `input`.
    async fn rollup(&self, input: &str, plugins: &[&dyn BundlePlugin]) -> Result<Box<dyn Bundle>>;
}

/// The harness's single bundler plugin: virtual resolution plus compilation.
pub struct HarnessPlugin<'a> {
    name: &'static str,
    resolver: &'a VirtualResolver,
    stage: CompileStage<'a>,
}

impl<'a> HarnessPlugin<'a> {
    pub fn new(name: &'static str, resolver: &'a VirtualResolver, stage: CompileStage<'a>) -> Self {
        Self {
            name,
            resolver,
            stage,
        }
    }
}

impl BundlePlugin for HarnessPlugin<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn resolve_id(&self, importee: &str, _importer: Option<&str>) -> Result<Option<String>> {
        Ok(self.resolver.resolve_id(importee))
    }

    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.resolver.load(id))
    }

    fn transform(&self, code: &str, id: &str) -> Result<Option<TransformOutput>> {
        self.stage.transform(code, id)
    }
}

/// Build and generate the executable bundle for one (fixture, variant).
pub async fn assemble(bundler: &dyn Bundler, input: &str, plugin: &HarnessPlugin<'_>) -> Result<String> {
    let plugins: [&dyn BundlePlugin; 1] = [plugin];
    let bundle = bundler.rollup(input, &plugins).await?;
    let generated = bundle.generate(&OutputOptions::iife(ENTRY_GLOBAL)).await?;
    generated.into_code()
}
