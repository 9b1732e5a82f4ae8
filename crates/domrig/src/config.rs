//! Fixture configuration (`_config.json`) and harness configuration (`domrig.toml`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::diagnostic::Diagnostic;
use crate::error::{HarnessError, Result};

/// File name of the per-fixture harness configuration.
pub const CONFIG_FILE: &str = "_config.json";

/// File name of the per-fixture in-page test module.
pub const CONFIG_MODULE_FILE: &str = "_config.js";

/// Per-fixture options read by the harness.
///
/// Everything the in-page driver needs (props, expected html, the test
/// callback) lives in `_config.js`; keys this struct does not know are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Run exclusively
    #[serde(default)]
    pub solo: bool,

    /// Exclude entirely
    #[serde(default)]
    pub skip: bool,

    /// Exclude only the hydrated variant
    #[serde(default)]
    pub skip_if_hydrate: bool,

    /// Options handed to the compiler as-is
    #[serde(default, rename = "compileOptions", alias = "compile_options")]
    pub compile_options: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,

    /// Defaults to enabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessors: Option<bool>,

    /// Expected warnings, in emission order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<Diagnostic>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<bool>,
}

impl FixtureConfig {
    /// Parse configuration from JSON text.
    pub fn parse(json: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HarnessError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `_config.json` from a fixture directory.
    ///
    /// A missing file yields the default configuration. A file that exists
    /// but cannot be read or parsed is an error for that fixture only.
    pub fn load(fixture_dir: &Path) -> Result<Self> {
        let path = fixture_dir.join(CONFIG_FILE);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(HarnessError::ConfigLoad {
                    path,
                    message: e.to_string(),
                })
            }
        };
        Self::parse(&json, &path)
    }

    /// Effective `accessors` flag.
    pub fn accessors_enabled(&self) -> bool {
        self.accessors.unwrap_or(true)
    }
}

/// Timeout and retry budget for a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl RunPolicy {
    /// Default budget: 20 seconds, one retry when running under CI.
    pub fn from_env() -> Self {
        Self::for_ci(is_ci())
    }

    pub fn for_ci(ci: bool) -> Self {
        Self {
            timeout: Duration::from_millis(default_timeout_ms()),
            retries: if ci { 1 } else { 0 },
        }
    }
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self::for_ci(false)
    }
}

/// Whether the `CI` environment variable is set to a non-empty value.
pub fn is_ci() -> bool {
    std::env::var_os("CI").is_some_and(|v| !v.is_empty())
}

/// Harness-wide settings (`domrig.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Package name fixtures import the component runtime from
    pub runtime_package: String,

    /// Runtime index module, served for `<runtime_package>`
    pub runtime_index: PathBuf,

    /// Runtime internals module, served for `<runtime_package>/internal` and `./internal`
    pub runtime_internal: PathBuf,

    /// Extension (without dot) of files handed to the compiler
    pub component_extension: String,

    /// Entry component of a runtime fixture
    pub entry_file: String,

    /// Entry script of a custom-element fixture
    pub custom_element_entry: String,

    /// Directory holding runtime fixtures
    pub runtime_samples: PathBuf,

    /// Directory holding custom-element fixtures
    pub custom_element_samples: PathBuf,

    /// Per-case timeout in milliseconds
    pub timeout_ms: u64,

    /// Retries per case; `None` derives it from the `CI` variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Fixtures executed at once; 0 means one per CPU
    pub concurrency: usize,
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runtime_package: "svelte".to_string(),
            runtime_index: PathBuf::from("src/runtime/index.js"),
            runtime_internal: PathBuf::from("src/runtime/internal/index.js"),
            component_extension: "svelte".to_string(),
            entry_file: "main.svelte".to_string(),
            custom_element_entry: "test.js".to_string(),
            runtime_samples: PathBuf::from("test/runtime-browser/samples"),
            custom_element_samples: PathBuf::from("test/runtime-browser/custom-elements-samples"),
            timeout_ms: default_timeout_ms(),
            retries: None,
            concurrency: 0,
        }
    }
}

impl HarnessConfig {
    /// Parse harness settings from TOML text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| HarnessError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read harness settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text, path)
    }

    /// Resolve every relative path against `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for path in [
            &mut self.runtime_index,
            &mut self.runtime_internal,
            &mut self.runtime_samples,
            &mut self.custom_element_samples,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }

    /// Per-case budget, taking `CI` into account when retries are not pinned.
    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries.unwrap_or_else(|| RunPolicy::from_env().retries),
        }
    }

    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            num_cpus::get()
        } else {
            self.concurrency
        }
    }
}
