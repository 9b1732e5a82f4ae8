//! Virtual module resolution.
//!
//! Maps the logical specifiers a fixture bundle imports to concrete content:
//! - **FixedFile**: a runtime library file on disk
//! - **FixtureEntry**: the fixture's entry component
//! - **FixtureConfig**: the fixture's in-page config module
//! - **InMemory**: the driver or assertion script, served from memory
//! - **Unresolved**: left to the bundler's own path resolution
//!
//! Everything is decided when the resolver is built, so resolving the same
//! specifier twice during one build always gives the same answer.

use std::path::PathBuf;

use crate::config::{HarnessConfig, CONFIG_MODULE_FILE};
use crate::fixture::Fixture;
use crate::variant::Variant;

/// Entry specifier of the runtime suite's driver module.
pub const MAIN_SPECIFIER: &str = "main";

/// Specifier of the in-page assertion helpers.
pub const ASSERT_SPECIFIER: &str = "assert";

/// Specifier the driver imports the fixture's entry component from.
pub const ENTRY_PLACEHOLDER: &str = "__MAIN_DOT_SVELTE__";

/// Specifier the driver imports the fixture's config module from.
pub const CONFIG_PLACEHOLDER: &str = "__CONFIG__";

/// Token in the driver source replaced by `true` / `false`.
pub const HYDRATE_PLACEHOLDER: &str = "__HYDRATE__";

/// Driver module: mounts the entry component and runs the config's test.
pub const DRIVER_SOURCE: &str = include_str!("../runtime/driver.js");

/// Assertion helpers available to fixtures as `import * as assert from 'assert'`.
pub const ASSERT_SOURCE: &str = include_str!("../runtime/assert.js");

/// Served for `__CONFIG__` when a fixture has no `_config.js`.
pub const EMPTY_CONFIG_MODULE: &str = "export default {};\n";

/// Where a specifier's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    FixedFile(PathBuf),
    FixtureEntry,
    FixtureConfig,
    InMemory(String),
    Unresolved,
}

/// Resolution table for one fixture build.
#[derive(Debug, Clone)]
pub struct VirtualResolver {
    runtime_package: String,
    internal_specifier: String,
    runtime_index: PathBuf,
    runtime_internal: PathBuf,
    entry: PathBuf,
    config_module: Option<PathBuf>,
    /// Driver source with the hydrate flag substituted; `None` for suites
    /// whose entry is the fixture's own script.
    driver: Option<String>,
}

impl VirtualResolver {
    /// Resolver for a runtime-suite build of `fixture` under `variant`.
    pub fn runtime(config: &HarnessConfig, fixture: &Fixture, variant: Variant) -> Self {
        let config_module = fixture.file(CONFIG_MODULE_FILE);
        Self {
            driver: Some(driver_source(variant.is_hydrate())),
            config_module: config_module.is_file().then_some(config_module),
            entry: fixture.file(&config.entry_file),
            ..Self::base(config)
        }
    }

    /// Resolver for a custom-element build: only the runtime library and the
    /// assertion helpers are virtual.
    pub fn custom_element(config: &HarnessConfig, fixture: &Fixture) -> Self {
        Self {
            entry: fixture.file(&config.custom_element_entry),
            ..Self::base(config)
        }
    }

    fn base(config: &HarnessConfig) -> Self {
        Self {
            runtime_package: config.runtime_package.clone(),
            internal_specifier: format!("{}/internal", config.runtime_package),
            runtime_index: config.runtime_index.clone(),
            runtime_internal: config.runtime_internal.clone(),
            entry: PathBuf::new(),
            config_module: None,
            driver: None,
        }
    }

    /// Entry file of the fixture (component or custom script).
    pub fn entry(&self) -> &PathBuf {
        &self.entry
    }

    /// Whether this resolver serves the driver module.
    pub fn has_driver(&self) -> bool {
        self.driver.is_some()
    }

    pub fn resolve(&self, specifier: &str) -> Resolution {
        if specifier == self.internal_specifier || specifier == "./internal" {
            return Resolution::FixedFile(self.runtime_internal.clone());
        }
        if specifier == self.runtime_package {
            return Resolution::FixedFile(self.runtime_index.clone());
        }
        match (specifier, &self.driver) {
            (ASSERT_SPECIFIER, _) => Resolution::InMemory(ASSERT_SOURCE.to_string()),
            (MAIN_SPECIFIER, Some(driver)) => Resolution::InMemory(driver.clone()),
            (ENTRY_PLACEHOLDER, Some(_)) => Resolution::FixtureEntry,
            (CONFIG_PLACEHOLDER, Some(_)) => match &self.config_module {
                Some(_) => Resolution::FixtureConfig,
                None => Resolution::InMemory(EMPTY_CONFIG_MODULE.to_string()),
            },
            _ => Resolution::Unresolved,
        }
    }

    /// Module id the bundler should use for `specifier`.
    ///
    /// In-memory modules keep their logical name as id; files use their path.
    pub fn resolve_id(&self, specifier: &str) -> Option<String> {
        match self.resolve(specifier) {
            Resolution::FixedFile(path) => Some(path.to_string_lossy().into_owned()),
            Resolution::FixtureEntry => Some(self.entry.to_string_lossy().into_owned()),
            Resolution::FixtureConfig => self
                .config_module
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            Resolution::InMemory(_) => Some(specifier.to_string()),
            Resolution::Unresolved => None,
        }
    }

    /// Content for a module id produced by [`resolve_id`](Self::resolve_id),
    /// if it is served from memory. File-backed ids return `None` so the
    /// bundler reads them from disk.
    pub fn load(&self, id: &str) -> Option<String> {
        match self.resolve(id) {
            Resolution::InMemory(content) => Some(content),
            _ => None,
        }
    }
}

/// Driver source with the hydrate placeholder substituted.
pub fn driver_source(hydrate: bool) -> String {
    DRIVER_SOURCE.replace(HYDRATE_PLACEHOLDER, if hydrate { "true" } else { "false" })
}
