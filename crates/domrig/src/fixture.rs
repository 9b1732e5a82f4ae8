//! Fixture discovery and run eligibility.
//!
//! A fixture is a directory under a samples root. Its name and its
//! `_config.json` decide whether it runs:
//! - `solo`: when any fixture in the registry is solo, only solo fixtures run
//! - `skip`: never runs
//! - `skip_if_hydrate`: the hydrated variant is not registered at all
//!
//! A fixture marked both solo and skip is skipped under
//! [`MarkerStyle::Contains`] and runs solo under [`MarkerStyle::Suffix`].

use std::path::{Path, PathBuf};

use crate::config::FixtureConfig;
use crate::error::{HarnessError, Result};
use crate::variant::Variant;

/// How `.solo` / `.skip` markers are recognised in directory names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// Marker anywhere in the name (`foo.solo`, `foo.solo.bar`)
    Contains,
    /// Marker only as the final suffix (`foo.solo`)
    Suffix,
}

impl MarkerStyle {
    fn matches(self, name: &str, marker: &str) -> bool {
        match self {
            MarkerStyle::Contains => name.contains(marker),
            MarkerStyle::Suffix => name.ends_with(marker),
        }
    }

    /// Whether `solo` takes precedence over `skip` on the same fixture.
    fn solo_wins(self) -> bool {
        matches!(self, MarkerStyle::Suffix)
    }
}

/// A discovered fixture directory.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub dir: PathBuf,
    config: FixtureConfig,
    load_error: Option<(PathBuf, String)>,
}

impl Fixture {
    /// Load a fixture from its directory. Configuration errors are kept and
    /// reported when the fixture runs, not here.
    pub fn load(dir: &Path) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match FixtureConfig::load(dir) {
            Ok(config) => Self {
                name,
                dir: dir.to_path_buf(),
                config,
                load_error: None,
            },
            Err(HarnessError::ConfigLoad { path, message }) => Self {
                name,
                dir: dir.to_path_buf(),
                config: FixtureConfig::default(),
                load_error: Some((path, message)),
            },
            Err(e) => Self {
                name,
                dir: dir.to_path_buf(),
                config: FixtureConfig::default(),
                load_error: Some((dir.to_path_buf(), e.to_string())),
            },
        }
    }

    /// Build a fixture from an already known configuration.
    pub fn with_config(name: impl Into<String>, dir: impl Into<PathBuf>, config: FixtureConfig) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            config,
            load_error: None,
        }
    }

    /// The fixture configuration, or the error that prevented loading it.
    pub fn config(&self) -> Result<&FixtureConfig> {
        match &self.load_error {
            None => Ok(&self.config),
            Some((path, message)) => Err(HarnessError::ConfigLoad {
                path: path.clone(),
                message: message.clone(),
            }),
        }
    }

    pub fn is_solo(&self, markers: MarkerStyle) -> bool {
        self.config.solo || markers.matches(&self.name, ".solo")
    }

    pub fn is_skip(&self, markers: MarkerStyle) -> bool {
        self.config.skip || markers.matches(&self.name, ".skip")
    }

    /// Path of a file inside the fixture directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Why a registered case does not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Run,
    Skip(&'static str),
}

/// One registered (fixture, variant) test case.
#[derive(Debug, Clone)]
pub struct Case<'a> {
    pub fixture: &'a Fixture,
    pub variant: Variant,
    pub selection: Selection,
}

impl Case<'_> {
    pub fn name(&self) -> String {
        self.variant.test_name(&self.fixture.name)
    }
}

/// All fixtures of one samples directory.
#[derive(Debug, Clone)]
pub struct FixtureRegistry {
    fixtures: Vec<Fixture>,
    markers: MarkerStyle,
}

impl FixtureRegistry {
    /// List fixture directories under `root`, ignoring hidden entries.
    ///
    /// The returned fixtures are sorted by name to keep registration order stable.
    pub fn discover(root: &Path, markers: MarkerStyle) -> Result<Self> {
        let mut fixtures = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            fixtures.push(Fixture::load(&entry.path()));
        }
        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { fixtures, markers })
    }

    pub fn from_fixtures(fixtures: Vec<Fixture>, markers: MarkerStyle) -> Self {
        Self { fixtures, markers }
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn markers(&self) -> MarkerStyle {
        self.markers
    }

    /// Whether `fixture` registers as a solo case.
    fn runs_solo(&self, fixture: &Fixture) -> bool {
        fixture.is_solo(self.markers) && (self.markers.solo_wins() || !fixture.is_skip(self.markers))
    }

    /// Whether any fixture registers as solo. A skipped solo fixture in the
    /// runtime suite does not count.
    pub fn has_solo(&self) -> bool {
        self.fixtures.iter().any(|f| self.runs_solo(f))
    }

    pub fn selection(&self, fixture: &Fixture) -> Selection {
        if self.runs_solo(fixture) {
            Selection::Run
        } else if fixture.is_skip(self.markers) {
            Selection::Skip("marked skip")
        } else if self.has_solo() {
            Selection::Skip("another fixture is solo")
        } else {
            Selection::Run
        }
    }

    /// Register one case per fixture and variant.
    ///
    /// Hydrated cases of `skip_if_hydrate` fixtures are left out entirely.
    pub fn cases(&self, variants: &[Variant]) -> Vec<Case<'_>> {
        let mut cases = Vec::new();
        for fixture in &self.fixtures {
            let selection = self.selection(fixture);
            for &variant in variants {
                if variant.is_hydrate() && fixture.config.skip_if_hydrate {
                    continue;
                }
                cases.push(Case {
                    fixture,
                    variant,
                    selection: selection.clone(),
                });
            }
        }
        cases
    }
}
