//! Fixtures that have already failed during this suite run.

use dashmap::DashSet;

/// Shared by every case of a suite run; concurrent cases may record and
/// check it at the same time. Lives for one run only.
#[derive(Debug, Default)]
pub struct FailureSet {
    failed: DashSet<String>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fixture: &str) -> bool {
        self.failed.contains(fixture)
    }

    /// Record `fixture` as failed. Returns `false` if it already was.
    pub fn record(&self, fixture: &str) -> bool {
        self.failed.insert(fixture.to_string())
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }
}
