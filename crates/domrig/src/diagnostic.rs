//! Compiler warnings and their verification against a fixture's declared list.
//!
//! Warnings are collected in emission order into a [`DiagnosticCollector`]
//! owned by a single (fixture, variant) run. Once the bundle step finishes,
//! [`verify`] compares the collected sequence with the expected list.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Where a warning starts or ends.
///
/// Compilers report either a bare character offset or a full position record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceLocation {
    Offset(u64),
    Position {
        line: u64,
        column: u64,
        character: u64,
    },
}

/// A compiler warning, projected to the fields that take part in comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            pos: None,
            start: None,
            end: None,
        }
    }

    /// Attach `pos`, `start` and `end` as plain offsets.
    pub fn at(mut self, pos: u64, start: u64, end: u64) -> Self {
        self.pos = Some(pos);
        self.start = Some(SourceLocation::Offset(start));
        self.end = Some(SourceLocation::Offset(end));
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.code, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " [pos {}]", pos)?;
        }
        Ok(())
    }
}

/// Insertion-ordered accumulator for the warnings of one run.
///
/// Shared by reference between the compile stage (writer) and verification
/// (reader). Appends are never rolled back, so warnings emitted before a
/// compile failure remain visible to the failure path.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }

    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&self, diagnostics: I) {
        self.entries.lock().extend(diagnostics);
    }

    /// Copy of the warnings collected so far, in emission order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Compare collected warnings against the declared list.
///
/// With a declared list the sequences must be equal field by field and in
/// order. Without one, any collected warning is a failure.
pub fn verify(expected: Option<&[Diagnostic]>, actual: &[Diagnostic]) -> Result<()> {
    match expected {
        Some(expected) if expected == actual => Ok(()),
        Some(expected) => Err(HarnessError::DiagnosticMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }),
        None if actual.is_empty() => Ok(()),
        None => Err(HarnessError::UnexpectedDiagnostics(actual.to_vec())),
    }
}
