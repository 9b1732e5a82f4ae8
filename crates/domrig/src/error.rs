//! Harness error types.

use std::path::PathBuf;
use std::time::Duration;

use crate::diagnostic::Diagnostic;

/// Errors that can fail a single fixture run (or, for `Browser`, the suite setup).
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Fixture configuration exists but could not be read or parsed
    #[error("Failed to load config {}: {message}", .path.display())]
    ConfigLoad { path: PathBuf, message: String },

    /// The component compiler rejected a source file
    #[error("Compile error: {message}")]
    Compile {
        message: String,
        /// Source excerpt pointing at the offending location, if the compiler provided one
        frame: Option<String>,
    },

    /// Module resolution, transform, or bundle generation failed
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// The browser process or page could not be driven
    #[error("Browser error: {0}")]
    Browser(String),

    /// The in-page entry function threw or rejected
    #[error("{message}")]
    Execution { message: String },

    /// Collected warnings differ from the declared list
    #[error("Warnings do not match: expected {} warning(s), received {}", .expected.len(), .actual.len())]
    DiagnosticMismatch {
        expected: Vec<Diagnostic>,
        actual: Vec<Diagnostic>,
    },

    /// Warnings were emitted by a fixture that declares none
    #[error("Received unexpected warnings")]
    UnexpectedDiagnostics(Vec<Diagnostic>),

    /// A previous variant of the fixture already failed
    #[error("skipping test, already failed")]
    AlreadyFailed { fixture: String },

    /// The case exceeded its time budget
    #[error("Test timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl HarnessError {
    /// Short category label used by the reporter.
    pub fn category(&self) -> &'static str {
        match self {
            HarnessError::Io(_) => "io",
            HarnessError::ConfigLoad { .. } => "config",
            HarnessError::Compile { .. } => "compile",
            HarnessError::Bundle(_) => "bundle",
            HarnessError::Browser(_) => "browser",
            HarnessError::Execution { .. } => "assertion",
            HarnessError::DiagnosticMismatch { .. } | HarnessError::UnexpectedDiagnostics(_) => {
                "warnings"
            }
            HarnessError::AlreadyFailed { .. } => "cached",
            HarnessError::Timeout(_) => "timeout",
        }
    }

    /// Whether the error originated from warning verification.
    pub fn is_diagnostic_failure(&self) -> bool {
        matches!(
            self,
            HarnessError::DiagnosticMismatch { .. } | HarnessError::UnexpectedDiagnostics(_)
        )
    }
}

/// Result alias used throughout the harness.
pub type Result<T> = std::result::Result<T, HarnessError>;
