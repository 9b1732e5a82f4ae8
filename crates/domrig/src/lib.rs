//! Compile-and-execute browser harness for a component compiler.
//!
//! Each fixture directory is compiled through an external compiler, bundled
//! into one self-contained script, and executed in a fresh browser page.
//! Compiler warnings are checked against the fixture's declared list.
//!
//! # Architecture
//!
//! ```text
//! FixtureRegistry → VirtualResolver + CompileStage → Bundler → Page
//!                                   ↓                            ↓
//!                          DiagnosticCollector  ──────→  verify / FailureSet
//! ```
//!
//! The compiler, the bundler and the browser are traits ([`Compiler`],
//! [`Bundler`], [`BrowserLauncher`]); enable the `chrome` feature for a
//! headless Chrome backend.

pub mod browser;
pub mod bundle;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod failure;
pub mod fixture;
pub mod report;
pub mod resolve;
pub mod suite;
pub mod transform;
pub mod variant;

pub use browser::{Browser, BrowserLauncher, ConsoleLevel, ConsoleMessage, ConsoleSubscription, Page, PageOutput};
pub use bundle::{Bundle, BundlePlugin, Bundler, GeneratedBundle, OutputOptions};
pub use compiler::{CompileError, CompileOptions, CompileOutput, Compiler, CompilerWarning, ProcessCompiler};
pub use config::{FixtureConfig, HarnessConfig, RunPolicy};
pub use diagnostic::{Diagnostic, DiagnosticCollector, SourceLocation};
pub use error::{HarnessError, Result};
pub use failure::FailureSet;
pub use fixture::{Fixture, FixtureRegistry, MarkerStyle};
pub use report::Reporter;
pub use suite::{
    run_suite, run_suites, CaseOutcome, CaseResult, CustomElementSuite, RuntimeSuite, Suite, SuiteReport, Toolchain,
    LAUNCH_TIMEOUT,
};
pub use variant::Variant;

#[cfg(feature = "chrome")]
pub use browser::chrome::ChromeLauncher;
