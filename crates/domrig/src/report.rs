//! Colored suite reporting.
//!
//! Uses `termcolor` for cross-platform colored terminal output and respects
//! `NO_COLOR`. In-page assertion failures of the form
//! `Expected "<received>" to equal "<expected>"` are rendered as a word diff.

use std::io::Write;
use std::sync::OnceLock;

use difference::{Changeset, Difference};
use regex::Regex;
use termcolor::{Buffer, Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::diagnostic::Diagnostic;
use crate::error::HarnessError;
use crate::suite::{CaseOutcome, SuiteReport};

/// Resolve `ColorChoice` from a `--color` style flag and the environment.
///
/// Priority: `NO_COLOR` env > flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Split an in-page equality failure into `(received, expected)`.
pub fn assertion_operands(message: &str) -> Option<(&str, &str)> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r#"(?s)Expected "(.+)" to equal "(.+)""#).ok())
        .as_ref()?;
    let captures = pattern.captures(message)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Uncolored failure details, as printed under a failed case.
pub fn render_failure(error: &HarnessError) -> String {
    let mut reporter = Reporter::new(Buffer::no_color());
    reporter.failure_body(error);
    String::from_utf8_lossy(&reporter.into_inner().into_inner()).into_owned()
}

/// Styled writer for suite reports.
pub struct Reporter<W: WriteColor = StandardStream> {
    out: W,
}

impl Reporter<StandardStream> {
    /// Report to stdout.
    pub fn stdout(choice: ColorChoice) -> Self {
        Self::new(StandardStream::stdout(choice))
    }
}

impl<W: WriteColor> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.out.set_color(&spec);
        let _ = write!(self.out, "{}", text);
        let _ = self.out.reset();
    }

    fn plain(&mut self, text: &str) {
        let _ = write!(self.out, "{}", text);
    }

    fn newline(&mut self) {
        let _ = writeln!(self.out);
    }

    fn badge(&mut self, label: &str, bg: Color, fg: Color) {
        let mut spec = ColorSpec::new();
        spec.set_bg(Some(bg)).set_fg(Some(fg)).set_bold(true);
        let _ = self.out.set_color(&spec);
        let _ = write!(self.out, " {} ", label);
        let _ = self.out.reset();
    }

    /// One line per case, then failure details, then totals.
    pub fn suite(&mut self, report: &SuiteReport) {
        self.newline();
        self.styled(&report.suite, None, true);
        self.newline();

        for case in &report.cases {
            self.plain("  ");
            match &case.outcome {
                CaseOutcome::Passed(_) => self.badge("PASS", Color::Green, Color::White),
                CaseOutcome::Failed(_) => self.badge("FAIL", Color::Red, Color::White),
                CaseOutcome::Skipped(_) => self.badge("SKIP", Color::Yellow, Color::Black),
            }
            self.plain(&format!(" {}", case.name));
            match &case.outcome {
                CaseOutcome::Skipped(reason) => self.styled(&format!(" ({})", reason), Some(Color::White), false),
                _ if case.attempts > 1 => {
                    self.styled(&format!(" ({} attempts)", case.attempts), Some(Color::White), false)
                }
                _ => {}
            }
            self.newline();
        }

        let failures: Vec<_> = report
            .cases
            .iter()
            .filter_map(|c| c.outcome.error().map(|e| (c.name.as_str(), e)))
            .collect();
        if !failures.is_empty() {
            self.newline();
            self.styled("──────────────────────────────────────────", Some(Color::White), false);
            self.newline();
            for (name, error) in failures {
                self.failure(name, error);
            }
        }

        self.summary(report);
        let _ = self.out.flush();
    }

    /// Details for one failed case.
    pub fn failure(&mut self, name: &str, error: &HarnessError) {
        self.newline();
        self.styled("  ● ", Some(Color::Red), true);
        self.styled(name, Some(Color::Red), true);
        self.styled(&format!(" [{}]", error.category()), Some(Color::White), false);
        self.newline();
        self.newline();
        self.failure_body(error);
    }

    fn failure_body(&mut self, error: &HarnessError) {
        match error {
            HarnessError::Execution { message } => match assertion_operands(message) {
                Some((received, expected)) => self.assertion_diff(expected, received),
                None => self.indented(message),
            },
            HarnessError::Compile { message, frame } => {
                self.indented(message);
                if let Some(frame) = frame {
                    self.newline();
                    self.indented(frame);
                }
            }
            HarnessError::DiagnosticMismatch { expected, actual } => {
                self.indented(&error.to_string());
                self.diagnostic_list("Expected:", expected, Color::Green);
                self.diagnostic_list("Received:", actual, Color::Red);
            }
            HarnessError::UnexpectedDiagnostics(actual) => {
                self.indented(&error.to_string());
                self.diagnostic_list("Received:", actual, Color::Red);
            }
            other => self.indented(&other.to_string()),
        }
    }

    fn indented(&mut self, text: &str) {
        for line in text.lines() {
            self.plain("    ");
            self.plain(line);
            self.newline();
        }
    }

    fn diagnostic_list(&mut self, label: &str, diagnostics: &[Diagnostic], color: Color) {
        self.plain("    ");
        self.styled(label, Some(color), false);
        self.newline();
        if diagnostics.is_empty() {
            self.plain("      (none)");
            self.newline();
        }
        for diagnostic in diagnostics {
            self.plain("      ");
            self.styled(&diagnostic.to_string(), Some(color), false);
            self.newline();
        }
    }

    fn assertion_diff(&mut self, expected: &str, received: &str) {
        self.plain("    ");
        self.styled(&format!("Expected: {}", expected), Some(Color::Green), false);
        self.newline();
        self.plain("    ");
        self.styled(&format!("Received: {}", received), Some(Color::Red), false);
        self.newline();
        self.newline();

        self.plain("    ");
        let changeset = Changeset::new(expected, received, " ");
        for (i, diff) in changeset.diffs.iter().enumerate() {
            if i > 0 {
                self.plain(" ");
            }
            match diff {
                Difference::Same(text) => self.plain(text),
                Difference::Rem(text) => self.styled(&format!("[-{}-]", text), Some(Color::Green), true),
                Difference::Add(text) => self.styled(&format!("{{+{}+}}", text), Some(Color::Red), true),
            }
        }
        self.newline();
    }

    fn summary(&mut self, report: &SuiteReport) {
        self.newline();
        self.styled("Tests:  ", None, true);
        if report.failed() > 0 {
            self.styled(&format!("{} failed", report.failed()), Some(Color::Red), true);
            self.plain(", ");
        }
        if report.skipped() > 0 {
            self.styled(&format!("{} skipped", report.skipped()), Some(Color::Yellow), true);
            self.plain(", ");
        }
        if report.passed() > 0 {
            self.styled(&format!("{} passed", report.passed()), Some(Color::Green), true);
            self.plain(", ");
        }
        self.styled(&format!("{} total", report.cases.len()), None, true);
        self.newline();

        self.styled("Time:   ", None, true);
        self.styled(&format!("{:.2}s", report.duration.as_secs_f64()), Some(Color::White), false);
        self.newline();
    }
}
