//! Diagnostic collection for a compilation run.
//!
//! The backend batches user errors instead of stopping at the first one:
//! each pass reports into a shared [`Diagnostics`] sink and keeps scanning
//! sibling constructs where the tree shape allows it. The sink caps the
//! number of recorded errors; past the cap further errors are counted but
//! not stored, and the passes still complete their scan.

use std::fmt;

use crate::error::CompileError;
use crate::span::Span;

/// Default ceiling on recorded errors.
pub const DEFAULT_ERROR_CAP: usize = 32;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A compilation error; any recorded error discards the final output.
    Error,
    /// A warning; compilation still succeeds.
    Warning,
}

/// A single diagnostic: severity, position, and message text.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Where in the source this diagnostic points.
    pub span: Span,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        };
        // The message already names its position ("at line:col: ...").
        write!(f, "{}: {}", kind, self.message)
    }
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    error_count: usize,
    cap: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Create an empty sink with the default error cap.
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_ERROR_CAP)
    }

    /// Create an empty sink with an explicit error cap.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            error_count: 0,
            cap,
        }
    }

    /// Record a user error.
    ///
    /// Past the cap the error is counted but not stored.
    pub fn error(&mut self, err: CompileError) {
        self.error_count += 1;
        if self.error_count <= self.cap {
            self.entries.push(Diagnostic {
                kind: DiagnosticKind::Error,
                span: err.span(),
                message: err.to_string(),
            });
        }
    }

    /// Record a warning. Warnings are not capped.
    pub fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Warning,
            span,
            message: format!("at {}: {}", span, message.into()),
        });
    }

    /// Whether any error was recorded (including suppressed ones).
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Total number of errors seen, including those past the cap.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Number of errors seen but not stored because of the cap.
    pub fn suppressed(&self) -> usize {
        self.error_count.saturating_sub(self.cap)
    }

    /// Whether nothing at all was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All recorded diagnostics, in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Only the recorded errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
    }

    /// Only the recorded warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Warning)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.entries {
            writeln!(f, "{}", diagnostic)?;
        }
        if self.suppressed() > 0 {
            writeln!(f, "... and {} more error(s)", self.suppressed())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_error(line: u32) -> CompileError {
        CompileError::NotAssignable {
            span: Span::point(line, 1),
        }
    }

    #[test]
    fn new_sink_is_empty() {
        let diags = Diagnostics::new();
        assert!(diags.is_empty());
        assert!(!diags.has_errors());
    }

    #[test]
    fn records_errors_and_warnings() {
        let mut diags = Diagnostics::new();
        diags.error(sample_error(3));
        diags.warn(Span::point(5, 1), "unreachable code");

        assert!(diags.has_errors());
        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
    }

    #[test]
    fn cap_suppresses_but_counts() {
        let mut diags = Diagnostics::with_cap(2);
        for line in 1..=5 {
            diags.error(sample_error(line));
        }
        assert_eq!(diags.error_count(), 5);
        assert_eq!(diags.errors().count(), 2);
        assert_eq!(diags.suppressed(), 3);
    }

    #[test]
    fn display_format() {
        let mut diags = Diagnostics::new();
        diags.error(sample_error(2));
        let text = diags.to_string();
        assert!(text.contains("error: at 2:1: expression is not assignable"));
    }
}
