//! The normalized diagnostic model.
//!
//! Everything the analyzer reports is mapped into [`Diagnostic`] before it
//! reaches the cache. Positions are zero-based; spans never cross lines.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl Severity {
    /// Map an analyzer level string onto a severity.
    ///
    /// Trimmed and case-normalized. Unrecognized levels become
    /// [`Severity::Information`]; this never fails.
    #[must_use]
    pub fn from_level(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Self::Error,
            "warn" => Self::Warning,
            "note" => Self::Hint,
            _ => Self::Information,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A zero-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A half-open `[start, end)` span on a single line.
///
/// Only constructible through [`Range::single_line`], so `end.line ==
/// start.line` and `end.column >= start.column` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    start: Position,
    end: Position,
}

impl Range {
    /// Span `width` columns starting at `(line, column)`.
    #[must_use]
    pub const fn single_line(line: u32, column: u32, width: u32) -> Self {
        Self {
            start: Position::new(line, column),
            end: Position::new(line, column.saturating_add(width)),
        }
    }

    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> Position {
        self.end
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.end.column - self.start.column
    }
}

/// A single issue reported by the analyzer, normalized for publishing.
///
/// Fields are private; construction goes through [`Diagnostic::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    message: String,
    severity: Severity,
    range: Range,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>, range: Range) -> Self {
        Self {
            message: message.into(),
            severity,
            range,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    /// Format as `line:col: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_short(&self) -> String {
        format!(
            "{}:{}: {}: {}",
            self.range.start.line.saturating_add(1),
            self.range.start.column.saturating_add(1),
            self.severity.label(),
            self.message,
        )
    }
}
