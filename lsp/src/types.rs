//! Public types shared between the relay and its callers.
//!
//! The binary builds [`RelaySettings`] from its configuration file; the
//! scheduler and analyzer exchange [`PassKind`] and [`AnalyzerOutput`].

use std::time::Duration;

/// Flag that puts the analyzer into machine-readable output mode.
pub const LSP_MODE_FLAG: &str = "--lsp-mode";

/// Extra flag requesting the slower, cross-file analysis.
pub const DEFAULT_DEEP_FLAG: &str = "--emit-ir";

pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Runtime settings for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Analyzer executable: a path or a name looked up on `PATH`.
    /// `None` means not configured; every pass then fails as not found.
    pub analyzer_binary: Option<String>,
    pub deep_flag: String,
    /// Upper bound on a single analyzer run.
    pub analyzer_timeout: Duration,
    /// Delay before the trailing re-parse after a change.
    pub debounce: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            analyzer_binary: None,
            deep_flag: DEFAULT_DEEP_FLAG.to_string(),
            analyzer_timeout: DEFAULT_ANALYZER_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Which analyzer invocation a pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Plain invocation, no extra flag.
    Quick,
    /// Invocation with the deep-analysis flag; assumed strictly slower.
    Deep,
}

impl PassKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Deep => "deep",
        }
    }
}

/// Raw result of one analyzer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl AnalyzerOutput {
    #[must_use]
    pub fn new(stdout: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}
