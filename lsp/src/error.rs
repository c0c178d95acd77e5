//! Failure taxonomy for a single analysis pass.
//!
//! None of these escape the scheduler: each is logged and folded into a
//! pass outcome, and the server keeps running.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Why the analyzer output could not be turned into diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("output is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("output does not match the error envelope: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("output is JSON but carries neither `error.errors` nor `error_type`")]
    UnexpectedShape,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analyzer `{binary}` not found: {reason}")]
    AnalyzerNotFound { binary: String, reason: String },
    #[error("failed to run analyzer `{}`: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("analyzer exited with {} and no interpretable output", describe_exit(*exit_code))]
    ProcessFailure {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("analyzer did not finish within {} ms", after.as_millis())]
    Timeout { after: Duration },
    #[error("malformed analyzer output: {0}")]
    MalformedOutput(#[from] TranslateError),
    #[error("document is not a local file: {uri}")]
    UnsupportedUri { uri: String },
    #[error("failed to write working copy next to `{}`: {source}", document.display())]
    WorkingCopy {
        document: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AnalysisError {
    /// Short stable name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnalyzerNotFound { .. } => "analyzer_not_found",
            Self::Spawn { .. } | Self::ProcessFailure { .. } => "process_failure",
            Self::Timeout { .. } => "timeout",
            Self::MalformedOutput(_) => "malformed_output",
            Self::UnsupportedUri { .. } => "unsupported_uri",
            Self::WorkingCopy { .. } => "working_copy",
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}
