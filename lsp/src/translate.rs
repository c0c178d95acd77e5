//! Analyzer output → diagnostics.
//!
//! The analyzer prints a single JSON object on stdout. Two shapes exist in
//! the wild:
//!
//! ```text
//! {"error": {"errors": [{"msg", "level", "line", "col", "offset", "file"?}, ...]}}
//! {"error_type": "code", "msg", "level", "line", "col", "offset", "file"?}
//! ```
//!
//! Lines are 1-based in the output and 0-based in [`Diagnostic`]; columns are
//! 0-based in both.

use std::path::{Path, PathBuf};

use helix_diag_types::{Diagnostic, Range, Severity, strip_ansi};
use serde::Deserialize;

use crate::error::{AnalysisError, TranslateError};
use crate::protocol;
use crate::types::AnalyzerOutput;

/// `error_type` value of a bare error object that carries a diagnostic.
const CODE_ERROR_TYPE: &str = "code";

#[derive(Debug, Deserialize)]
struct Envelope {
    error: ErrorList,
}

#[derive(Debug, Deserialize)]
struct ErrorList {
    errors: Vec<RawError>,
}

#[derive(Debug, Deserialize)]
struct BareError {
    error_type: String,
    #[serde(flatten)]
    error: RawError,
}

#[derive(Debug, Deserialize)]
struct RawError {
    msg: String,
    level: String,
    line: u32,
    col: u32,
    offset: u32,
    #[serde(default)]
    file: Option<String>,
}

impl RawError {
    fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(
            Severity::from_level(&self.level),
            self.msg.clone(),
            Range::single_line(self.line.saturating_sub(1), self.col, self.offset),
        )
    }
}

/// Restricts deep-pass results to the document that triggered them.
///
/// Entries without a `file` belong to the invoked document. Relative `file`
/// values are resolved against the analyzer's working directory (the
/// document's parent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepScope {
    root: PathBuf,
    base: PathBuf,
}

impl DeepScope {
    #[must_use]
    pub fn for_document(file: &Path) -> Self {
        let root = protocol::normalize_path(file);
        let base = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { root, base }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn contains(&self, reported: Option<&str>) -> bool {
        let Some(reported) = reported.map(str::trim).filter(|r| !r.is_empty()) else {
            return true;
        };
        let path = protocol::file_uri_to_path(reported).unwrap_or_else(|| PathBuf::from(reported));
        let absolute = if path.is_absolute() {
            path
        } else {
            self.base.join(path)
        };
        protocol::normalize_path(&absolute).starts_with(&self.root)
    }
}

/// Parse sanitized analyzer stdout into diagnostics.
///
/// Empty input, and an envelope with no errors, are both a clean result.
pub fn translate(text: &str, scope: Option<&DeepScope>) -> Result<Vec<Diagnostic>, TranslateError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(text).map_err(TranslateError::Json)?;

    let raw = if value.get("error").is_some() {
        let envelope: Envelope = serde_json::from_value(value).map_err(TranslateError::Shape)?;
        envelope.error.errors
    } else if value.get("error_type").is_some() {
        let bare: BareError = serde_json::from_value(value).map_err(TranslateError::Shape)?;
        if bare.error_type != CODE_ERROR_TYPE {
            tracing::debug!(
                error_type = %bare.error_type,
                "Ignoring analyzer error that does not point at source"
            );
            return Ok(Vec::new());
        }
        vec![bare.error]
    } else {
        return Err(TranslateError::UnexpectedShape);
    };

    let mut diagnostics = Vec::with_capacity(raw.len());
    for error in &raw {
        if let Some(scope) = scope
            && !scope.contains(error.file.as_deref())
        {
            tracing::trace!(
                file = error.file.as_deref().unwrap_or_default(),
                root = %scope.root().display(),
                "Dropping diagnostic outside deep-pass scope"
            );
            continue;
        }
        diagnostics.push(error.to_diagnostic());
    }
    Ok(diagnostics)
}

/// Apply the exit-status contract, then translate.
///
/// - exit 0: clean, stdout ignored
/// - nonzero exit with output: translate it
/// - nonzero exit without output, or killed by a signal: process failure
pub fn interpret_output(
    output: &AnalyzerOutput,
    scope: Option<&DeepScope>,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    match output.exit_code {
        Some(0) => Ok(Vec::new()),
        Some(code) => {
            let stdout = strip_ansi(&output.stdout);
            if stdout.is_empty() {
                return Err(AnalysisError::ProcessFailure {
                    exit_code: Some(code),
                    stderr: strip_ansi(&output.stderr).into_owned(),
                });
            }
            Ok(translate(&stdout, scope)?)
        }
        None => Err(AnalysisError::ProcessFailure {
            exit_code: None,
            stderr: strip_ansi(&output.stderr).into_owned(),
        }),
    }
}
