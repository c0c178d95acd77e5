//! Conversions between relay types and LSP wire types.

use std::path::{Component, Path, PathBuf};

use helix_diag_types::{Diagnostic, Position, Range, Severity};
use tower_lsp::lsp_types;

/// `source` field attached to every published diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "helix";

#[derive(Debug, thiserror::Error)]
#[error("not a valid document URI: {uri}")]
pub struct InvalidUriError {
    uri: String,
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}

pub(crate) fn parse_uri(uri: &str) -> Result<lsp_types::Url, InvalidUriError> {
    lsp_types::Url::parse(uri).map_err(|_| InvalidUriError {
        uri: uri.to_string(),
    })
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                if !matches!(out.last(), Some(Component::RootDir | Component::Prefix(_))) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn position_to_lsp(pos: Position) -> lsp_types::Position {
    lsp_types::Position {
        line: pos.line,
        character: pos.column,
    }
}

fn range_to_lsp(range: Range) -> lsp_types::Range {
    lsp_types::Range {
        start: position_to_lsp(range.start()),
        end: position_to_lsp(range.end()),
    }
}

fn severity_to_lsp(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
        Severity::Hint => lsp_types::DiagnosticSeverity::HINT,
    }
}

pub(crate) fn diagnostic_to_lsp(diag: &Diagnostic) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: range_to_lsp(diag.range()),
        severity: Some(severity_to_lsp(diag.severity())),
        code: None,
        code_description: None,
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: diag.message().to_string(),
        related_information: None,
        tags: None,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_conversion_keeps_range_and_severity() {
        let diag = Diagnostic::new(
            Severity::Hint,
            "consider renaming",
            Range::single_line(4, 2, 3),
        );
        let lsp = diagnostic_to_lsp(&diag);
        assert_eq!(lsp.severity, Some(lsp_types::DiagnosticSeverity::HINT));
        assert_eq!(lsp.range.start, lsp_types::Position::new(4, 2));
        assert_eq!(lsp.range.end, lsp_types::Position::new(4, 5));
        assert_eq!(lsp.source.as_deref(), Some("helix"));
        assert_eq!(lsp.message, "consider renaming");
    }

    #[test]
    fn every_severity_has_an_lsp_counterpart() {
        assert_eq!(
            severity_to_lsp(Severity::Error),
            lsp_types::DiagnosticSeverity::ERROR
        );
        assert_eq!(
            severity_to_lsp(Severity::Warning),
            lsp_types::DiagnosticSeverity::WARNING
        );
        assert_eq!(
            severity_to_lsp(Severity::Information),
            lsp_types::DiagnosticSeverity::INFORMATION
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn file_uri_to_path_decodes_percent_escapes() {
        let path = file_uri_to_path("file:///home/me/my%20project/main.hlx").unwrap();
        assert_eq!(path, PathBuf::from("/home/me/my project/main.hlx"));
    }

    #[test]
    fn file_uri_to_path_rejects_other_schemes() {
        assert!(file_uri_to_path("untitled:Untitled-1").is_none());
        assert!(file_uri_to_path("https://example.com/a.hlx").is_none());
        assert!(file_uri_to_path("not-a-uri").is_none());
    }

    #[test]
    fn parse_uri_rejects_garbage() {
        assert!(parse_uri("file:///a.hlx").is_ok());
        let err = parse_uri("::nope").unwrap_err();
        assert!(err.to_string().contains("::nope"));
    }

    #[cfg(not(windows))]
    #[test]
    fn normalize_path_resolves_dots_lexically() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c.hlx")),
            PathBuf::from("/a/c.hlx")
        );
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
    }
}
