//! On-disk copies of editor buffers.
//!
//! The analyzer only reads files. A pass over unsaved text writes that text
//! to a hidden temp file beside the document and analyzes the copy instead.
//! Staying in the same directory keeps relative imports resolving the same
//! way. The copy is deleted when the pass drops it.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::AnalysisError;

#[derive(Debug)]
pub(crate) struct WorkingCopy {
    path: PathBuf,
    _file: Option<NamedTempFile>,
}

impl WorkingCopy {
    /// Stage `text` next to `document`, or use `document` itself when there
    /// is no text.
    pub(crate) fn create(document: &Path, text: Option<&str>) -> Result<Self, AnalysisError> {
        let Some(text) = text else {
            return Ok(Self {
                path: document.to_path_buf(),
                _file: None,
            });
        };
        let file = write_copy(document, text).map_err(|source| AnalysisError::WorkingCopy {
            document: document.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: file.path().to_path_buf(),
            _file: Some(file),
        })
    }

    /// The file the analyzer should read.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

fn write_copy(document: &Path, text: &str) -> io::Result<NamedTempFile> {
    let dir = match document.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Keep the extension: the analyzer may dispatch on it.
    let suffix = document
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let prefix = format!(".{stem}.");

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}
