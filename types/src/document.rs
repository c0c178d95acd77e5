//! Document identity as seen by the relay.

use std::fmt;
use std::sync::Arc;

/// An editor document at a specific version.
///
/// The URI is opaque to the relay; the version is supplied by the editor and
/// only ever compared, never changed. A snapshot taken before a delayed
/// re-parse keeps the version it was taken at, and the text that version had.
///
/// Without text the document is analyzed as it is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentSnapshot {
    uri: String,
    version: i32,
    text: Option<Arc<str>>,
}

impl DocumentSnapshot {
    #[must_use]
    pub fn new(uri: impl Into<String>, version: i32) -> Self {
        Self {
            uri: uri.into(),
            version,
            text: None,
        }
    }

    /// Attach the buffer contents for this version.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<Arc<str>>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl fmt::Display for DocumentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.uri, self.version)
    }
}
