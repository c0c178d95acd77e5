//! Open documents as last reported by the editor.

use std::collections::HashMap;
use std::sync::Arc;

use helix_diag_types::DocumentSnapshot;

#[derive(Debug, Clone)]
pub struct OpenDocument {
    version: i32,
    text: Arc<str>,
}

impl OpenDocument {
    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    fn snapshot(&self, uri: &str) -> DocumentSnapshot {
        DocumentSnapshot::new(uri, self.version).with_text(Arc::clone(&self.text))
    }
}

/// Buffers keyed by URI. Snapshots carry the buffer text, so a pass analyzes
/// exactly the version it is published under.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, OpenDocument>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, uri: &str, text: String, version: i32) -> DocumentSnapshot {
        let doc = OpenDocument {
            version,
            text: Arc::from(text),
        };
        let snapshot = doc.snapshot(uri);
        self.documents.insert(uri.to_string(), doc);
        snapshot
    }

    /// Apply a full-text change. Unknown documents are opened implicitly;
    /// a change older than the stored version is ignored.
    pub fn change(&mut self, uri: &str, text: String, version: i32) -> Option<DocumentSnapshot> {
        match self.documents.get_mut(uri) {
            Some(doc) if doc.version > version => {
                tracing::debug!(uri, stored = doc.version, version, "Ignoring out-of-order change");
                None
            }
            Some(doc) => {
                doc.version = version;
                doc.text = Arc::from(text);
                Some(doc.snapshot(uri))
            }
            None => Some(self.open(uri, text, version)),
        }
    }

    pub fn close(&mut self, uri: &str) -> bool {
        self.documents.remove(uri).is_some()
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&OpenDocument> {
        self.documents.get(uri)
    }

    /// Snapshot of the current version, if the document is open.
    #[must_use]
    pub fn snapshot(&self, uri: &str) -> Option<DocumentSnapshot> {
        self.documents.get(uri).map(|doc| doc.snapshot(uri))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
