//! Diagnostics cache: holds the latest diagnostics per document until the
//! publisher drains them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use helix_diag_types::{Diagnostic, DocumentSnapshot};
use tokio_util::sync::CancellationToken;

/// One drained cache entry, ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub uri: String,
    pub version: i32,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-document diagnostics awaiting publication.
///
/// An entry records the diagnostics of the last successful pass together
/// with the document version that produced them. Reading with
/// [`flush_all`](Self::flush_all) empties the cache, so each result is
/// published once.
#[derive(Debug, Default)]
pub struct DiagnosticCache {
    data: Mutex<HashMap<String, (i32, Vec<Diagnostic>)>>,
}

impl DiagnosticCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (i32, Vec<Diagnostic>)>> {
        // A panic while holding the lock leaves the map structurally valid.
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replace the entry for `doc`.
    ///
    /// An empty list is stored as-is: it tells the editor to clear the
    /// document. Results for an older version than the one already cached
    /// are discarded; returns whether the entry was written.
    pub fn update(&self, doc: &DocumentSnapshot, diagnostics: Vec<Diagnostic>) -> bool {
        self.update_unless_cancelled(doc, diagnostics, &CancellationToken::new())
    }

    /// Like [`update`](Self::update), but writes nothing once `cancel` has
    /// fired. The check happens under the cache lock, so a close that cancels
    /// and then removes the entry never sees a late write slip in between.
    pub fn update_unless_cancelled(
        &self,
        doc: &DocumentSnapshot,
        diagnostics: Vec<Diagnostic>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut data = self.lock();
        if cancel.is_cancelled() {
            tracing::debug!(document = %doc, "Discarding diagnostics for a cancelled pass");
            return false;
        }
        if let Some((cached, _)) = data.get(doc.uri())
            && *cached > doc.version()
        {
            tracing::debug!(
                document = %doc,
                cached_version = *cached,
                "Discarding diagnostics for an older version"
            );
            return false;
        }
        data.insert(doc.uri().to_string(), (doc.version(), diagnostics));
        true
    }

    /// Drain every entry, ordered by URI.
    pub fn flush_all(&self) -> Vec<CacheEntry> {
        let drained: Vec<_> = self.lock().drain().collect();
        let mut entries: Vec<CacheEntry> = drained
            .into_iter()
            .map(|(uri, (version, diagnostics))| CacheEntry {
                uri,
                version,
                diagnostics,
            })
            .collect();
        entries.sort_by(|a, b| a.uri.cmp(&b.uri));
        entries
    }

    /// Drop any pending entry for a closed document.
    pub fn remove(&self, uri: &str) -> bool {
        self.lock().remove(uri).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_diag_types::{Range, Severity};

    fn make_diag(severity: Severity, msg: &str, line: u32) -> Diagnostic {
        Diagnostic::new(severity, msg, Range::single_line(line, 0, 1))
    }

    fn doc(uri: &str, version: i32) -> DocumentSnapshot {
        DocumentSnapshot::new(uri, version)
    }

    #[test]
    fn test_flush_empty_is_empty() {
        let cache = DiagnosticCache::new();
        assert!(cache.flush_all().is_empty());
        assert!(cache.flush_all().is_empty());
    }

    #[test]
    fn test_flush_clears_cache() {
        let cache = DiagnosticCache::new();
        cache.update(
            &doc("file:///a.hlx", 1),
            vec![make_diag(Severity::Error, "expected `;`", 10)],
        );
        assert_eq!(cache.len(), 1);

        let entries = cache.flush_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uri, "file:///a.hlx");
        assert_eq!(entries[0].version, 1);
        assert_eq!(entries[0].diagnostics.len(), 1);

        assert!(cache.is_empty());
        assert!(cache.flush_all().is_empty());
    }

    #[test]
    fn test_empty_diagnostics_are_kept_for_clearing() {
        let cache = DiagnosticCache::new();
        cache.update(&doc("file:///a.hlx", 3), vec![]);
        let entries = cache.flush_all();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].diagnostics.is_empty());
    }

    #[test]
    fn test_replace_overwrites_previous() {
        let cache = DiagnosticCache::new();
        let uri = "file:///main.hlx";
        cache.update(
            &doc(uri, 1),
            vec![
                make_diag(Severity::Error, "err1", 1),
                make_diag(Severity::Error, "err2", 2),
            ],
        );
        cache.update(&doc(uri, 2), vec![make_diag(Severity::Error, "err1", 1)]);

        let entries = cache.flush_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, 2);
        assert_eq!(entries[0].diagnostics.len(), 1);
    }

    #[test]
    fn test_same_version_replaces() {
        let cache = DiagnosticCache::new();
        let uri = "file:///main.hlx";
        cache.update(&doc(uri, 4), vec![make_diag(Severity::Warning, "w", 1)]);
        assert!(cache.update(&doc(uri, 4), vec![]));
        assert!(cache.flush_all()[0].diagnostics.is_empty());
    }

    #[test]
    fn test_older_version_is_discarded() {
        let cache = DiagnosticCache::new();
        let uri = "file:///main.hlx";
        cache.update(&doc(uri, 5), vec![make_diag(Severity::Error, "new", 1)]);
        assert!(!cache.update(&doc(uri, 4), vec![]));

        let entries = cache.flush_all();
        assert_eq!(entries[0].version, 5);
        assert_eq!(entries[0].diagnostics[0].message(), "new");
    }

    #[test]
    fn test_flush_orders_by_uri() {
        let cache = DiagnosticCache::new();
        cache.update(&doc("file:///b.hlx", 1), vec![]);
        cache.update(&doc("file:///a.hlx", 1), vec![]);
        let uris: Vec<_> = cache.flush_all().into_iter().map(|e| e.uri).collect();
        assert_eq!(uris, vec!["file:///a.hlx", "file:///b.hlx"]);
    }

    #[test]
    fn test_cancelled_update_writes_nothing() {
        let cache = DiagnosticCache::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!cache.update_unless_cancelled(&doc("file:///a.hlx", 1), vec![], &cancel));
        assert!(cache.is_empty());

        assert!(cache.update_unless_cancelled(&doc("file:///a.hlx", 1), vec![], &CancellationToken::new()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_drops_pending_entry() {
        let cache = DiagnosticCache::new();
        cache.update(&doc("file:///a.hlx", 1), vec![]);
        assert!(cache.remove("file:///a.hlx"));
        assert!(!cache.remove("file:///a.hlx"));
        assert!(cache.flush_all().is_empty());
    }
}
