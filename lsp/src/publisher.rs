//! Outward delivery of settled diagnostics.

use std::future::Future;

use helix_diag_types::Diagnostic;
use tower_lsp::Client;

use crate::diagnostics::CacheEntry;
use crate::protocol::{self, InvalidUriError};

/// Why one notification could not be sent.
///
/// `tower_lsp` queues notifications without reporting delivery, so the only
/// failure is a cache key that is not a valid URI.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    InvalidUri(#[from] InvalidUriError),
}

/// Where `textDocument/publishDiagnostics` notifications go.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn publish(
        &self,
        uri: &str,
        version: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl DiagnosticSink for Client {
    async fn publish(
        &self,
        uri: &str,
        version: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<(), PublishError> {
        let uri = protocol::parse_uri(uri)?;
        let diagnostics = diagnostics.iter().map(protocol::diagnostic_to_lsp).collect();
        self.publish_diagnostics(uri, diagnostics, version).await;
        Ok(())
    }
}

/// Publish every drained entry once. Failures are logged and dropped, never
/// retried. Returns how many notifications were sent.
pub async fn publish_all<S: DiagnosticSink>(sink: &S, entries: Vec<CacheEntry>) -> usize {
    let mut sent = 0;
    for entry in entries {
        let count = entry.diagnostics.len();
        match sink
            .publish(&entry.uri, Some(entry.version), entry.diagnostics)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    uri = %entry.uri,
                    version = entry.version,
                    diagnostics = count,
                    "Published diagnostics"
                );
                sent += 1;
            }
            Err(e) => {
                tracing::warn!(uri = %entry.uri, version = entry.version, "Dropping diagnostics: {e}");
            }
        }
    }
    sent
}
