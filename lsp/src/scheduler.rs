//! Adaptive analysis scheduler.
//!
//! Each request runs exactly one analyzer pass. Whether it is a quick pass or
//! a deep pass is decided against process-wide pacing state:
//!
//! ```text
//! deep  if the last deep pass failed
//!       or no deep pass has completed yet
//!       or the gap since the previous request exceeds the last deep-pass duration
//! quick otherwise
//! ```
//!
//! The pacing state is global, not per document. Only deep passes feed back
//! into it; quick passes never change the backoff window.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use helix_diag_types::{Diagnostic, DocumentSnapshot};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::diagnostics::DiagnosticCache;
use crate::error::AnalysisError;
use crate::invoker::Analyzer;
use crate::protocol;
use crate::translate::{self, DeepScope};
use crate::types::PassKind;
use crate::working_copy::WorkingCopy;

/// Process-wide pacing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingState {
    last_request: Option<Instant>,
    last_pass_duration: Option<Duration>,
    deep_pass_failed: bool,
}

impl PacingState {
    #[must_use]
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// Wall-clock duration of the most recent completed deep pass.
    #[must_use]
    pub fn last_pass_duration(&self) -> Option<Duration> {
        self.last_pass_duration
    }

    #[must_use]
    pub fn deep_pass_failed(&self) -> bool {
        self.deep_pass_failed
    }

    /// Record a request arriving at `now` and pick the pass to run.
    ///
    /// The gap is measured from the previous request, which `now` then
    /// replaces.
    fn begin(&mut self, now: Instant) -> PassKind {
        let previous = self.last_request.replace(now);
        match (self.deep_pass_failed, self.last_pass_duration, previous) {
            (false, Some(window), Some(prev)) if now.saturating_duration_since(prev) <= window => {
                PassKind::Quick
            }
            _ => PassKind::Deep,
        }
    }

    fn finish_deep(&mut self, elapsed: Duration, failed: bool) {
        self.last_pass_duration = Some(elapsed);
        self.deep_pass_failed = failed;
    }
}

/// What happened to one pass.
#[derive(Debug)]
pub enum PassOutcome {
    /// The cache now holds this pass's diagnostics.
    Updated { diagnostics: usize },
    /// The pass failed; the cache entry for the document is unchanged.
    Failed(AnalysisError),
    /// The pass was cancelled by a close or shutdown, or a newer version was
    /// already cached. Nothing was written.
    Superseded,
}

#[derive(Debug)]
pub struct PassReport {
    pub kind: PassKind,
    pub outcome: PassOutcome,
}

impl PassReport {
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self.outcome, PassOutcome::Updated { .. })
    }
}

/// Decides, runs and settles analyzer passes.
pub struct Scheduler<A, C> {
    analyzer: A,
    clock: C,
    state: Mutex<PacingState>,
    cache: Arc<DiagnosticCache>,
}

impl<A: Analyzer, C: Clock> Scheduler<A, C> {
    pub fn new(analyzer: A, clock: C, cache: Arc<DiagnosticCache>) -> Self {
        Self {
            analyzer,
            clock,
            state: Mutex::new(PacingState::default()),
            cache,
        }
    }

    fn state(&self) -> MutexGuard<'_, PacingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the pacing state.
    #[must_use]
    pub fn pacing(&self) -> PacingState {
        *self.state()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<DiagnosticCache> {
        &self.cache
    }

    /// Record a request for `doc` and pick the pass it gets.
    ///
    /// Called when the request arrives, not when its pass starts, so time
    /// spent waiting behind a running pass does not widen the gap.
    pub fn decide(&self, doc: &DocumentSnapshot) -> PassKind {
        let kind = self.state().begin(self.clock.now());
        tracing::debug!(document = %doc, pass = kind.label(), "Queued parse");
        kind
    }

    /// Decide and run one pass for `doc`.
    pub async fn queue_parse(&self, doc: &DocumentSnapshot, cancel: &CancellationToken) -> PassReport {
        let kind = self.decide(doc);
        self.execute(doc, kind, cancel).await
    }

    /// Run a pass of the given kind for `doc` and settle its result into the
    /// cache.
    ///
    /// Never fails: every error is logged and reported in the outcome. When
    /// `cancel` fires first the analyzer run is dropped (killing the child),
    /// and neither the cache nor the pacing state is touched.
    pub async fn execute(&self, doc: &DocumentSnapshot, kind: PassKind, cancel: &CancellationToken) -> PassReport {
        let copy = match protocol::file_uri_to_path(doc.uri())
            .ok_or_else(|| AnalysisError::UnsupportedUri {
                uri: doc.uri().to_string(),
            })
            .and_then(|path| WorkingCopy::create(&path, doc.text()))
        {
            Ok(copy) => copy,
            Err(err) => {
                tracing::warn!(document = %doc, kind = err.kind(), "{err}");
                return PassReport {
                    kind,
                    outcome: PassOutcome::Failed(err),
                };
            }
        };

        let started = self.clock.now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.run(copy.path(), kind) => Some(result),
        };
        drop(copy);
        let Some(result) = result else {
            tracing::debug!(document = %doc, pass = kind.label(), "Pass cancelled");
            return PassReport {
                kind,
                outcome: PassOutcome::Superseded,
            };
        };

        let elapsed = self.clock.now().saturating_duration_since(started);
        if kind == PassKind::Deep {
            self.state().finish_deep(elapsed, result.is_err());
        }

        let outcome = match result {
            Ok(diagnostics) => {
                let count = diagnostics.len();
                let errors = diagnostics.iter().filter(|d| d.severity().is_error()).count();
                for diag in &diagnostics {
                    tracing::trace!(document = %doc, "{}", diag.display_short());
                }
                if self.cache.update_unless_cancelled(doc, diagnostics, cancel) {
                    tracing::info!(
                        document = %doc,
                        pass = kind.label(),
                        diagnostics = count,
                        errors,
                        elapsed_ms = elapsed.as_millis(),
                        "Pass complete"
                    );
                    PassOutcome::Updated { diagnostics: count }
                } else {
                    PassOutcome::Superseded
                }
            }
            Err(err) => {
                tracing::warn!(
                    document = %doc,
                    pass = kind.label(),
                    kind = err.kind(),
                    "Pass failed: {err}"
                );
                PassOutcome::Failed(err)
            }
        };
        PassReport { kind, outcome }
    }

    async fn run(
        &self,
        path: &Path,
        kind: PassKind,
    ) -> Result<Vec<Diagnostic>, AnalysisError> {
        let output = self.analyzer.analyze(path, kind).await?;
        let scope = (kind == PassKind::Deep).then(|| DeepScope::for_document(path));
        translate::interpret_output(&output, scope.as_ref())
    }
}
