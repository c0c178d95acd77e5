//! RelayManager: the document-event facade used by the language server.
//!
//! Each event turns into a pass on a spawned task, so the caller never waits
//! for the analyzer. A document runs one pass at a time; a request that
//! arrives meanwhile waits its turn, and only the newest waiting request
//! survives. After every pass the cache is drained and each entry published
//! once.
//!
//! Publishing and closing share one gate. Once [`RelayManager::on_close`]
//! has cleared a document, no pass that was running for it can publish.

use std::sync::Arc;
use std::time::Duration;

use helix_diag_types::DocumentSnapshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::debounce::Debouncer;
use crate::diagnostics::DiagnosticCache;
use crate::invoker::Analyzer;
use crate::lanes::{Admission, Origin, PassLanes};
use crate::publisher::{self, DiagnosticSink};
use crate::scheduler::{PassReport, Scheduler};

struct Shared<A, C, S> {
    scheduler: Scheduler<A, C>,
    sink: S,
    lanes: PassLanes,
    publish_gate: Mutex<()>,
}

impl<A: Analyzer, C: Clock, S: DiagnosticSink> Shared<A, C, S> {
    /// `None` when the request never ran: skipped as a duplicate, replaced by
    /// a newer request, or dropped by a close.
    async fn run_pass(&self, doc: DocumentSnapshot, origin: Origin) -> Option<PassReport> {
        let admission = self.lanes.admit(doc.uri(), doc.version(), origin);
        if matches!(admission, Admission::Skip) {
            tracing::debug!(document = %doc, ?origin, "Pass not needed; skipping");
            return None;
        }

        let kind = self.scheduler.decide(&doc);
        let Some(ticket) = admission.ticket().await else {
            tracing::debug!(document = %doc, pass = kind.label(), "Dropped while waiting");
            return None;
        };
        let report = self.scheduler.execute(&doc, kind, ticket.token()).await;
        // Publish before handing the lane on, so versions reach the editor in
        // the order they ran.
        self.publish_pending().await;
        drop(ticket);
        Some(report)
    }

    async fn publish_pending(&self) {
        let _gate = self.publish_gate.lock().await;
        let entries = self.scheduler.cache().flush_all();
        if !entries.is_empty() {
            publisher::publish_all(&self.sink, entries).await;
        }
    }
}

pub struct RelayManager<A, C, S> {
    shared: Arc<Shared<A, C, S>>,
    debouncer: Debouncer,
}

impl<A: Analyzer, C: Clock, S: DiagnosticSink> RelayManager<A, C, S> {
    pub fn new(analyzer: A, clock: C, sink: S, debounce: Duration) -> Self {
        let cache = Arc::new(DiagnosticCache::new());
        Self {
            shared: Arc::new(Shared {
                scheduler: Scheduler::new(analyzer, clock, cache),
                sink,
                lanes: PassLanes::default(),
                publish_gate: Mutex::new(()),
            }),
            debouncer: Debouncer::new(debounce),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<A, C> {
        &self.shared.scheduler
    }

    /// Request a pass for `doc` in the background.
    pub fn queue_parse(&self, doc: DocumentSnapshot) -> JoinHandle<Option<PassReport>> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_pass(doc, Origin::Event).await })
    }

    pub fn on_open(&self, doc: DocumentSnapshot) -> JoinHandle<Option<PassReport>> {
        self.queue_parse(doc)
    }

    pub fn on_save(&self, doc: DocumentSnapshot) -> JoinHandle<Option<PassReport>> {
        self.queue_parse(doc)
    }

    /// Parse now, and again once edits to this document settle.
    ///
    /// The trailing pass reuses `doc` as captured here. Another change before
    /// the delay elapses replaces it. It is skipped if that same version is
    /// still running or waiting when the delay ends.
    pub fn on_change(&self, doc: DocumentSnapshot) -> (JoinHandle<Option<PassReport>>, JoinHandle<()>) {
        let immediate = self.queue_parse(doc.clone());
        let shared = Arc::clone(&self.shared);
        let uri = doc.uri().to_string();
        let trailing = self.debouncer.schedule(&uri, async move {
            shared.run_pass(doc, Origin::Trailing).await;
        });
        (immediate, trailing)
    }

    /// Stop all work for `uri` and clear its diagnostics in the editor.
    pub async fn on_close(&self, uri: &str) {
        self.debouncer.cancel(uri);
        let _gate = self.shared.publish_gate.lock().await;
        if self.shared.lanes.close(uri) {
            tracing::debug!(uri, "Cancelled pass for closed document");
        }
        self.shared.scheduler.cache().remove(uri);
        if let Err(e) = self.shared.sink.publish(uri, None, Vec::new()).await {
            tracing::warn!(uri, "Failed to clear diagnostics on close: {e}");
        }
    }

    /// Cancel every pending, waiting and running pass.
    pub fn shutdown(&self) {
        self.debouncer.cancel_all();
        self.shared.lanes.close_all();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::PassOutcome;
    use crate::testing::{ONE_ERROR, RecordingSink, ScriptedAnalyzer, Step, TimedAnalyzer, TokioClock};
    use crate::types::{AnalyzerOutput, PassKind};

    const URI: &str = "file:///work/main.hlx";
    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn manager(
        analyzer: ScriptedAnalyzer,
        clock: &ManualClock,
        sink: &RecordingSink,
    ) -> RelayManager<ScriptedAnalyzer, ManualClock, RecordingSink> {
        RelayManager::new(analyzer, clock.clone(), sink.clone(), DEBOUNCE)
    }

    fn doc(version: i32) -> DocumentSnapshot {
        DocumentSnapshot::new(URI, version)
    }

    fn versions(sink: &RecordingSink) -> Vec<Option<i32>> {
        sink.for_uri(URI).iter().map(|p| p.version).collect()
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn open_publishes_translated_diagnostics() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Output(AnalyzerOutput::new(ONE_ERROR, Some(1))));
        let manager = manager(analyzer, &clock, &sink);

        let report = manager.on_open(doc(1)).await.unwrap().unwrap();
        assert!(report.is_updated());

        let published = sink.for_uri(URI);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].version, Some(1));
        assert_eq!(published[0].diagnostics[0].message(), "unexpected token");
        assert!(manager.scheduler().cache().is_empty());
    }

    #[tokio::test]
    async fn clean_pass_publishes_empty_list() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let manager = manager(ScriptedAnalyzer::new(&clock), &clock, &sink);

        manager.on_save(doc(2)).await.unwrap();
        let published = sink.for_uri(URI);
        assert_eq!(published.len(), 1);
        assert!(published[0].diagnostics.is_empty());
        assert!(!manager.scheduler().pacing().deep_pass_failed());
    }

    #[tokio::test]
    async fn failed_pass_publishes_nothing() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::NotFound);
        let manager = manager(analyzer, &clock, &sink);

        let report = manager.on_open(doc(1)).await.unwrap().unwrap();
        assert!(matches!(report.outcome, PassOutcome::Failed(_)));
        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn newer_request_waits_for_running_pass() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let gate = Arc::new(Notify::new());
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Gate(
            Arc::clone(&gate),
            AnalyzerOutput::new(ONE_ERROR, Some(1)),
        ));
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let first = manager.queue_parse(doc(1));
        calls.wait_for(1).await;
        let second = manager.queue_parse(doc(2));
        settle().await;
        assert_eq!(calls.len(), 1);

        gate.notify_one();
        assert!(first.await.unwrap().unwrap().is_updated());
        assert!(second.await.unwrap().unwrap().is_updated());
        assert_eq!(versions(&sink), vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn only_newest_waiting_request_runs() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let gate = Arc::new(Notify::new());
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Gate(
            Arc::clone(&gate),
            AnalyzerOutput::new("", Some(0)),
        ));
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let first = manager.queue_parse(doc(1));
        calls.wait_for(1).await;
        let second = manager.queue_parse(doc(2));
        let third = manager.queue_parse(doc(3));
        assert!(second.await.unwrap().is_none());

        gate.notify_one();
        assert!(first.await.unwrap().is_some());
        assert!(third.await.unwrap().is_some());
        assert_eq!(calls.len(), 2);
        assert_eq!(versions(&sink), vec![Some(1), Some(3)]);
    }

    #[tokio::test]
    async fn passes_for_different_uris_run_independently() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let gate = Arc::new(Notify::new());
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Gate(
            Arc::clone(&gate),
            AnalyzerOutput::new(ONE_ERROR, Some(1)),
        ));
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let a = manager.queue_parse(DocumentSnapshot::new("file:///work/a.hlx", 1));
        calls.wait_for(1).await;
        let b = manager.queue_parse(DocumentSnapshot::new("file:///work/b.hlx", 1));
        assert!(b.await.unwrap().unwrap().is_updated());

        gate.notify_one();
        assert!(a.await.unwrap().unwrap().is_updated());
        assert_eq!(sink.for_uri("file:///work/a.hlx").len(), 1);
        assert_eq!(sink.for_uri("file:///work/b.hlx").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn change_runs_immediate_and_one_trailing_pass() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock);
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let (first_now, first_later) = manager.on_change(doc(1));
        first_now.await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (second_now, second_later) = manager.on_change(doc(2));
        second_now.await.unwrap();

        first_later.await.unwrap();
        second_later.await.unwrap();

        // Two immediate passes, one trailing pass.
        assert_eq!(calls.len(), 3);
        assert_eq!(versions(&sink), vec![Some(1), Some(2), Some(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_change_publishes_when_first_pass_finishes() {
        let sink = RecordingSink::default();
        let analyzer = TimedAnalyzer::new(Duration::from_millis(50), Duration::from_millis(800));
        let manager = RelayManager::new(analyzer.clone(), TokioClock, sink.clone(), DEBOUNCE);
        let start = tokio::time::Instant::now();

        let (now, later) = manager.on_change(doc(1));
        let report = now.await.unwrap().unwrap();
        assert_eq!(report.kind, PassKind::Deep);
        assert!(start.elapsed() < Duration::from_millis(900));
        later.await.unwrap();

        // The trailing pass found version 1 still running and stood down.
        assert_eq!(analyzer.started(), vec![PassKind::Deep]);
        assert_eq!(versions(&sink), vec![Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_deep_pass_survives_fast_edits() {
        let sink = RecordingSink::default();
        let analyzer = TimedAnalyzer::new(Duration::from_millis(50), Duration::from_millis(800));
        let manager = RelayManager::new(analyzer.clone(), TokioClock, sink.clone(), DEBOUNCE);

        let mut handles = Vec::new();
        for version in 1..=10 {
            handles.push(manager.on_change(doc(version)));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        for (now, later) in handles {
            now.await.unwrap();
            later.await.unwrap();
        }

        // v1 and v3 were requested before any deep pass had finished. Once
        // one had, edits 300ms apart fall inside its 800ms window.
        let mut expected = vec![PassKind::Deep, PassKind::Deep];
        expected.extend([PassKind::Quick; 6]);
        assert_eq!(analyzer.started(), expected);
        assert_eq!(analyzer.finished(), expected);

        let pacing = manager.scheduler().pacing();
        assert!(pacing.last_pass_duration() >= Some(Duration::from_millis(800)));
        assert!(!pacing.deep_pass_failed());

        let published: Vec<_> = versions(&sink).into_iter().flatten().collect();
        assert_eq!(published, vec![1, 3, 6, 7, 8, 9, 10, 10]);
    }

    #[tokio::test]
    async fn close_cancels_work_and_clears_editor() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Hang);
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let pass = manager.queue_parse(doc(1));
        calls.wait_for(1).await;
        manager.on_close(URI).await;

        let report = pass.await.unwrap().unwrap();
        assert!(matches!(report.outcome, PassOutcome::Superseded));
        let published = sink.for_uri(URI);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].version, None);
        assert!(published[0].diagnostics.is_empty());
    }

    #[tokio::test]
    async fn pass_settling_during_close_publishes_nothing_after_clear() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let gate = Arc::new(Notify::new());
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Gate(
            Arc::clone(&gate),
            AnalyzerOutput::new(ONE_ERROR, Some(1)),
        ));
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let pass = manager.queue_parse(doc(1));
        calls.wait_for(1).await;

        // Close queues on the publish gate first; the pass then writes its
        // result and queues behind it.
        let held = manager.shared.publish_gate.lock().await;
        tokio::join!(manager.on_close(URI), async {
            gate.notify_one();
            while manager.scheduler().cache().is_empty() {
                tokio::task::yield_now().await;
            }
            drop(held);
        });
        pass.await.unwrap();

        let published = sink.for_uri(URI);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].version, None);
        assert!(manager.scheduler().cache().is_empty());
    }

    #[tokio::test]
    async fn close_drops_waiting_request() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Hang);
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let running = manager.queue_parse(doc(1));
        calls.wait_for(1).await;
        let waiting = manager.queue_parse(doc(2));
        settle().await;
        manager.on_close(URI).await;

        assert!(waiting.await.unwrap().is_none());
        assert!(running.await.unwrap().is_some());
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_drops_pending_trailing_pass() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock);
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let (now, later) = manager.on_change(doc(1));
        now.await.unwrap();
        manager.on_close(URI).await;
        later.await.unwrap();

        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_inflight_passes() {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let analyzer = ScriptedAnalyzer::new(&clock).then(Step::Hang);
        let calls = analyzer.calls();
        let manager = manager(analyzer, &clock, &sink);

        let pass = manager.queue_parse(doc(1));
        calls.wait_for(1).await;
        manager.shutdown();
        let report = pass.await.unwrap().unwrap();
        assert!(matches!(report.outcome, PassOutcome::Superseded));
        assert_eq!(calls.kinds(), vec![PassKind::Deep]);
    }
}
