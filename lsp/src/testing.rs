//! In-memory analyzer and sink for unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use helix_diag_types::Diagnostic;
use tokio::sync::Notify;

use crate::clock::{Clock, ManualClock};
use crate::error::AnalysisError;
use crate::invoker::Analyzer;
use crate::protocol;
use crate::publisher::{DiagnosticSink, PublishError};
use crate::types::{AnalyzerOutput, PassKind};

pub(crate) const ONE_ERROR: &str =
    r#"{"error":{"errors":[{"msg":"unexpected token","level":"error","line":3,"col":5,"offset":2}]}}"#;

pub(crate) enum Step {
    Output(AnalyzerOutput),
    NotFound,
    /// Never completes; only cancellation ends the pass.
    Hang,
    /// Waits for the notify, then yields the output.
    Gate(Arc<Notify>, AnalyzerOutput),
}

/// Replays scripted steps in call order and advances the clock to simulate
/// run time. Unscripted calls produce a clean result.
pub(crate) struct ScriptedAnalyzer {
    clock: ManualClock,
    quick_time: Duration,
    deep_time: Duration,
    steps: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<Mutex<Vec<(PathBuf, PassKind)>>>,
}

impl ScriptedAnalyzer {
    pub(crate) fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            quick_time: Duration::ZERO,
            deep_time: Duration::from_secs(2),
            steps: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub(crate) fn then(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn calls(&self) -> CallLog {
        CallLog(Arc::clone(&self.calls))
    }
}

impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, file: &Path, kind: PassKind) -> Result<AnalyzerOutput, AnalysisError> {
        self.calls.lock().unwrap().push((file.to_path_buf(), kind));
        self.clock.advance(match kind {
            PassKind::Quick => self.quick_time,
            PassKind::Deep => self.deep_time,
        });
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Output(out)) => Ok(out),
            Some(Step::NotFound) => Err(AnalysisError::AnalyzerNotFound {
                binary: "/missing/helix".to_string(),
                reason: "cannot find binary path".to_string(),
            }),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Gate(gate, out)) => {
                gate.notified().await;
                Ok(out)
            }
            None => Ok(AnalyzerOutput::new("", Some(0))),
        }
    }
}

/// Shared view of the analyzer's call history.
#[derive(Clone)]
pub(crate) struct CallLog(Arc<Mutex<Vec<(PathBuf, PassKind)>>>);

impl CallLog {
    pub(crate) fn snapshot(&self) -> Vec<(PathBuf, PassKind)> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub(crate) fn kinds(&self) -> Vec<PassKind> {
        self.snapshot().into_iter().map(|(_, kind)| kind).collect()
    }

    /// Yield until at least `n` calls have started.
    pub(crate) async fn wait_for(&self, n: usize) {
        while self.len() < n {
            tokio::task::yield_now().await;
        }
    }
}

/// Tokio's clock, so paused-time tests drive pacing too.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Sleeps on tokio time for each pass and reports a clean result. Records
/// which passes started and which ran to completion.
#[derive(Clone)]
pub(crate) struct TimedAnalyzer {
    quick_time: Duration,
    deep_time: Duration,
    started: Arc<Mutex<Vec<PassKind>>>,
    finished: Arc<Mutex<Vec<PassKind>>>,
}

impl TimedAnalyzer {
    pub(crate) fn new(quick_time: Duration, deep_time: Duration) -> Self {
        Self {
            quick_time,
            deep_time,
            started: Arc::default(),
            finished: Arc::default(),
        }
    }

    pub(crate) fn started(&self) -> Vec<PassKind> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn finished(&self) -> Vec<PassKind> {
        self.finished.lock().unwrap().clone()
    }
}

impl Analyzer for TimedAnalyzer {
    async fn analyze(&self, _file: &Path, kind: PassKind) -> Result<AnalyzerOutput, AnalysisError> {
        self.started.lock().unwrap().push(kind);
        tokio::time::sleep(match kind {
            PassKind::Quick => self.quick_time,
            PassKind::Deep => self.deep_time,
        })
        .await;
        self.finished.lock().unwrap().push(kind);
        Ok(AnalyzerOutput::new("", Some(0)))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Published {
    pub uri: String,
    pub version: Option<i32>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Records every notification instead of sending it. URIs are validated
/// the same way the editor client does.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    published: Arc<Mutex<Vec<Published>>>,
}

impl RecordingSink {
    pub(crate) fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn for_uri(&self, uri: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.uri == uri)
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    async fn publish(
        &self,
        uri: &str,
        version: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<(), PublishError> {
        protocol::parse_uri(uri)?;
        self.published.lock().unwrap().push(Published {
            uri: uri.to_string(),
            version,
            diagnostics,
        });
        Ok(())
    }
}
