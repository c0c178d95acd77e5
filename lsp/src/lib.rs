//! Diagnostic relay between an LSP editor and the helix analyzer.
//!
//! ```text
//! editor event → RelayManager → PassLanes → Scheduler::execute
//!                                 → Analyzer (subprocess) → translate
//!                                 → DiagnosticCache::update
//!              → DiagnosticCache::flush_all → DiagnosticSink::publish
//! ```

pub mod capabilities;
pub mod clock;
pub mod debounce;
pub mod diagnostics;
pub mod documents;
pub mod error;
pub mod invoker;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod translate;
pub mod types;

pub(crate) mod protocol;

mod lanes;
mod manager;
mod working_copy;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{CacheEntry, DiagnosticCache};
pub use error::{AnalysisError, TranslateError};
pub use invoker::{Analyzer, ProcessAnalyzer};
pub use manager::RelayManager;
pub use protocol::{DIAGNOSTIC_SOURCE, InvalidUriError};
pub use publisher::{DiagnosticSink, PublishError, publish_all};
pub use scheduler::{PacingState, PassOutcome, PassReport, Scheduler};
pub use server::{HelixLanguageServer, run_stdio, serve};
pub use types::{AnalyzerOutput, PassKind, RelaySettings};
