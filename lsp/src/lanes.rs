//! Per-document pass lanes.
//!
//! A document runs at most one pass at a time. A request that arrives while
//! its document is busy waits for the running pass to finish, and only the
//! newest waiter is kept. A running pass is never cut short by a newer
//! request, only by [`PassLanes::close`] or [`PassLanes::close_all`], so a
//! deep pass that starts always gets to report how long it took.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Where a pass request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// An editor event. Gets a pass, and reopens a closed document.
    Event,
    /// A debounced re-parse. Skipped when a pass for the same version is
    /// already running or waiting, or when the document was closed after the
    /// re-parse was scheduled.
    Trailing,
}

#[derive(Debug)]
struct Waiter {
    version: i32,
    wake: oneshot::Sender<Ticket>,
}

#[derive(Debug)]
struct Lane {
    generation: u64,
    version: i32,
    cancel: CancellationToken,
    waiting: Option<Waiter>,
}

#[derive(Debug, Default)]
struct LaneTable {
    next_generation: u64,
    lanes: HashMap<String, Lane>,
    closed: HashSet<String>,
    shut_down: bool,
}

impl LaneTable {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

type SharedTable = Arc<Mutex<LaneTable>>;

fn lock(table: &Mutex<LaneTable>) -> MutexGuard<'_, LaneTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The right to run one pass. Dropping it hands the lane to the waiter, or
/// frees it.
#[derive(Debug)]
pub(crate) struct Ticket {
    table: Option<SharedTable>,
    uri: String,
    generation: u64,
    cancel: CancellationToken,
}

impl Ticket {
    /// Fires when the document is closed or the relay shuts down.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            release(&table, &self.uri, self.generation);
        }
    }
}

fn release(table: &SharedTable, uri: &str, generation: u64) {
    let mut guard = lock(table);
    let state = &mut *guard;
    let next = state.next_generation();
    let Some(lane) = state.lanes.get_mut(uri) else {
        return;
    };
    if lane.generation != generation {
        return;
    }

    if let Some(waiter) = lane.waiting.take() {
        let cancel = CancellationToken::new();
        let ticket = Ticket {
            table: Some(Arc::clone(table)),
            uri: uri.to_string(),
            generation: next,
            cancel: cancel.clone(),
        };
        match waiter.wake.send(ticket) {
            Ok(()) => {
                lane.generation = next;
                lane.version = waiter.version;
                lane.cancel = cancel;
                return;
            }
            // The waiter is gone. Disarm so the drop does not re-enter.
            Err(mut unclaimed) => unclaimed.table = None,
        }
    }
    state.lanes.remove(uri);
}

/// Outcome of asking for a lane.
#[derive(Debug)]
pub(crate) enum Admission {
    Run(Ticket),
    Wait(oneshot::Receiver<Ticket>),
    Skip,
}

impl Admission {
    /// Wait for the ticket. `None` when skipped, replaced by a newer waiter,
    /// or dropped because the document closed.
    pub(crate) async fn ticket(self) -> Option<Ticket> {
        match self {
            Self::Run(ticket) => Some(ticket),
            Self::Wait(rx) => rx.await.ok(),
            Self::Skip => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PassLanes {
    table: SharedTable,
}

impl PassLanes {
    pub(crate) fn admit(&self, uri: &str, version: i32, origin: Origin) -> Admission {
        let mut guard = lock(&self.table);
        let state = &mut *guard;
        if state.shut_down {
            return Admission::Skip;
        }
        match origin {
            Origin::Event => {
                state.closed.remove(uri);
            }
            Origin::Trailing if state.closed.contains(uri) => return Admission::Skip,
            Origin::Trailing => {}
        }
        let generation = state.next_generation();
        match state.lanes.entry(uri.to_string()) {
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(Lane {
                    generation,
                    version,
                    cancel: cancel.clone(),
                    waiting: None,
                });
                Admission::Run(Ticket {
                    table: Some(Arc::clone(&self.table)),
                    uri: uri.to_string(),
                    generation,
                    cancel,
                })
            }
            Entry::Occupied(mut slot) => {
                let lane = slot.get_mut();
                let duplicate = lane.version == version
                    || lane.waiting.as_ref().is_some_and(|w| w.version == version);
                if origin == Origin::Trailing && duplicate {
                    return Admission::Skip;
                }
                // Replacing the waiter drops its sender; it wakes empty-handed.
                let (wake, rx) = oneshot::channel();
                lane.waiting = Some(Waiter { version, wake });
                Admission::Wait(rx)
            }
        }
    }

    /// Cancel the running pass for `uri` and drop its waiter. Trailing
    /// requests are refused until the next editor event for `uri`.
    pub(crate) fn close(&self, uri: &str) -> bool {
        let mut state = lock(&self.table);
        state.closed.insert(uri.to_string());
        match state.lanes.remove(uri) {
            Some(lane) => {
                lane.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything and refuse all further requests.
    pub(crate) fn close_all(&self) {
        let mut state = lock(&self.table);
        state.shut_down = true;
        for (_, lane) in state.lanes.drain() {
            lane.cancel.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self, uri: &str) -> bool {
        lock(&self.table).lanes.contains_key(uri)
    }
}
