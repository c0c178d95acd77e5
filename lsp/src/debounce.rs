//! Keyed cancellation slots and trailing-edge debounce.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct SlotTable {
    next_generation: u64,
    slots: HashMap<String, (u64, CancellationToken)>,
}

/// At most one live [`CancellationToken`] per key.
///
/// Taking a new token for a key cancels the previous one. The generation
/// returned alongside the token lets its owner release the slot without
/// clobbering a newer occupant.
#[derive(Debug, Default)]
struct TokenSlots {
    table: Mutex<SlotTable>,
}

impl TokenSlots {
    fn table(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, key: &str) -> (u64, CancellationToken) {
        let mut table = self.table();
        table.next_generation += 1;
        let generation = table.next_generation;
        let token = CancellationToken::new();
        if let Some((_, previous)) = table
            .slots
            .insert(key.to_string(), (generation, token.clone()))
        {
            previous.cancel();
        }
        (generation, token)
    }

    /// Free the slot if it still belongs to `generation`.
    fn release(&self, key: &str, generation: u64) {
        let mut table = self.table();
        if table
            .slots
            .get(key)
            .is_some_and(|(current, _)| *current == generation)
        {
            table.slots.remove(key);
        }
    }

    fn cancel(&self, key: &str) -> bool {
        match self.table().slots.remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        for (_, (_, token)) in self.table().slots.drain() {
            token.cancel();
        }
    }

    fn is_occupied(&self, key: &str) -> bool {
        self.table().slots.contains_key(key)
    }
}

/// Runs a task once a key has been quiet for `delay`.
///
/// Scheduling again for the same key before the delay elapses drops the
/// earlier task unrun.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    slots: Arc<TokenSlots>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(TokenSlots::default()),
        }
    }

    pub fn schedule<F>(&self, key: &str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (generation, token) = self.slots.replace(key);
        let slots = Arc::clone(&self.slots);
        let key = key.to_string();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            slots.release(&key, generation);
            task.await;
        })
    }

    /// Drop the pending task for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        self.slots.cancel(key)
    }

    pub fn cancel_all(&self) {
        self.slots.cancel_all();
    }

    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.slots.is_occupied(key)
    }
}
