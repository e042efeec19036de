//! # Escalation Scheduler
//!
//! One cancellable one-shot timer per dispatch. Arming a dispatch replaces
//! any timer already armed for it; cancelling is idempotent and a no-op
//! once the timer has fired.
//!
//! Each timer is a Tokio task. A firing task removes its own map entry
//! before running the callback, so a callback is never aborted half-way
//! through a ledger operation by a concurrent `cancel`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use triage_core::DispatchId;

#[derive(Debug)]
struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-dispatch timer registry.
#[derive(Debug, Clone, Default)]
pub struct EscalationScheduler {
    timers: Arc<Mutex<HashMap<DispatchId, Armed>>>,
    generation: Arc<AtomicU64>,
}

impl EscalationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay` unless cancelled or re-armed first.
    pub fn arm<F, Fut>(&self, id: DispatchId, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        // Anchored here, not at the task's first poll.
        let deadline = Instant::now() + delay;

        // Hold the lock across spawn + insert so a zero-delay timer cannot
        // look for its entry before it exists.
        let mut guard = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut timers = timers.lock();
                match timers.get(&id) {
                    Some(armed) if armed.generation == generation => {
                        timers.remove(&id);
                    }
                    _ => return,
                }
            }
            tracing::debug!(dispatch_id = %id, generation, "escalation timer fired");
            on_fire().await;
        });
        if let Some(previous) = guard.insert(id, Armed { generation, handle }) {
            previous.handle.abort();
            tracing::debug!(dispatch_id = %id, "escalation timer re-armed");
        }
    }

    /// Cancel the timer for `id`. Returns whether one was armed.
    pub fn cancel(&self, id: DispatchId) -> bool {
        match self.timers.lock().remove(&id) {
            Some(armed) => {
                armed.handle.abort();
                tracing::debug!(dispatch_id = %id, "escalation timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a timer is armed for `id`.
    pub fn is_armed(&self, id: DispatchId) -> bool {
        self.timers.lock().contains_key(&id)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }

    /// Abort every armed timer.
    pub fn shutdown(&self) {
        let drained: Vec<Armed> = self.timers.lock().drain().map(|(_, a)| a).collect();
        for armed in drained {
            armed.handle.abort();
        }
    }
}
