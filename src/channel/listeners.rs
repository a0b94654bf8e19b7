//! Typed publish/subscribe registry with per-listener failure isolation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

const ENABLE_LOGS: bool = true;

use crate::log_error;

/// Receives events of type `E`.
///
/// Returning an error (or panicking) only affects this listener's delivery;
/// the remaining listeners still run and the publisher keeps working.
pub trait Listener<E>: Send + Sync {
    fn handle(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

/// Token returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct ListenerRegistry<E> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn Listener<E>>)>>,
}

impl<E> ListenerRegistry<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Listeners are called in subscription order.
    pub fn subscribe(&self, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener registered at the time of the call
    /// and returns how many handled it without failing.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot so listeners may (un)subscribe from inside `handle`.
        let snapshot: Vec<_> = self.entries.lock().clone();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.handle(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    log_error!("{} listener {:?} failed: {err:#}", self.name, id);
                }
                Err(_) => {
                    log_error!("{} listener {:?} panicked", self.name, id);
                }
            }
        }
        delivered
    }
}
