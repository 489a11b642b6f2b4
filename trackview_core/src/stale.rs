//! Soft cancellation of superseded fetches.
//!
//! Every long-running fetch path (timepoint points, lineage) takes a
//! [`RequestTicket`] before its first await and checks it after its last.
//! Starting a newer request on the same tracker marks older tickets stale,
//! so a slow earlier fetch can never overwrite the result of a later one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a fetch guarded by a ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The request was still the newest when it completed
    Current(T),
    /// A newer request started (or the tracker was invalidated) while this one was in flight
    Discarded,
}

impl<T> FetchOutcome<T> {
    pub fn is_current(&self) -> bool {
        matches!(self, FetchOutcome::Current(_))
    }

    pub fn into_current(self) -> Option<T> {
        match self {
            FetchOutcome::Current(value) => Some(value),
            FetchOutcome::Discarded => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Current(value) => FetchOutcome::Current(f(value)),
            FetchOutcome::Discarded => FetchOutcome::Discarded,
        }
    }
}

/// Issues tickets for one request stream (e.g. "points of the displayed timepoint").
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    generation: Arc<AtomicU64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request, making every earlier ticket stale.
    pub fn begin(&self) -> RequestTicket {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            id,
            generation: Arc::clone(&self.generation),
        }
    }

    /// Marks every outstanding ticket stale without starting a new request.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Id of the newest ticket (or invalidation).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Handle of one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    generation: Arc<AtomicU64>,
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once a newer request has started on the same tracker.
    pub fn is_stale(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.id
    }

    /// Wraps a completed value according to the ticket's current state.
    pub fn resolve<T>(&self, value: T) -> FetchOutcome<T> {
        if self.is_stale() {
            FetchOutcome::Discarded
        } else {
            FetchOutcome::Current(value)
        }
    }

    /// Awaits `fut`, then discards its output if the ticket went stale meanwhile.
    pub async fn guard<T, F>(&self, fut: F) -> FetchOutcome<T>
    where
        F: Future<Output = T>,
    {
        let value = fut.await;
        self.resolve(value)
    }
}
