//! Per-resource exclusive sections
//!
//! Every mutating entry point is a read-modify-write against one resource
//! id. Two concurrent callers must never both observe the pre-mutation
//! state and both commit; the guard serializes them so the second caller
//! re-reads the state the first one left behind.
//!
//! The section is scoped to a single resource id: operations on different
//! resources interleave freely, operations on the same resource are
//! strictly ordered. The registry commits all effects of one section in a
//! single storage batch, so a rejection inside the section persists
//! nothing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Mutating entry points (async)              │
//! │   book / cancel / complete / schedule / match ...     │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ with_exclusive(resource_id, fn)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LifecycleGuard (DashMap)                 │
//! │   resource_id → Arc<Mutex<()>>  (created on demand,   │
//! │   removed again once the last waiter is gone)         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ serialized per resource_id
//!                       ▼
//!          fn: re-read → validate transition → stage batch
//!                       → Storage::commit (atomic)
//! ```

use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Registry of in-flight exclusive sections, keyed by resource id.
#[derive(Debug, Default)]
pub struct LifecycleGuard {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LifecycleGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` inside the exclusive section for `resource_id`.
    ///
    /// `f` must re-read the resource's current state itself — state read
    /// before entering the section is stale by definition. The section is
    /// released on every exit path, including rejection and panic, and
    /// the lock entry is dropped once no other caller is waiting on it.
    pub async fn with_exclusive<T, F>(&self, resource_id: Uuid, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock = self
            .locks
            .entry(resource_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _section = lock.lock().await;
            f()
        };

        drop(lock);
        // Entry holds one reference; removal only when no waiter holds another.
        // Cloning out of the map takes the shard lock, so the count check is
        // race-free against new arrivals.
        self.locks
            .remove_if(&resource_id, |_, l| Arc::strong_count(l) == 1);

        result
    }

    /// Run `f` inside the exclusive sections for two resources at once.
    ///
    /// Only two entity pairs are ever mutated together: an appointment
    /// with its slot's doctor, and a donation with its donor. Locks are
    /// acquired in id order so two callers taking the same pair in
    /// opposite roles cannot deadlock.
    pub async fn with_exclusive_pair<T, F>(&self, a: Uuid, b: Uuid, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if a == b {
            return self.with_exclusive(a, f).await;
        }

        let (first, second) = if a.as_bytes() < b.as_bytes() {
            (a, b)
        } else {
            (b, a)
        };

        let first_lock = self
            .locks
            .entry(first)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let second_lock = self
            .locks
            .entry(second)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _first_section = first_lock.lock().await;
            let _second_section = second_lock.lock().await;
            f()
        };

        drop(first_lock);
        drop(second_lock);
        self.locks.remove_if(&first, |_, l| Arc::strong_count(l) == 1);
        self.locks
            .remove_if(&second, |_, l| Arc::strong_count(l) == 1);

        result
    }

    /// Number of resource ids currently tracked (tests/metrics)
    pub fn tracked_resources(&self) -> usize {
        self.locks.len()
    }
}
