//! Entity cache
//!
//! Memoizes resolved documents by locator. Each locator owns one slot in a
//! sharded [`DashMap`], so callers contend per locator rather than on a
//! global lock, and no lock is ever held across a fetch.
//!
//! A slot moves `Pending -> Resolved` or `Pending -> Failed` exactly once per
//! fetch. Callers that find a slot `Pending` wait on its [`Notify`] instead of
//! fetching again, which gives at most one in-flight fetch per locator. The
//! outcome is handed to waiters directly, so a value evicted before a waiter
//! wakes up is still delivered without a second fetch.
//!
//! Settled slots are indexed by resolve sequence in a [`BTreeMap`], which is
//! what bounded caches evict from. Failures are kept for [`CacheConfig::failure_ttl`] so a burst of callers
//! does not hammer an endpoint that just failed.

use crate::error::ResolveError;
use crate::model::Locator;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// How long a failed fetch is served from the cache
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5);

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on settled entries; the least recently resolved go first
    pub max_entries: Option<usize>,
    pub failure_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            failure_ttl: DEFAULT_FAILURE_TTL,
        }
    }
}

/// Observable state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Resolved,
    Failed,
}

type Outcome<V> = Arc<OnceLock<Result<V, ResolveError>>>;

enum Slot<V> {
    Pending {
        notify: Arc<Notify>,
        waiters: Arc<AtomicUsize>,
        outcome: Outcome<V>,
        ticket: u64,
    },
    Resolved {
        value: V,
        seq: u64,
    },
    Failed {
        error: ResolveError,
        at: Instant,
        seq: u64,
    },
}

impl<V> Slot<V> {
    fn pending(ticket: u64) -> Self {
        Slot::Pending {
            notify: Arc::new(Notify::new()),
            waiters: Arc::new(AtomicUsize::new(0)),
            outcome: Arc::new(OnceLock::new()),
            ticket,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending { .. })
    }

    fn owned_by(&self, owner: u64) -> bool {
        matches!(self, Slot::Pending { ticket, .. } if *ticket == owner)
    }

    /// Resolve sequence of a settled slot
    fn settled_seq(&self) -> Option<u64> {
        match self {
            Slot::Pending { .. } => None,
            Slot::Resolved { seq, .. } | Slot::Failed { seq, .. } => Some(*seq),
        }
    }

    fn state(&self) -> EntryState {
        match self {
            Slot::Pending { .. } => EntryState::Pending,
            Slot::Resolved { .. } => EntryState::Resolved,
            Slot::Failed { .. } => EntryState::Failed,
        }
    }
}

/// Per-locator memo with single-flight fetches
pub struct EntityCache<V> {
    slots: DashMap<Locator, Slot<V>>,
    /// Settled slots by resolve sequence, oldest first
    order: Mutex<BTreeMap<u64, Locator>>,
    config: CacheConfig,
    sequence: AtomicU64,
}

impl<V: Clone> EntityCache<V> {
    pub fn new(mut config: CacheConfig) -> Self {
        // A zero bound would evict every value before its waiters read it
        config.max_entries = config.max_entries.map(|n| n.max(1));
        Self {
            slots: DashMap::new(),
            order: Mutex::new(BTreeMap::new()),
            config,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    // Never held while a shard guard is being acquired
    fn order(&self) -> MutexGuard<'_, BTreeMap<u64, Locator>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached value for `locator`, or run `fetch` to produce it
    ///
    /// Only the first caller for an absent (or expired-failure) locator runs
    /// its `fetch`; everyone arriving while that fetch is pending waits for
    /// its outcome. Cache hits return without suspending.
    pub async fn get_or_fetch<F, Fut>(&self, locator: &Locator, fetch: F) -> Result<V, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ResolveError>>,
    {
        let (ticket, expired) = loop {
            match self.slots.entry(locator.clone()) {
                Entry::Vacant(vacant) => {
                    let ticket = self.next_seq();
                    vacant.insert(Slot::pending(ticket));
                    break (ticket, None);
                }
                Entry::Occupied(mut occupied) => {
                    let (notify, outcome) = match occupied.get() {
                        Slot::Resolved { value, .. } => {
                            tracing::trace!("cache hit: {}", locator);
                            return Ok(value.clone());
                        }
                        Slot::Failed { error, at, .. } if at.elapsed() < self.config.failure_ttl => {
                            tracing::trace!("cached failure: {}", locator);
                            return Err(error.clone());
                        }
                        Slot::Failed { seq, .. } => {
                            tracing::debug!("cached failure for {} expired, refetching", locator);
                            let expired = *seq;
                            let ticket = self.next_seq();
                            occupied.insert(Slot::pending(ticket));
                            break (ticket, Some(expired));
                        }
                        Slot::Pending {
                            notify,
                            waiters,
                            outcome,
                            ..
                        } => {
                            waiters.fetch_add(1, Ordering::Relaxed);
                            (Arc::clone(notify), Arc::clone(outcome))
                        }
                    };

                    // Register before releasing the shard so the wakeup cannot be missed
                    let notified = notify.notified();
                    drop(occupied);
                    tracing::trace!("waiting for in-flight fetch of {}", locator);
                    notified.await;

                    // Unset only when the fetch was abandoned
                    if let Some(result) = outcome.get() {
                        return result.clone();
                    }
                }
            }
        };

        if let Some(seq) = expired {
            self.order().remove(&seq);
        }

        let mut guard = PendingGuard {
            cache: self,
            locator,
            ticket,
            armed: true,
        };

        tracing::debug!("cache miss: {}", locator);
        let result = fetch().await;
        guard.settle(&result);
        result
    }

    /// Resolved value for `locator`, without fetching
    pub fn get(&self, locator: &Locator) -> Option<V> {
        match self.slots.get(locator).as_deref() {
            Some(Slot::Resolved { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn state(&self, locator: &Locator) -> Option<EntryState> {
        self.slots.get(locator).map(|slot| slot.state())
    }

    /// Evict a settled entry so the next request refetches
    ///
    /// Returns whether anything was evicted. An in-flight fetch is left
    /// alone; its callers still receive its outcome.
    pub fn invalidate(&self, locator: &Locator) -> bool {
        match self.slots.remove_if(locator, |_, slot| !slot.is_pending()) {
            Some((_, slot)) => {
                if let Some(seq) = slot.settled_seq() {
                    self.order().remove(&seq);
                }
                tracing::debug!("invalidated {}", locator);
                true
            }
            None => false,
        }
    }

    /// Evict every settled entry
    pub fn clear(&self) {
        let mut dropped = Vec::new();
        self.slots.retain(|_, slot| match slot.settled_seq() {
            Some(seq) => {
                dropped.push(seq);
                false
            }
            None => true,
        });

        let mut order = self.order();
        for seq in dropped {
            order.remove(&seq);
        }
    }

    /// Number of entries, pending ones included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn complete(&self, locator: &Locator, ticket: u64, result: &Result<V, ResolveError>) {
        let seq = self.next_seq();
        let settled = match result {
            Ok(value) => Slot::Resolved {
                value: value.clone(),
                seq,
            },
            Err(error) => Slot::Failed {
                error: error.clone(),
                at: Instant::now(),
                seq,
            },
        };

        let previous = match self.slots.get_mut(locator) {
            Some(mut slot) if slot.owned_by(ticket) => Some(std::mem::replace(&mut *slot, settled)),
            _ => None,
        };

        let Some(Slot::Pending {
            notify,
            waiters,
            outcome,
            ..
        }) = previous
        else {
            return;
        };

        self.order().insert(seq, locator.clone());

        let waiters = waiters.load(Ordering::Relaxed);
        if waiters > 0 {
            tracing::debug!("{} settled for {} waiting callers", locator, waiters);
        }
        let _ = outcome.set(result.clone());
        notify.notify_waiters();

        self.evict_overflow();
    }

    fn abandon(&self, locator: &Locator, ticket: u64) {
        if let Some((_, Slot::Pending { notify, .. })) =
            self.slots.remove_if(locator, |_, slot| slot.owned_by(ticket))
        {
            tracing::debug!("fetch of {} abandoned, waking waiters", locator);
            notify.notify_waiters();
        }
    }

    fn evict_overflow(&self) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };

        loop {
            let oldest = {
                let mut order = self.order();
                if order.len() <= max_entries {
                    return;
                }
                order.pop_first()
            };
            let Some((seq, locator)) = oldest else {
                return;
            };

            if self
                .slots
                .remove_if(&locator, |_, slot| slot.settled_seq() == Some(seq))
                .is_some()
            {
                tracing::trace!("evicted {} from cache", locator);
            }
        }
    }
}

/// Clears a pending slot if its fetch is dropped before settling
struct PendingGuard<'a, V: Clone> {
    cache: &'a EntityCache<V>,
    locator: &'a Locator,
    ticket: u64,
    armed: bool,
}

impl<V: Clone> PendingGuard<'_, V> {
    fn settle(&mut self, result: &Result<V, ResolveError>) {
        self.armed = false;
        self.cache.complete(self.locator, self.ticket, result);
    }
}

impl<V: Clone> Drop for PendingGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(self.locator, self.ticket);
        }
    }
}
