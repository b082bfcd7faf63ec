// src/services/cache.rs

//! Request/response cache shared by collection views.
//!
//! The cache is the single source of truth for in-flight de-duplication:
//! at most one network call per key is pending at any time, and every
//! caller asking for that key while it is pending awaits the same call.
//! When the last waiter goes away the call is aborted.
//!
//! Entries go stale by age or by explicit invalidation of their dataset.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::{AbortHandle, Aborted, BoxFuture, FutureExt, Shared, abortable};

use crate::error::{AppError, Result};
use crate::models::{CollectionPage, ResolvedMode};
use crate::utils::fingerprint;

/// Composite identity of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset: String,
    pub scope: KeyScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// Total-size detection request
    Detection { selection: String },
    /// Main data; `window` is present only in server mode
    Data {
        mode: ResolvedMode,
        selection: String,
        window: Option<String>,
    },
}

impl CacheKey {
    pub fn detection(dataset: &str, selection: String) -> Self {
        Self {
            dataset: dataset.to_string(),
            scope: KeyScope::Detection { selection },
        }
    }

    pub fn data(
        dataset: &str,
        mode: ResolvedMode,
        selection: String,
        window: Option<String>,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            scope: KeyScope::Data {
                mode,
                selection,
                window,
            },
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            KeyScope::Detection { selection } => {
                write!(f, "{}/detect:{}", self.dataset, fingerprint(selection))
            }
            KeyScope::Data {
                mode,
                selection,
                window,
            } => write!(
                f,
                "{}/{}:{}:{}",
                self.dataset,
                mode,
                fingerprint(selection),
                window.as_deref().map_or_else(|| "all".to_string(), fingerprint)
            ),
        }
    }
}

/// Why a fetch produced no page.
#[derive(Debug, Clone)]
pub enum FetchFailure {
    /// Every waiter left, or the entry was removed
    Aborted,
    Failed(Arc<AppError>),
}

pub type FetchResult = std::result::Result<Arc<CollectionPage>, FetchFailure>;

/// A stored response.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub page: Arc<CollectionPage>,
    /// Wall-clock time the response was stored
    pub updated_at: DateTime<Utc>,
    fetched_at: Instant,
    invalidated: bool,
}

impl CachedPage {
    fn new(page: Arc<CollectionPage>) -> Self {
        Self {
            page,
            updated_at: Utc::now(),
            fetched_at: Instant::now(),
            invalidated: false,
        }
    }

    /// Fresh entries are served without a network call.
    pub fn is_fresh(&self, stale_after: Duration) -> bool {
        !self.invalidated && self.fetched_at.elapsed() < stale_after
    }
}

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct Pending {
    id: u64,
    future: SharedFetch,
    abort: AbortHandle,
    waiters: usize,
}

#[derive(Default)]
struct Slot {
    value: Option<CachedPage>,
    pending: Option<Pending>,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    next_id: u64,
}

/// Injectable response cache. Clones share storage.
#[derive(Clone, Default)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored response for a key, fresh or not.
    pub fn get(&self, key: &CacheKey) -> Option<CachedPage> {
        self.lock().slots.get(key).and_then(|s| s.value.clone())
    }

    /// Store a response directly.
    pub fn insert(&self, key: CacheKey, page: CollectionPage) {
        self.lock().slots.entry(key).or_default().value = Some(CachedPage::new(Arc::new(page)));
    }

    /// Fetch through the cache, joining a pending call for the same key.
    ///
    /// `loader` is only invoked when no call is pending. Dropping the
    /// returned future withdraws this caller; the call is aborted once no
    /// caller is left.
    pub async fn fetch<F>(&self, key: CacheKey, loader: F) -> FetchResult
    where
        F: FnOnce() -> BoxFuture<'static, Result<CollectionPage>>,
    {
        let (id, future) = {
            let mut state = self.lock();
            state.next_id += 1;
            let next_id = state.next_id;
            let slot = state.slots.entry(key.clone()).or_default();
            match slot.pending.as_mut() {
                Some(pending) => {
                    pending.waiters += 1;
                    log::debug!("Joining pending fetch for {key}");
                    (pending.id, pending.future.clone())
                }
                None => {
                    let (future, abort) = abortable(loader());
                    let future = future.map(flatten).boxed().shared();
                    slot.pending = Some(Pending {
                        id: next_id,
                        future: future.clone(),
                        abort,
                        waiters: 1,
                    });
                    (next_id, future)
                }
            }
        };

        let mut waiter = Waiter {
            cache: self,
            key: &key,
            id,
            armed: true,
        };
        let result = future.await;
        waiter.armed = false;
        self.complete(&key, id, &result);
        result
    }

    /// Serve a fresh stored response, otherwise fetch.
    pub async fn fetch_fresh<F>(&self, key: CacheKey, stale_after: Duration, loader: F) -> FetchResult
    where
        F: FnOnce() -> BoxFuture<'static, Result<CollectionPage>>,
    {
        if let Some(cached) = self.get(&key).filter(|c| c.is_fresh(stale_after)) {
            log::debug!(
                "Cache hit for {key} (stored {})",
                cached.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            );
            return Ok(cached.page);
        }
        self.fetch(key, loader).await
    }

    fn complete(&self, key: &CacheKey, id: u64, result: &FetchResult) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(key) else {
            return;
        };
        if slot.pending.as_ref().is_some_and(|p| p.id == id) {
            slot.pending = None;
            if let Ok(page) = result {
                slot.value = Some(CachedPage::new(Arc::clone(page)));
            }
        }
    }

    fn withdraw(&self, key: &CacheKey, id: u64) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(key) else {
            return;
        };
        let abandoned = match slot.pending.as_mut() {
            Some(pending) if pending.id == id => {
                pending.waiters -= 1;
                pending.waiters == 0
            }
            _ => false,
        };
        if abandoned {
            if let Some(pending) = slot.pending.take() {
                log::debug!("Aborting abandoned fetch for {key}");
                pending.abort.abort();
            }
        }
    }

    /// Mark every entry of a dataset stale. Returns the number marked.
    pub fn invalidate_dataset(&self, dataset: &str) -> usize {
        let mut state = self.lock();
        let mut count = 0;
        for (key, slot) in state.slots.iter_mut() {
            if key.dataset != dataset {
                continue;
            }
            if let Some(value) = slot.value.as_mut() {
                value.invalidated = true;
                count += 1;
            }
        }
        log::debug!("Invalidated {count} entries of {dataset}");
        count
    }

    /// Drop every entry of a dataset, aborting pending calls.
    pub fn remove_dataset(&self, dataset: &str) -> usize {
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|key, slot| {
            if key.dataset != dataset {
                return true;
            }
            if let Some(pending) = slot.pending.take() {
                pending.abort.abort();
            }
            false
        });
        before - state.slots.len()
    }

    /// Drop idle entries older than `max_age`. Returns the number dropped.
    pub fn prune(&self, max_age: Duration) -> usize {
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| {
            slot.pending.is_some()
                || slot
                    .value
                    .as_ref()
                    .is_some_and(|v| v.fetched_at.elapsed() < max_age)
        });
        before - state.slots.len()
    }

    /// Number of calls currently pending.
    pub fn in_flight(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|s| s.pending.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn flatten(result: std::result::Result<Result<CollectionPage>, Aborted>) -> FetchResult {
    match result {
        Ok(Ok(page)) => Ok(Arc::new(page)),
        Ok(Err(error)) => Err(FetchFailure::Failed(Arc::new(error))),
        Err(Aborted) => Err(FetchFailure::Aborted),
    }
}

/// Withdraws its caller from a pending call if dropped before completion.
struct Waiter<'a> {
    cache: &'a QueryCache,
    key: &'a CacheKey,
    id: u64,
    armed: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.withdraw(self.key, self.id);
        }
    }
}
