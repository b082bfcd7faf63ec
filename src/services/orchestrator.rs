// src/services/orchestrator.rs

//! Main data fetching for one view.
//!
//! The orchestrator owns the *active* request. Asking for a new key
//! supersedes the previous task; whatever it returns afterwards is dropped
//! by a generation check. The last displayed page stays visible until the
//! new one lands, except after an error.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::models::CollectionPage;
use crate::services::cache::{CacheKey, FetchFailure, QueryCache};
use crate::services::client::CollectionClient;
use crate::services::plan::PlannedRequest;

/// Point-in-time view of the fetch state.
#[derive(Debug, Clone, Default)]
pub struct FetchSnapshot {
    pub data: Option<Arc<CollectionPage>>,
    /// Fetching with nothing to display
    pub is_loading: bool,
    /// Any fetch in flight for the active key
    pub is_fetching: bool,
    pub error: Option<Arc<AppError>>,
    /// `data` belongs to a previous key
    pub is_placeholder: bool,
}

#[derive(Default)]
struct ObserverState {
    generation: u64,
    active: Option<PlannedRequest>,
    task: Option<JoinHandle<()>>,
    displayed: Option<Arc<CollectionPage>>,
    displayed_key: Option<CacheKey>,
    error: Option<Arc<AppError>>,
    fetching: bool,
}

pub struct FetchOrchestrator {
    client: Arc<dyn CollectionClient>,
    cache: QueryCache,
    state: Arc<Mutex<ObserverState>>,
    notifier: Arc<watch::Sender<u64>>,
}

fn lock(state: &Mutex<ObserverState>) -> MutexGuard<'_, ObserverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FetchOrchestrator {
    /// `notifier` is bumped whenever a background fetch changes the state.
    pub fn new(
        client: Arc<dyn CollectionClient>,
        cache: QueryCache,
        notifier: Arc<watch::Sender<u64>>,
    ) -> Self {
        Self {
            client,
            cache,
            state: Arc::new(Mutex::new(ObserverState::default())),
            notifier,
        }
    }

    /// Make `plan` the active request.
    ///
    /// A no-op while `plan`'s key is already active. Cached data for a new
    /// key is displayed at once and only refetched once older than
    /// `stale_after`. Must be called inside a tokio runtime.
    pub fn request(&self, plan: PlannedRequest, stale_after: Duration) {
        let mut state = lock(&self.state);
        if state.active.as_ref().is_some_and(|a| a.key == plan.key) {
            return;
        }
        state.error = None;

        if let Some(cached) = self.cache.get(&plan.key) {
            state.displayed = Some(cached.page.clone());
            state.displayed_key = Some(plan.key.clone());
            if cached.is_fresh(stale_after) {
                log::debug!("Serving {} from cache", plan.key);
                if let Some(task) = state.task.take() {
                    task.abort();
                }
                state.generation += 1;
                state.fetching = false;
                state.active = Some(plan);
                return;
            }
        }

        self.spawn_fetch(&mut state, plan);
    }

    /// Refetch the active request over the network.
    pub fn refetch(&self) {
        let mut state = lock(&self.state);
        if let Some(plan) = state.active.clone() {
            state.error = None;
            self.spawn_fetch(&mut state, plan);
        }
    }

    /// Abort in-flight work and forget the active request.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.generation += 1;
        state.fetching = false;
        state.active = None;
    }

    pub fn active_key(&self) -> Option<CacheKey> {
        lock(&self.state).active.as_ref().map(|a| a.key.clone())
    }

    pub fn snapshot(&self) -> FetchSnapshot {
        let state = lock(&self.state);
        let active_key = state.active.as_ref().map(|a| &a.key);
        FetchSnapshot {
            data: state.displayed.clone(),
            is_loading: state.fetching && state.displayed.is_none(),
            is_fetching: state.fetching,
            error: state.error.clone(),
            is_placeholder: state.displayed.is_some() && state.displayed_key.as_ref() != active_key,
        }
    }

    fn spawn_fetch(&self, state: &mut ObserverState, plan: PlannedRequest) {
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.generation += 1;
        state.fetching = true;
        state.active = Some(plan.clone());

        let generation = state.generation;
        let loader = plan.loader(&self.client);
        let cache = self.cache.clone();
        let shared = Arc::clone(&self.state);
        let notifier = Arc::clone(&self.notifier);

        state.task = Some(tokio::spawn(async move {
            let result = cache.fetch(plan.key.clone(), loader).await;
            {
                let mut state = lock(&shared);
                if state.generation != generation {
                    log::debug!("Discarding superseded response for {}", plan.key);
                    return;
                }
                state.fetching = false;
                state.task = None;
                match result {
                    Ok(page) => {
                        state.displayed = Some(page);
                        state.displayed_key = Some(plan.key);
                        state.error = None;
                    }
                    Err(FetchFailure::Failed(error)) => {
                        log::warn!("Fetching {} failed: {}", plan.collection, error);
                        state.displayed = None;
                        state.displayed_key = None;
                        state.error = Some(error);
                    }
                    Err(FetchFailure::Aborted) => {
                        log::debug!("Fetch for {} was aborted", plan.key);
                    }
                }
            }
            notifier.send_modify(|v| *v += 1);
        }));
    }
}

impl Drop for FetchOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.state).task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::models::{RequestSpec, ResolvedMode};
    use crate::services::client::mock::MockClient;
    use crate::services::plan::DatasetSelection;

    fn setup(mock: MockClient) -> (Arc<MockClient>, FetchOrchestrator, watch::Receiver<u64>) {
        let mock = Arc::new(mock);
        let (tx, rx) = watch::channel(0);
        let orchestrator = FetchOrchestrator::new(mock.clone(), QueryCache::new(), Arc::new(tx));
        (mock, orchestrator, rx)
    }

    fn server_page(page_index: usize) -> PlannedRequest {
        DatasetSelection::new("courses", "courses").plan_data(
            ResolvedMode::Server,
            &RequestSpec::page(page_index, 10),
            None,
            1000,
        )
    }

    #[tokio::test]
    async fn test_first_load_flags() {
        let (_mock, orchestrator, mut rx) = setup(MockClient::new(30));
        orchestrator.request(server_page(0), Duration::ZERO);

        let snapshot = orchestrator.snapshot();
        assert!(snapshot.is_loading);
        assert!(snapshot.is_fetching);

        rx.changed().await.unwrap();
        let snapshot = orchestrator.snapshot();
        assert!(!snapshot.is_loading);
        assert!(!snapshot.is_fetching);
        assert_eq!(snapshot.data.unwrap().data.len(), 10);
    }

    #[tokio::test]
    async fn test_previous_data_stays_while_refreshing() {
        let (_mock, orchestrator, mut rx) = setup(MockClient::new(30));
        orchestrator.request(server_page(0), Duration::ZERO);
        rx.changed().await.unwrap();

        orchestrator.request(server_page(1), Duration::ZERO);
        let snapshot = orchestrator.snapshot();
        assert!(snapshot.is_fetching);
        assert!(!snapshot.is_loading);
        assert!(snapshot.is_placeholder);
        assert_eq!(snapshot.data.unwrap().data[0]["id"], 1);

        rx.changed().await.unwrap();
        let snapshot = orchestrator.snapshot();
        assert!(!snapshot.is_placeholder);
        assert_eq!(snapshot.data.unwrap().data[0]["id"], 11);
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        // page 1 on the wire answers well after page 3
        let mock = Arc::new(
            MockClient::new(30)
                .with_page_delay(1, Duration::from_millis(80))
                .with_page_delay(3, Duration::from_millis(5)),
        );
        let cache = QueryCache::new();
        let (tx, mut rx) = watch::channel(0);
        let orchestrator = FetchOrchestrator::new(mock.clone(), cache.clone(), Arc::new(tx));

        // a second consumer keeps the slow call alive past the supersession
        let first = server_page(0);
        let other = tokio::spawn({
            let cache = cache.clone();
            let loader = first.loader(&(mock.clone() as Arc<dyn CollectionClient>));
            let key = first.key.clone();
            async move { cache.fetch(key, loader).await }
        });
        while mock.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        orchestrator.request(first.clone(), Duration::ZERO);
        orchestrator.request(server_page(2), Duration::ZERO);

        rx.changed().await.unwrap();
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.data.unwrap().data[0]["id"], 21);
        assert!(!snapshot.is_placeholder);

        // the older response lands after the newer one
        let older = other.await.unwrap().unwrap();
        assert_eq!(older.data[0]["id"], 1);
        assert!(cache.get(&first.key).is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.data.unwrap().data[0]["id"], 21);
        assert!(!snapshot.is_fetching);
        assert!(!snapshot.is_placeholder);
        assert_eq!(orchestrator.active_key(), Some(server_page(2).key));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_same_key_is_not_refetched() {
        let (mock, orchestrator, mut rx) = setup(MockClient::new(30));
        orchestrator.request(server_page(0), Duration::ZERO);
        orchestrator.request(server_page(0), Duration::ZERO);
        rx.changed().await.unwrap();
        orchestrator.request(server_page(0), Duration::ZERO);
        assert_eq!(mock.call_count(), 1);

        orchestrator.refetch();
        rx.changed().await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_error_clears_displayed_data() {
        let (mock, orchestrator, mut rx) = setup(MockClient::new(30));
        orchestrator.request(server_page(0), Duration::ZERO);
        rx.changed().await.unwrap();

        mock.fail_data.store(true, Ordering::SeqCst);
        orchestrator.request(server_page(1), Duration::ZERO);
        rx.changed().await.unwrap();

        let snapshot = orchestrator.snapshot();
        assert!(snapshot.data.is_none());
        assert!(matches!(
            snapshot.error.as_deref(),
            Some(AppError::Status { status: 500, .. })
        ));
        assert!(!snapshot.is_fetching);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let (mock, orchestrator, mut rx) = setup(MockClient::new(30));
        let stale = Duration::from_secs(60);
        orchestrator.request(server_page(0), stale);
        rx.changed().await.unwrap();
        orchestrator.request(server_page(1), stale);
        rx.changed().await.unwrap();

        orchestrator.request(server_page(0), stale);
        let snapshot = orchestrator.snapshot();
        assert!(!snapshot.is_fetching);
        assert_eq!(snapshot.data.unwrap().data[0]["id"], 1);
        assert_eq!(mock.call_count(), 2);
    }
}
