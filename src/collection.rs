// src/collection.rs

//! Paged collection: the read/write contract consumed by list, grid and
//! table views.
//!
//! A [`PagedCollection`] is driven by a render loop. Each
//! [`render`](PagedCollection::render) takes the current table state,
//! reconciles pagination, resolves the paging mode, makes the matching
//! request active and returns a [`CollectionView`]. Background work
//! (detection, fetches) signals completion through
//! [`changed`](PagedCollection::changed), after which the caller renders
//! again:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use collection_pager::collection::{CollectionOptions, PagedCollection};
//! # use collection_pager::models::{ClientConfig, TableState};
//! # use collection_pager::services::{
//! #     DatasetSelection, HttpCollectionClient, PaginationContext, QueryCache,
//! # };
//! # async fn run() -> collection_pager::Result<()> {
//! let client = Arc::new(HttpCollectionClient::new(&ClientConfig::default())?);
//! let options = CollectionOptions::new(DatasetSelection::new("courses", "courses"));
//! let mut courses = PagedCollection::new(
//!     client,
//!     QueryCache::new(),
//!     options,
//!     PaginationContext::default(),
//! );
//!
//! let table = TableState::default();
//! loop {
//!     let view = courses.render(&table);
//!     if !view.is_fetching {
//!         break;
//!     }
//!     courses.changed().await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Rendering spawns tasks and must happen inside a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{
    CollectionPage, DEFAULT_PAGE_SIZE, DatasetConfig, EngineConfig, ExtendedPagination,
    ModePreference, PaginationState, PaginationUpdate, RequestSpec, ResolvedMode, TableState,
};
use crate::services::{
    CollectionClient, DEFAULT_THRESHOLD, DatasetSelection, Detection, FetchOrchestrator,
    LocalPage, ModeResolver, PaginationContext, QueryCache, StateReconciler, detect,
    resolve_from_total,
};

/// Per-collection settings.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub selection: DatasetSelection,
    pub mode: ModePreference,
    pub threshold: u64,
    pub detection_stale: Duration,
    pub data_stale: Duration,
}

impl CollectionOptions {
    pub fn new(selection: DatasetSelection) -> Self {
        let engine = EngineConfig::default();
        Self {
            selection,
            mode: ModePreference::Auto,
            threshold: DEFAULT_THRESHOLD,
            detection_stale: engine.detection_stale(),
            data_stale: engine.data_stale(),
        }
    }

    /// Options for a configured dataset.
    pub fn from_config(engine: &EngineConfig, dataset: &DatasetConfig) -> Self {
        let selection = DatasetSelection {
            fields: dataset.fields.clone(),
            populate: dataset.populate.clone(),
            static_filters: dataset.static_filters.clone(),
            status: dataset.status,
            ..DatasetSelection::new(&dataset.name, &dataset.collection)
        };
        Self {
            selection,
            mode: dataset.mode,
            threshold: dataset.threshold.unwrap_or(engine.threshold),
            detection_stale: engine.detection_stale(),
            data_stale: engine.data_stale(),
        }
    }

    pub fn with_mode(mut self, mode: ModePreference) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }
}

struct ModeCell {
    resolver: ModeResolver,
    known_total: Option<u64>,
    detection_error: Option<Arc<AppError>>,
}

fn lock(cell: &Mutex<ModeCell>) -> MutexGuard<'_, ModeCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a view renders.
#[derive(Debug, Clone)]
pub struct CollectionView {
    /// Last response; in client mode the whole collection
    pub page: Option<Arc<CollectionPage>>,
    pub is_loading: bool,
    pub is_fetching: bool,
    /// `page` is kept from a previous request while the current one loads
    pub is_placeholder: bool,
    /// Main request failure
    pub error: Option<Arc<AppError>>,
    /// Detection failure; never user-facing on its own
    pub detection_error: Option<Arc<AppError>>,
    pub extended_pagination: ExtendedPagination,
    pub resolved_mode: Option<ResolvedMode>,
    /// The UI request this view was rendered for
    pub request: RequestSpec,
    /// Client mode: the record set filtered and sliced for `request`
    local: Option<LocalPage>,
}

impl CollectionView {
    /// Raw records of the last response.
    pub fn data(&self) -> &[Value] {
        match &self.page {
            Some(page) => &page.data,
            None => &[],
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.page.as_ref().map_or(Ok(Vec::new()), |p| p.decode())
    }

    /// The locally paged record set, in client mode once data is present.
    pub fn local_page(&self) -> Option<&LocalPage> {
        self.local.as_ref()
    }

    /// Records to show for the current page.
    ///
    /// In client mode the full record set is filtered, searched, sorted and
    /// sliced locally.
    pub fn visible_rows(&self) -> Vec<Value> {
        match &self.local {
            Some(local) => local.rows.clone(),
            None => self.data().to_vec(),
        }
    }
}

/// Adaptive paged access to one dataset.
pub struct PagedCollection {
    options: CollectionOptions,
    client: Arc<dyn CollectionClient>,
    cache: QueryCache,
    mode: Arc<Mutex<ModeCell>>,
    reconciler: StateReconciler,
    orchestrator: FetchOrchestrator,
    notifier: Arc<watch::Sender<u64>>,
    changes: watch::Receiver<u64>,
    detection_task: Option<JoinHandle<()>>,
}

impl PagedCollection {
    pub fn new(
        client: Arc<dyn CollectionClient>,
        cache: QueryCache,
        options: CollectionOptions,
        context: PaginationContext,
    ) -> Self {
        let (tx, changes) = watch::channel(0);
        let notifier = Arc::new(tx);
        let orchestrator =
            FetchOrchestrator::new(Arc::clone(&client), cache.clone(), Arc::clone(&notifier));
        let mode = ModeCell {
            resolver: ModeResolver::new(options.mode, options.threshold),
            known_total: None,
            detection_error: None,
        };
        Self {
            options,
            client,
            cache,
            mode: Arc::new(Mutex::new(mode)),
            reconciler: StateReconciler::new(context),
            orchestrator,
            notifier,
            changes,
            detection_task: None,
        }
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    pub fn resolved_mode(&self) -> Option<ResolvedMode> {
        lock(&self.mode).resolver.resolved()
    }

    /// Standalone pagination, if this collection owns it.
    pub fn pagination(&self) -> Option<PaginationState> {
        match self.reconciler.context() {
            PaginationContext::Standalone(state) => Some(state),
            PaginationContext::Integrated => None,
        }
    }

    /// Produce the view for `table` and start whatever work it needs.
    pub fn render(&mut self, table: &TableState) -> CollectionView {
        self.changes.borrow_and_update();

        let pagination = self.reconciler.reconcile(table);
        let request = self.options.selection.request_for(table, pagination);
        self.ensure_mode();

        let (resolved, known_total, detection_error) = {
            let cell = lock(&self.mode);
            (
                cell.resolver.resolved(),
                cell.known_total,
                cell.detection_error.clone(),
            )
        };

        if let Some(mode) = resolved {
            let known_total = known_total.or_else(|| self.cached_total());
            let plan =
                self.options
                    .selection
                    .plan_data(mode, &request, known_total, self.options.threshold);
            self.orchestrator.request(plan, self.options.data_stale);
        }

        let snapshot = self.orchestrator.snapshot();
        let detecting = resolved.is_none();
        let local = match (resolved, snapshot.data.as_deref()) {
            (Some(ResolvedMode::Client), Some(page)) => Some(LocalPage::from_records(
                &page.data,
                &request,
                &self.options.selection.fields,
            )),
            _ => None,
        };
        let extended_pagination =
            extended_pagination(snapshot.data.as_deref(), local.as_ref(), pagination);

        CollectionView {
            is_loading: snapshot.is_loading || (detecting && snapshot.data.is_none()),
            is_fetching: snapshot.is_fetching || detecting,
            is_placeholder: snapshot.is_placeholder,
            page: snapshot.data,
            error: snapshot.error,
            detection_error,
            extended_pagination,
            resolved_mode: resolved,
            request,
            local,
        }
    }

    /// Apply a pagination update. Integrated collections ignore it.
    pub fn set_pagination(&mut self, update: PaginationUpdate) -> bool {
        let changed = self.reconciler.set_pagination(update);
        if changed {
            self.notify();
        }
        changed
    }

    /// Change the mode preference, abandoning any running detection.
    pub fn set_mode(&mut self, preference: ModePreference) {
        let changed = {
            let mut cell = lock(&self.mode);
            let changed = cell.resolver.set_preference(preference);
            if changed {
                cell.detection_error = None;
            }
            changed
        };
        if changed {
            if let Some(task) = self.detection_task.take() {
                task.abort();
            }
            log::info!(
                "Mode preference for {} set to {:?}",
                self.options.selection.dataset,
                preference
            );
            self.notify();
        }
    }

    /// Refetch the active request.
    pub fn refetch(&self) {
        self.orchestrator.refetch();
    }

    /// Mark every cached response of this dataset stale and refetch.
    pub fn invalidate(&self) -> usize {
        let count = self.cache.invalidate_dataset(&self.options.selection.dataset);
        self.orchestrator.refetch();
        count
    }

    /// Wait until background work or a setter asks for a new render.
    pub async fn changed(&mut self) {
        // The sender lives as long as `self`, so this cannot fail.
        let _ = self.changes.changed().await;
    }

    /// Render until no work is pending.
    pub async fn settle(&mut self, table: &TableState) -> CollectionView {
        loop {
            let view = self.render(table);
            if !view.is_fetching {
                return view;
            }
            self.changed().await;
        }
    }

    fn notify(&self) {
        self.notifier.send_modify(|v| *v += 1);
    }

    /// Total from a cached detection response.
    fn cached_total(&self) -> Option<u64> {
        let key = self.options.selection.plan_detection().key;
        self.cache.get(&key).and_then(|c| c.page.total())
    }

    /// Start detection if the mode is still undetermined.
    fn ensure_mode(&mut self) {
        let plan = self.options.selection.plan_detection();
        let threshold = self.options.threshold;
        let ticket = {
            let mut cell = lock(&self.mode);
            if !cell.resolver.needs_detection() {
                return;
            }
            let ticket = cell.resolver.begin_detection();

            let fresh_total = self
                .cache
                .get(&plan.key)
                .filter(|c| c.is_fresh(self.options.detection_stale))
                .and_then(|c| c.page.total());
            if let Some(total) = fresh_total {
                let detection = Detection {
                    mode: resolve_from_total(total, threshold),
                    total: Some(total),
                    error: None,
                };
                cell.resolver.complete_detection(ticket, &detection);
                cell.known_total = Some(total);
                log::debug!("Mode for {} resolved from cached detection", plan.key);
                return;
            }
            ticket
        };

        let client = Arc::clone(&self.client);
        let cache = self.cache.clone();
        let stale = self.options.detection_stale;
        let shared = Arc::clone(&self.mode);
        let notifier = Arc::clone(&self.notifier);

        self.detection_task = Some(tokio::spawn(async move {
            let detection = detect(&client, &cache, &plan, threshold, stale).await;
            {
                let mut cell = lock(&shared);
                match detection {
                    Some(detection) => {
                        if cell.resolver.complete_detection(ticket, &detection) {
                            cell.known_total = detection.total;
                            cell.detection_error = detection.error;
                        }
                    }
                    None => cell.resolver.abandon_detection(ticket),
                }
            }
            notifier.send_modify(|v| *v += 1);
        }));
    }
}

impl Drop for PagedCollection {
    fn drop(&mut self) {
        if let Some(task) = self.detection_task.take() {
            task.abort();
        }
        self.orchestrator.cancel();
    }
}

/// Requested page combined with the displayed response's totals.
///
/// Client mode counts what survives local filtering, not the server total.
fn extended_pagination(
    page: Option<&CollectionPage>,
    local: Option<&LocalPage>,
    pagination: PaginationState,
) -> ExtendedPagination {
    let page_size = if pagination.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        pagination.page_size
    };
    let (total_items, total_pages) = match (local, page) {
        (Some(local), _) => (local.total_items, local.total_pages),
        (None, Some(page)) => match page.meta.pagination {
            Some(meta) => (meta.total, meta.page_count),
            None => {
                let total = page.data.len() as u64;
                (total, total.div_ceil(page_size as u64))
            }
        },
        (None, None) => (0, 0),
    };
    ExtendedPagination {
        page_index: pagination.page_index,
        page_size,
        total_items,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::models::{ColumnFilter, FilterValue, PublicationStatus, SortEntry};
    use crate::services::mock::{MockClient, is_detection};

    fn courses() -> CollectionOptions {
        CollectionOptions::new(DatasetSelection {
            fields: vec!["title".into()],
            ..DatasetSelection::new("courses", "courses")
        })
    }

    fn standalone(mock: &Arc<MockClient>, options: CollectionOptions) -> PagedCollection {
        PagedCollection::new(
            mock.clone(),
            QueryCache::new(),
            options,
            PaginationContext::default(),
        )
    }

    #[tokio::test]
    async fn test_small_collection_pages_in_memory() {
        let mock = Arc::new(MockClient::new(5));
        let mut collection = standalone(&mock, courses());

        let first = collection.render(&TableState::default());
        assert!(first.is_loading);
        assert_eq!(first.resolved_mode, None);

        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Client));
        assert_eq!(view.data().len(), 5);
        let data_calls = mock.data_calls();
        assert_eq!(data_calls.len(), 1);
        assert!(data_calls[0].contains("pagination[pageSize]=5"));

        // sorting happens locally
        let sorted = TableState::default().with_sort(SortEntry::desc("title"));
        let view = collection.settle(&sorted).await;
        assert_eq!(mock.data_calls().len(), 1);
        assert_eq!(view.visible_rows()[0]["title"], "Course 0005");
    }

    #[tokio::test]
    async fn test_large_collection_pages_on_server() {
        let mock = Arc::new(MockClient::new(5000));
        let mut collection = standalone(&mock, courses());

        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Server));
        assert_eq!(view.extended_pagination.total_items, 5000);
        assert_eq!(view.extended_pagination.total_pages, 500);
        assert_eq!(mock.data_calls().len(), 1);

        let sorted = TableState::default().with_sort(SortEntry::asc("title"));
        collection.settle(&sorted).await;
        let data_calls = mock.data_calls();
        assert_eq!(data_calls.len(), 2);
        assert!(data_calls[1].contains("sort=title:asc"));
    }

    #[tokio::test]
    async fn test_detection_failure_proceeds_on_server() {
        let mock = Arc::new(MockClient::new(5));
        mock.fail_detection.store(true, Ordering::SeqCst);
        let mut collection = standalone(&mock, courses());

        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Server));
        assert!(view.error.is_none());
        assert!(view.detection_error.is_some());
        assert_eq!(view.data().len(), 5);
    }

    #[tokio::test]
    async fn test_main_failure_surfaces_error() {
        let mock = Arc::new(MockClient::new(5000));
        mock.fail_data.store(true, Ordering::SeqCst);
        let mut collection = standalone(&mock, courses());

        let view = collection.settle(&TableState::default()).await;
        assert!(view.error.is_some());
        assert!(view.data().is_empty());
        assert!(!view.is_loading);
    }

    #[tokio::test]
    async fn test_explicit_mode_skips_detection() {
        let mock = Arc::new(MockClient::new(5000));
        let mut collection = standalone(&mock, courses().with_mode(ModePreference::Server));

        let first = collection.render(&TableState::default());
        assert_eq!(first.resolved_mode, Some(ResolvedMode::Server));
        collection.settle(&TableState::default()).await;
        assert!(mock.calls().iter().all(|q| !is_detection(q)));

        collection.set_mode(ModePreference::Client);
        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Client));
        assert!(mock.data_calls()[1].contains("pagination[pageSize]=1000"));
    }

    #[tokio::test]
    async fn test_page_size_change_returns_to_first_page() {
        let mock = Arc::new(MockClient::new(5000));
        let mut collection = standalone(&mock, courses());
        collection.set_pagination(PaginationUpdate::Replace(PaginationState::new(3, 10)));
        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.extended_pagination.page_index, 3);
        assert_eq!(view.data()[0]["id"], 31);

        assert!(collection.set_pagination(PaginationUpdate::PageSize(25)));
        let view = collection.settle(&TableState::default()).await;
        assert_eq!(view.extended_pagination.page_index, 0);
        assert_eq!(view.extended_pagination.page_size, 25);
        assert_eq!(view.extended_pagination.total_pages, 200);
    }

    #[tokio::test]
    async fn test_client_mode_pagination_counts_filtered_rows() {
        let mock = Arc::new(MockClient::new(5));
        let mut collection = PagedCollection::new(
            mock.clone(),
            QueryCache::new(),
            courses(),
            PaginationContext::Integrated,
        );
        let table = TableState::default().with_pagination(PaginationState::new(0, 2));
        let view = collection.settle(&table).await;
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Client));
        assert_eq!(view.extended_pagination.total_items, 5);
        assert_eq!(view.extended_pagination.total_pages, 3);

        let mut filtered = table.clone();
        filtered
            .column_filters
            .push(ColumnFilter::new("title", FilterValue::text("0003")));
        let view = collection.settle(&filtered).await;
        assert_eq!(view.extended_pagination.total_items, 1);
        assert_eq!(view.extended_pagination.total_pages, 1);
        let rows = view.visible_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Course 0003");
        assert_eq!(view.local_page().map(|p| p.total_items), Some(1));

        // the page the owner would otherwise offer next is past the end
        let second = filtered.with_pagination(PaginationState::new(1, 2));
        let view = collection.settle(&second).await;
        assert!(view.visible_rows().is_empty());
        assert_eq!(view.extended_pagination.total_pages, 1);
        assert_eq!(mock.data_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_integrated_context_follows_owner() {
        let mock = Arc::new(MockClient::new(5000));
        let mut collection = PagedCollection::new(
            mock.clone(),
            QueryCache::new(),
            courses(),
            PaginationContext::Integrated,
        );
        let table = TableState::default().with_pagination(PaginationState::new(2, 5));
        assert!(!collection.set_pagination(PaginationUpdate::PageIndex(0)));

        let view = collection.settle(&table).await;
        assert_eq!(view.data()[0]["id"], 11);
        assert!(mock.data_calls()[0].starts_with("pagination[page]=3&pagination[pageSize]=5"));
    }

    #[tokio::test]
    async fn test_collections_sharing_a_cache_coalesce() {
        let mock = Arc::new(MockClient::new(5000).with_delay(Duration::from_millis(20)));
        let cache = QueryCache::new();
        let mut a = PagedCollection::new(
            mock.clone(),
            cache.clone(),
            courses(),
            PaginationContext::default(),
        );
        let mut b = PagedCollection::new(
            mock.clone(),
            cache.clone(),
            courses(),
            PaginationContext::default(),
        );

        let table = TableState::default();
        let (view_a, view_b) = tokio::join!(a.settle(&table), b.settle(&table));
        assert_eq!(view_a.data(), view_b.data());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cached_detection_resolves_immediately() {
        let mock = Arc::new(MockClient::new(5000));
        let cache = QueryCache::new();
        let mut first =
            PagedCollection::new(mock.clone(), cache.clone(), courses(), PaginationContext::default());
        first.settle(&TableState::default()).await;

        let mut second =
            PagedCollection::new(mock.clone(), cache, courses(), PaginationContext::default());
        let view = second.render(&TableState::default());
        assert_eq!(view.resolved_mode, Some(ResolvedMode::Server));
        assert_eq!(mock.calls().iter().filter(|q| is_detection(q)).count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let mock = Arc::new(MockClient::new(5));
        let mut collection = standalone(&mock, courses());
        collection.settle(&TableState::default()).await;
        assert!(collection.invalidate() >= 1);
        collection.settle(&TableState::default()).await;
        assert_eq!(mock.data_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_status_and_filters_reach_the_wire() {
        let mock = Arc::new(MockClient::new(5000));
        let options = CollectionOptions::new(DatasetSelection {
            status: Some(PublicationStatus::Draft),
            ..DatasetSelection::new("courses", "courses")
        });
        let mut collection = standalone(&mock, options);
        let mut table = TableState::default();
        table
            .column_filters
            .push(ColumnFilter::new("difficulty", FilterValue::one_of(["1", "2"])));

        collection.settle(&table).await;
        let data_calls = mock.data_calls();
        let query = &data_calls[0];
        assert!(query.contains("filters[difficulty][$in][0]=1&filters[difficulty][$in][1]=2"));
        assert!(query.ends_with("status=draft"));

        let mock = Arc::new(MockClient::new(5000));
        let mut collection = standalone(&mock, courses());
        collection.settle(&TableState::default()).await;
        assert!(mock.calls().iter().all(|q| !q.contains("status")));
    }

    #[test]
    fn test_options_from_config() {
        let engine = EngineConfig::default();
        let dataset = DatasetConfig {
            threshold: Some(50),
            mode: ModePreference::Client,
            ..DatasetConfig::new("courses", "courses")
        };
        let options = CollectionOptions::from_config(&engine, &dataset);
        assert_eq!(options.threshold, 50);
        assert_eq!(options.mode, ModePreference::Client);
        assert_eq!(options.detection_stale, Duration::from_secs(300));
    }
}
