//! Request planning: which query to send and which cache key it lives under.
//!
//! Keys are derived from the translated query itself, so requests that
//! translate identically (a blank search, sort entries past the first, a
//! dropped malformed filter) share a key.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;
use crate::models::{
    CollectionPage, FilterValue, PaginationState, Populate, PublicationStatus, RequestSpec,
    ResolvedMode, TableState,
};
use crate::query;
use crate::services::cache::CacheKey;
use crate::services::client::CollectionClient;

/// A dataset: collection plus the selection that defines its records.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSelection {
    /// Dataset identity, the invalidation prefix of every key
    pub dataset: String,
    pub collection: String,
    pub fields: Vec<String>,
    pub populate: Populate,
    pub static_filters: BTreeMap<String, FilterValue>,
    pub status: Option<PublicationStatus>,
}

/// A query ready to send, with its cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub key: CacheKey,
    pub collection: String,
    pub query: String,
}

impl PlannedRequest {
    /// Deferred network call for this request, as the cache expects it.
    pub fn loader(
        &self,
        client: &Arc<dyn CollectionClient>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<CollectionPage>> + Send + 'static + use<> {
        let client = Arc::clone(client);
        let collection = self.collection.clone();
        let query = self.query.clone();
        move || async move { client.fetch_collection(&collection, &query).await }.boxed()
    }
}

impl DatasetSelection {
    pub fn new(dataset: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            collection: collection.into(),
            fields: Vec::new(),
            populate: Populate::None,
            static_filters: BTreeMap::new(),
            status: None,
        }
    }

    /// A request carrying only the always-on parts of this dataset.
    fn base_spec(&self, page_index: usize, page_size: usize) -> RequestSpec {
        RequestSpec {
            static_filters: self.static_filters.clone(),
            status: self.status,
            ..RequestSpec::page(page_index, page_size)
        }
    }

    /// The UI-facing request for a table state and effective pagination.
    pub fn request_for(&self, table: &TableState, pagination: PaginationState) -> RequestSpec {
        RequestSpec {
            sorting: table.sorting.clone(),
            column_filters: table.column_filters.clone(),
            global_filter: table.global_filter.clone(),
            ..self.base_spec(pagination.page_index, pagination.page_size)
        }
    }

    fn selection_key(&self) -> String {
        query::selection(&self.base_spec(0, 1), &self.fields, &self.populate)
    }

    /// One-item detection request for the collection's total size.
    ///
    /// Search text, column filters and sort are left out: detection measures
    /// the dataset, not the current view of it.
    pub fn plan_detection(&self) -> PlannedRequest {
        let spec = self.base_spec(0, 1);
        PlannedRequest {
            key: CacheKey::detection(&self.dataset, self.selection_key()),
            collection: self.collection.clone(),
            query: query::build(&spec, &self.fields, &Populate::None),
        }
    }

    /// Main data request for a resolved mode.
    ///
    /// Client mode asks for everything in one page (sized by the last known
    /// total, else `threshold`) and is keyed without the UI window. Server
    /// mode sends and keys the full window.
    pub fn plan_data(
        &self,
        mode: ResolvedMode,
        request: &RequestSpec,
        known_total: Option<u64>,
        threshold: u64,
    ) -> PlannedRequest {
        match mode {
            ResolvedMode::Client => {
                let size = known_total.filter(|t| *t > 0).unwrap_or(threshold);
                let size = usize::try_from(size).unwrap_or(usize::MAX);
                let spec = self.base_spec(0, size);
                PlannedRequest {
                    key: CacheKey::data(&self.dataset, mode, self.selection_key(), None),
                    collection: self.collection.clone(),
                    query: query::build(&spec, &self.fields, &self.populate),
                }
            }
            ResolvedMode::Server => {
                let spec = RequestSpec {
                    static_filters: self.static_filters.clone(),
                    status: self.status,
                    ..request.clone()
                };
                PlannedRequest {
                    key: CacheKey::data(
                        &self.dataset,
                        mode,
                        self.selection_key(),
                        Some(query::window(&spec, &self.fields)),
                    ),
                    collection: self.collection.clone(),
                    query: query::build(&spec, &self.fields, &self.populate),
                }
            }
        }
    }
}
