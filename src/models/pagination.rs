//! Pagination state, updates, and the derived extended view.

use serde::{Deserialize, Serialize};

use crate::models::{ColumnFilter, DEFAULT_PAGE_SIZE, SortEntry};

/// Requested page position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page_index: usize,
    pub page_size: usize,
}

impl PaginationState {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// A pagination change requested by the presentation layer.
pub enum PaginationUpdate {
    Replace(PaginationState),
    PageIndex(usize),
    PageSize(usize),
    With(Box<dyn FnOnce(PaginationState) -> PaginationState + Send>),
}

impl PaginationUpdate {
    pub fn with(f: impl FnOnce(PaginationState) -> PaginationState + Send + 'static) -> Self {
        PaginationUpdate::With(Box::new(f))
    }

    /// Compute the next state from the current one.
    pub fn apply(self, current: PaginationState) -> PaginationState {
        match self {
            PaginationUpdate::Replace(next) => next,
            PaginationUpdate::PageIndex(page_index) => PaginationState {
                page_index,
                ..current
            },
            PaginationUpdate::PageSize(page_size) => PaginationState {
                page_size,
                ..current
            },
            PaginationUpdate::With(f) => f(current),
        }
    }
}

impl std::fmt::Debug for PaginationUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaginationUpdate::Replace(state) => f.debug_tuple("Replace").field(state).finish(),
            PaginationUpdate::PageIndex(i) => f.debug_tuple("PageIndex").field(i).finish(),
            PaginationUpdate::PageSize(s) => f.debug_tuple("PageSize").field(s).finish(),
            PaginationUpdate::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Requested page/size combined with the last response's totals.
///
/// The two halves may disagree until the fetch for the requested page lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedPagination {
    pub page_index: usize,
    pub page_size: usize,
    pub total_items: u64,
    pub total_pages: u64,
}

/// Table state as held by a table-state owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    pub pagination: PaginationState,
    #[serde(default)]
    pub sorting: Vec<SortEntry>,
    #[serde(default)]
    pub column_filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub global_filter: Option<String>,
}

impl TableState {
    pub fn with_sort(mut self, entry: SortEntry) -> Self {
        self.sorting = vec![entry];
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationState) -> Self {
        self.pagination = pagination;
        self
    }

    /// Serialized sort/filter/search criteria, used to detect changes
    /// between renders.
    pub fn criteria_fingerprint(&self) -> String {
        serde_json::to_string(&(&self.sorting, &self.column_filters, &self.global_filter))
            .unwrap_or_default()
    }
}
