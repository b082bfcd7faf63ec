// src/models/mod.rs

//! Domain models for the pager.
//!
//! Request and filter shapes, paging strategy, response payloads, and
//! configuration.

mod config;
mod filter;
mod mode;
mod pagination;
mod request;
mod response;

// Re-export all public types
pub use config::{ClientConfig, Config, DatasetConfig, EngineConfig};
pub use filter::{Arity, FilterClause, FilterOperator, FilterValue, Operand, Scalar, StructuredFilter};
pub use mode::{ModePreference, ResolvedMode};
pub use pagination::{ExtendedPagination, PaginationState, PaginationUpdate, TableState};
pub use request::{
    ColumnFilter, DEFAULT_PAGE_SIZE, Populate, PublicationStatus, RequestSpec, SortEntry,
};
pub use response::{CollectionPage, PaginationMeta, ResponseMeta};
