//! Service layer for the pager.
//!
//! This module contains the moving parts behind a paged collection:
//! - Request planning and cache keys (`DatasetSelection`, `QueryCache`)
//! - Collection endpoint access (`CollectionClient`)
//! - Mode resolution (`ModeResolver`, `detect`)
//! - Main data fetching (`FetchOrchestrator`)
//! - Pagination ownership (`StateReconciler`)
//! - In-memory paging for client mode (`LocalPage`)

mod cache;
mod client;
mod local;
mod orchestrator;
mod plan;
mod reconciler;
mod resolver;

pub use cache::{CacheKey, CachedPage, FetchFailure, FetchResult, KeyScope, QueryCache};
pub use client::{CollectionClient, HttpCollectionClient};
pub use local::LocalPage;
pub use orchestrator::{FetchOrchestrator, FetchSnapshot};
pub use plan::{DatasetSelection, PlannedRequest};
pub use reconciler::{PaginationContext, StateReconciler};
pub use resolver::{
    DEFAULT_THRESHOLD, Detection, ModeResolver, Resolution, detect, resolve_from_total,
};

#[cfg(test)]
pub(crate) use client::mock;
