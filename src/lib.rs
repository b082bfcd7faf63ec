// src/lib.rs

//! Collection Pager Library
//!
//! Adaptive paginated fetching for REST collection endpoints: decides per
//! dataset whether to page on the server or materialize the whole
//! collection once, translates table state into the backend's query
//! dialect, and keeps cache keys and pagination state consistent.

pub mod collection;
pub mod error;
pub mod models;
pub mod query;
pub mod services;
pub mod utils;

pub use collection::{CollectionView, PagedCollection};
pub use error::{AppError, Result};
