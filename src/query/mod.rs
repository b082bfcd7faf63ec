//! Query-string dialect of the collection endpoint.
//!
//! - `translate`: request → query string
//! - `clause`: emitted filter parameters → clauses

pub mod clause;
mod params;
pub mod translate;

pub use clause::{ParsedFilter, parse_filter_clauses};
pub use params::QueryParams;
pub use translate::{build, selection, window};
