//! Abstract collection request, rebuilt on every render.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::FilterValue;

/// Page size used when a request leaves it unset.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field_id: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortEntry {
    pub fn asc(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            descending: false,
        }
    }

    pub fn desc(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            descending: true,
        }
    }

    /// Wire form: `field:asc` or `field:desc`.
    pub fn to_wire(&self) -> String {
        let direction = if self.descending { "desc" } else { "asc" };
        format!("{}:{}", self.field_id, direction)
    }
}

impl FromStr for SortEntry {
    type Err = AppError;

    /// Parses `field`, `field:asc` or `field:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = s.split_once(':').unwrap_or((s, "asc"));
        if field.trim().is_empty() {
            return Err(AppError::validation(format!("empty sort field in '{s}'")));
        }
        match direction {
            "asc" => Ok(Self::asc(field.trim())),
            "desc" => Ok(Self::desc(field.trim())),
            other => Err(AppError::validation(format!(
                "unknown sort direction '{other}'"
            ))),
        }
    }
}

/// A filter on one (possibly dotted) field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub field_id: String,
    pub value: FilterValue,
}

impl ColumnFilter {
    pub fn new(field_id: impl Into<String>, value: FilterValue) -> Self {
        Self {
            field_id: field_id.into(),
            value,
        }
    }
}

/// Publication state selector. Absent means both drafts and published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Draft,
    Published,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Draft => "draft",
            PublicationStatus::Published => "published",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PublicationStatus::Draft),
            "published" => Ok(PublicationStatus::Published),
            other => Err(AppError::validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Relation population: one verbatim expression or a list of relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Populate {
    #[default]
    None,
    Single(String),
    Many(Vec<String>),
}

impl Populate {
    pub fn is_empty(&self) -> bool {
        match self {
            Populate::None => true,
            Populate::Single(s) => s.is_empty(),
            Populate::Many(items) => items.is_empty(),
        }
    }
}

/// Everything needed to build one collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub page_index: usize,
    /// Zero means unset.
    pub page_size: usize,
    /// Only the first entry is honored.
    pub sorting: Vec<SortEntry>,
    pub column_filters: Vec<ColumnFilter>,
    pub global_filter: Option<String>,
    /// Filters applied regardless of UI state.
    pub static_filters: BTreeMap<String, FilterValue>,
    pub status: Option<PublicationStatus>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sorting: Vec::new(),
            column_filters: Vec::new(),
            global_filter: None,
            static_filters: BTreeMap::new(),
            status: None,
        }
    }
}

impl RequestSpec {
    pub fn page(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, entry: SortEntry) -> Self {
        self.sorting.push(entry);
        self
    }

    pub fn with_filter(mut self, field_id: impl Into<String>, value: FilterValue) -> Self {
        self.column_filters.push(ColumnFilter::new(field_id, value));
        self
    }

    pub fn with_global_filter(mut self, text: impl Into<String>) -> Self {
        self.global_filter = Some(text.into());
        self
    }

    pub fn with_static_filter(mut self, field_id: impl Into<String>, value: FilterValue) -> Self {
        self.static_filters.insert(field_id.into(), value);
        self
    }

    pub fn with_status(mut self, status: PublicationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Page size with the unset value replaced by the default.
    pub fn effective_page_size(&self) -> usize {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    /// The honored sort entry, if any.
    pub fn primary_sort(&self) -> Option<&SortEntry> {
        self.sorting.first()
    }
}
