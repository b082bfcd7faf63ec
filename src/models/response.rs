//! Collection endpoint response payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One page of records as returned by `GET <base>/<collection>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub data: Vec<Value>,

    #[serde(default)]
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

/// Server-reported pagination totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub page_size: u64,
    pub page_count: u64,
    pub total: u64,
}

impl CollectionPage {
    /// Total item count reported by the server.
    pub fn total(&self) -> Option<u64> {
        self.meta.pagination.map(|p| p.total)
    }

    /// Decode the records into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.data
            .iter()
            .map(|record| Ok(serde_json::from_value(record.clone())?))
            .collect()
    }
}
