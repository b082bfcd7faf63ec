//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{FilterValue, ModePreference, Populate, PublicationStatus};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collection endpoint connection settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Paging engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Named datasets backed by collections
    #[serde(default = "defaults::datasets")]
    pub datasets: Vec<DatasetConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Look up a dataset by name.
    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| AppError::unknown_dataset(name))
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.client.base_url).map_err(|e| {
            AppError::validation(format!(
                "client.base_url '{}' is not a valid URL: {e}",
                self.client.base_url
            ))
        })?;
        if self.client.user_agent.trim().is_empty() {
            return Err(AppError::validation("client.user_agent is empty"));
        }
        if self.client.timeout_secs == Some(0) {
            return Err(AppError::validation("client.timeout_secs must be > 0"));
        }
        if self.engine.threshold == 0 {
            return Err(AppError::validation("engine.threshold must be > 0"));
        }
        if self.engine.default_page_size == 0 {
            return Err(AppError::validation(
                "engine.default_page_size must be > 0",
            ));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(AppError::validation("dataset with empty name"));
            }
            if dataset.collection.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "dataset '{}' has no collection",
                    dataset.name
                )));
            }
            if dataset.threshold == Some(0) {
                return Err(AppError::validation(format!(
                    "dataset '{}' threshold must be > 0",
                    dataset.name
                )));
            }
            if !seen.insert(dataset.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate dataset '{}'",
                    dataset.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            engine: EngineConfig::default(),
            datasets: defaults::datasets(),
        }
    }
}

/// HTTP client settings for the collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL collections are appended to
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Optional request timeout; requests are otherwise bounded only by
    /// cancellation
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: None,
            api_token: None,
        }
    }
}

/// Paging engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Collections at or below this size are paged in memory
    #[serde(default = "defaults::threshold")]
    pub threshold: u64,

    /// How long a detection result stays fresh
    #[serde(default = "defaults::detection_stale")]
    pub detection_stale_secs: u64,

    /// How long a data page stays fresh
    #[serde(default)]
    pub data_stale_secs: u64,

    /// Initial page size for standalone lists
    #[serde(default = "defaults::page_size")]
    pub default_page_size: usize,
}

impl EngineConfig {
    pub fn detection_stale(&self) -> Duration {
        Duration::from_secs(self.detection_stale_secs)
    }

    pub fn data_stale(&self) -> Duration {
        Duration::from_secs(self.data_stale_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::threshold(),
            detection_stale_secs: defaults::detection_stale(),
            data_stale_secs: 0,
            default_page_size: defaults::page_size(),
        }
    }
}

/// A dataset: one collection with a fixed selection and static filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset identity, also the cache invalidation prefix
    pub name: String,

    /// Collection path segment under the base URL
    pub collection: String,

    /// Selected fields; also the fields searched by the global filter
    #[serde(default)]
    pub fields: Vec<String>,

    /// Relations to populate
    #[serde(default)]
    pub populate: Populate,

    /// Paging strategy override
    #[serde(default)]
    pub mode: ModePreference,

    /// Per-dataset detection threshold
    #[serde(default)]
    pub threshold: Option<u64>,

    /// Filters always in effect
    #[serde(default)]
    pub static_filters: BTreeMap<String, FilterValue>,

    /// Publication state; absent fetches drafts and published records
    #[serde(default)]
    pub status: Option<PublicationStatus>,
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            fields: Vec::new(),
            populate: Populate::None,
            mode: ModePreference::Auto,
            threshold: None,
            static_filters: BTreeMap::new(),
            status: None,
        }
    }
}

mod defaults {
    use super::DatasetConfig;
    use crate::models::{Populate, PublicationStatus};

    // Client defaults
    pub fn base_url() -> String {
        "http://localhost:1337/api".into()
    }
    pub fn user_agent() -> String {
        "collection-pager/0.1".into()
    }

    // Engine defaults
    pub fn threshold() -> u64 {
        1000
    }
    pub fn detection_stale() -> u64 {
        300
    }
    pub fn page_size() -> usize {
        10
    }

    // Dataset defaults
    pub fn datasets() -> Vec<DatasetConfig> {
        vec![
            DatasetConfig {
                fields: vec!["title".into(), "description".into(), "difficulty".into()],
                populate: Populate::Many(vec!["category".into()]),
                status: Some(PublicationStatus::Published),
                ..DatasetConfig::new("courses", "courses")
            },
            DatasetConfig {
                fields: vec!["name".into(), "slug".into()],
                ..DatasetConfig::new("categories", "categories")
            },
            DatasetConfig {
                fields: vec!["title".into(), "position".into()],
                populate: Populate::Many(vec!["course".into()]),
                ..DatasetConfig::new("sections", "sections")
            },
        ]
    }
}
