// src/services/client.rs

//! Collection endpoint client.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{ClientConfig, CollectionPage};
use crate::utils::http::create_async_client;

/// Source of collection pages.
///
/// Dropping the returned future cancels the request.
#[async_trait]
pub trait CollectionClient: Send + Sync {
    /// `GET <base>/<collection>?<query>`
    async fn fetch_collection(&self, collection: &str, query: &str) -> Result<CollectionPage>;
}

/// reqwest-backed client for a REST collection endpoint.
#[derive(Clone)]
pub struct HttpCollectionClient {
    client: Client,
    base_url: String,
}

impl HttpCollectionClient {
    /// Create a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)?;
        Ok(Self::with_client(
            create_async_client(config)?,
            &config.base_url,
        ))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Full request URL for a collection query.
    pub fn endpoint(&self, collection: &str, query: &str) -> String {
        let collection = collection.trim_matches('/');
        if query.is_empty() {
            format!("{}/{}", self.base_url, collection)
        } else {
            format!("{}/{}?{}", self.base_url, collection, query)
        }
    }
}

#[async_trait]
impl CollectionClient for HttpCollectionClient {
    async fn fetch_collection(&self, collection: &str, query: &str) -> Result<CollectionPage> {
        let url = self.endpoint(collection, query);
        log::debug!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown status"),
            ));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory collection endpoint for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::models::PaginationMeta;

    /// Serves `total` generated course records and records every query.
    pub struct MockClient {
        pub total: u64,
        pub delay: Duration,
        /// Per wire page (1-based) delays overriding `delay`
        page_delays: HashMap<u64, Duration>,
        pub fail_detection: AtomicBool,
        pub fail_data: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl MockClient {
        pub fn new(total: u64) -> Self {
            Self {
                total,
                delay: Duration::ZERO,
                page_delays: HashMap::new(),
                fail_detection: AtomicBool::new(false),
                fail_data: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with_page_delay(mut self, page: u64, delay: Duration) -> Self {
            self.page_delays.insert(page, delay);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Calls that were not detection requests.
        pub fn data_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|q| !is_detection(q))
                .collect()
        }
    }

    fn param(query: &str, name: &str) -> Option<u64> {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse().ok())
    }

    pub fn is_detection(query: &str) -> bool {
        param(query, "pagination[pageSize]") == Some(1)
    }

    #[async_trait]
    impl CollectionClient for MockClient {
        async fn fetch_collection(&self, _collection: &str, query: &str) -> Result<CollectionPage> {
            self.calls.lock().unwrap().push(query.to_string());
            let page = param(query, "pagination[page]").unwrap_or(1).max(1);
            let delay = self.page_delays.get(&page).copied().unwrap_or(self.delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let detection = is_detection(query);
            if detection && self.fail_detection.load(Ordering::SeqCst) {
                return Err(AppError::status(503, "Service Unavailable"));
            }
            if !detection && self.fail_data.load(Ordering::SeqCst) {
                return Err(AppError::status(500, "Internal Server Error"));
            }

            let page_size = param(query, "pagination[pageSize]").unwrap_or(10).max(1);
            let start = (page - 1) * page_size;
            let end = (start + page_size).min(self.total);
            let data = (start..end)
                .map(|i| json!({ "id": i + 1, "title": format!("Course {:04}", i + 1) }))
                .collect();

            Ok(CollectionPage {
                data,
                meta: crate::models::ResponseMeta {
                    pagination: Some(PaginationMeta {
                        page,
                        page_size,
                        page_count: self.total.div_ceil(page_size),
                        total: self.total,
                    }),
                },
            })
        }
    }
}
