//! Paging strategy resolution.
//!
//! An explicit preference resolves immediately. `Auto` runs a one-item
//! detection request and compares the reported total against the
//! threshold; any failure falls back to server paging.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{ModePreference, ResolvedMode};
use crate::services::cache::{FetchFailure, QueryCache};
use crate::services::client::CollectionClient;
use crate::services::plan::PlannedRequest;

/// Default total-item threshold between client and server paging.
pub const DEFAULT_THRESHOLD: u64 = 1000;

/// Collections at or below `threshold` items are paged in memory.
pub fn resolve_from_total(total: u64, threshold: u64) -> ResolvedMode {
    if total <= threshold {
        ResolvedMode::Client
    } else {
        ResolvedMode::Server
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Undetermined,
    Detecting,
    Resolved(ResolvedMode),
}

/// Outcome of a detection request.
#[derive(Debug, Clone)]
pub struct Detection {
    pub mode: ResolvedMode,
    /// Reported total, when the response carried one
    pub total: Option<u64>,
    pub error: Option<Arc<AppError>>,
}

/// Tracks the resolved mode for one dataset.
#[derive(Debug, Clone)]
pub struct ModeResolver {
    preference: ModePreference,
    threshold: u64,
    state: Resolution,
    epoch: u64,
}

impl ModeResolver {
    pub fn new(preference: ModePreference, threshold: u64) -> Self {
        let state = match preference.explicit() {
            Some(mode) => Resolution::Resolved(mode),
            None => Resolution::Undetermined,
        };
        Self {
            preference,
            threshold,
            state,
            epoch: 0,
        }
    }

    pub fn preference(&self) -> ModePreference {
        self.preference
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn state(&self) -> Resolution {
        self.state
    }

    pub fn resolved(&self) -> Option<ResolvedMode> {
        match self.state {
            Resolution::Resolved(mode) => Some(mode),
            _ => None,
        }
    }

    /// Whether a detection request should be started.
    pub fn needs_detection(&self) -> bool {
        self.state == Resolution::Undetermined
    }

    /// Enter `Detecting`. The returned ticket must accompany the result.
    pub fn begin_detection(&mut self) -> u64 {
        self.state = Resolution::Detecting;
        self.epoch
    }

    /// Apply a detection result. Results issued under an earlier
    /// preference are ignored.
    pub fn complete_detection(&mut self, ticket: u64, detection: &Detection) -> bool {
        if ticket != self.epoch || self.preference != ModePreference::Auto {
            return false;
        }
        self.state = Resolution::Resolved(detection.mode);
        true
    }

    /// Return to `Undetermined` after an abandoned detection.
    pub fn abandon_detection(&mut self, ticket: u64) {
        if ticket == self.epoch && self.state == Resolution::Detecting {
            self.state = Resolution::Undetermined;
        }
    }

    /// Change the preference. Returns whether anything changed.
    pub fn set_preference(&mut self, preference: ModePreference) -> bool {
        if preference == self.preference {
            return false;
        }
        self.preference = preference;
        self.epoch += 1;
        self.state = match preference.explicit() {
            Some(mode) => Resolution::Resolved(mode),
            None => Resolution::Undetermined,
        };
        true
    }
}

/// Run the detection request through the cache.
///
/// Returns `None` only when the request was aborted.
pub async fn detect(
    client: &Arc<dyn CollectionClient>,
    cache: &QueryCache,
    plan: &PlannedRequest,
    threshold: u64,
    stale_after: Duration,
) -> Option<Detection> {
    let result = cache
        .fetch_fresh(plan.key.clone(), stale_after, plan.loader(client))
        .await;

    match result {
        Ok(page) => match page.total() {
            Some(total) => {
                let mode = resolve_from_total(total, threshold);
                log::info!(
                    "Resolved {} to {} paging ({} items, threshold {})",
                    plan.collection,
                    mode,
                    total,
                    threshold
                );
                Some(Detection {
                    mode,
                    total: Some(total),
                    error: None,
                })
            }
            None => {
                log::warn!(
                    "Detection for {} returned no pagination metadata; using server paging",
                    plan.collection
                );
                Some(Detection {
                    mode: ResolvedMode::Server,
                    total: None,
                    error: None,
                })
            }
        },
        Err(FetchFailure::Failed(error)) => {
            log::warn!(
                "Detection for {} failed ({}); using server paging",
                plan.collection,
                error
            );
            Some(Detection {
                mode: ResolvedMode::Server,
                total: None,
                error: Some(error),
            })
        }
        Err(FetchFailure::Aborted) => None,
    }
}
