//! Paging strategy selection types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Concrete strategy chosen for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedMode {
    /// Fetch the whole collection once, page/sort/filter in memory
    Client,
    /// Page/sort/filter through a server round-trip
    Server,
}

impl ResolvedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedMode::Client => "client",
            ResolvedMode::Server => "server",
        }
    }
}

impl fmt::Display for ResolvedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Caller's mode configuration: an explicit override or automatic detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModePreference {
    #[default]
    Auto,
    Client,
    Server,
}

impl ModePreference {
    /// The override, if this preference is explicit.
    pub fn explicit(&self) -> Option<ResolvedMode> {
        match self {
            ModePreference::Auto => None,
            ModePreference::Client => Some(ResolvedMode::Client),
            ModePreference::Server => Some(ResolvedMode::Server),
        }
    }
}

impl FromStr for ModePreference {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ModePreference::Auto),
            "client" => Ok(ModePreference::Client),
            "server" => Ok(ModePreference::Server),
            other => Err(AppError::validation(format!("unknown mode '{other}'"))),
        }
    }
}
