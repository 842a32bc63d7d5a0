use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INTERVAL_MINUTES, DEFAULT_TIMEOUT_SECS, MIN_INTERVAL_MINUTES};

const SECS_PER_MINUTE: u64 = 60;

#[derive(Debug, Clone)]
pub struct InvalidPlugin(pub String);

impl fmt::Display for InvalidPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidPlugin {}

/// Configuration of one metadata plugin (`[plugin.metadata.<namespace>]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPlugin {
    /// Command line handed as-is to the shell.
    pub command: String,
    /// Fetch cadence in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_interval: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Extra environment variables for the command.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl MetadataPlugin {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Cadence derived from `execution_interval`: 10 minutes when unset,
    /// never less than one minute, otherwise uncapped.
    #[must_use]
    pub fn interval(&self) -> Duration {
        let minutes = self.execution_interval.map_or(DEFAULT_INTERVAL_MINUTES, |m| {
            u64::try_from(m).map_or(MIN_INTERVAL_MINUTES, |m| m.max(MIN_INTERVAL_MINUTES))
        });
        Duration::from_secs(minutes.saturating_mul(SECS_PER_MINUTE))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn validate(&self) -> Result<(), InvalidPlugin> {
        if self.command.trim().is_empty() {
            return Err(InvalidPlugin("command cannot be empty".to_string()));
        }
        if self.timeout_seconds == Some(0) {
            return Err(InvalidPlugin(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(key) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(InvalidPlugin(format!(
                "invalid environment variable name: {key:?}"
            )));
        }
        Ok(())
    }
}
