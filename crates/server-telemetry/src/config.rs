// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry configuration.
//!
//! Sources are applied in the following order (later sources override earlier):
//!
//! 1. **Defaults** - [`TelemetryConfig::default`]
//! 2. **YAML file** - the `telemetry` section of the daemon's configuration file
//! 3. **Environment variables** - `TELEMETRY_*` (highest priority)
//!
//! ```yaml
//! telemetry:
//!   enabled: true
//!   url: https://api.axiom.co
//!   api_token: xaat-...
//!   dataset: servers
//!   flush_interval: 5
//!   batch_size: 100
//! ```
//!
//! The configuration is read once at startup and never changes afterwards.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::DEFAULT_QUEUE_CAPACITY;

const CONFIG_SECTION: &str = "telemetry";
const ENV_PREFIX: &str = "TELEMETRY_";

/// Default flush interval, in seconds.
pub const DEFAULT_FLUSH_INTERVAL_SECS: i64 = 5;

/// Default number of events per batch.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Whether telemetry ingestion runs at all.
    pub enabled: bool,
    /// Base URL of the ingest API (e.g. "https://api.axiom.co").
    pub url: String,
    /// Bearer token used to authenticate with the ingest API.
    pub api_token: String,
    /// Name of the dataset events are ingested into.
    pub dataset: String,
    /// How often, in seconds, the current batch is flushed. Non-positive means default.
    pub flush_interval: i64,
    /// Maximum number of events per batch. Non-positive means default.
    pub batch_size: i64,
    /// Capacity of the shared event queue. Zero means default.
    pub queue_capacity: usize,
    /// Log level for [`crate::logger::init`]. Ignored by the pipeline itself.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_token: String::new(),
            dataset: String::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Loads defaults, then the `telemetry` section of `path` (a missing file is
    /// ignored), then `TELEMETRY_*` environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::default(CONFIG_SECTION, Self::default()))
            .merge(Yaml::file(path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| format!("{CONFIG_SECTION}.{}", key.as_str()).into()),
            )
            .extract_inner(CONFIG_SECTION)
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Checks every setting required for the pipeline to start. `log_level`
    /// is only read by [`crate::logger::init`] and is not checked here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("api_token"));
        }
        if self.dataset.trim().is_empty() {
            return Err(ConfigError::Missing("dataset"));
        }
        Ok(())
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        let secs = if self.flush_interval > 0 {
            self.flush_interval
        } else {
            DEFAULT_FLUSH_INTERVAL_SECS
        };
        Duration::from_secs(secs.unsigned_abs())
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        let size = if self.batch_size > 0 {
            self.batch_size
        } else {
            DEFAULT_BATCH_SIZE
        };
        usize::try_from(size).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            self.queue_capacity
        }
    }

    /// `{url}/v1/datasets/{dataset}/ingest`
    #[must_use]
    pub fn ingest_url(&self) -> String {
        format!(
            "{}/v1/datasets/{}/ingest",
            self.url.trim().trim_end_matches('/'),
            self.dataset.trim()
        )
    }
}
