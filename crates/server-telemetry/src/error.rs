// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while loading or validating the telemetry configuration.
///
/// A configuration error never fails the host: the pipeline logs one warning
/// and does not start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Telemetry is disabled")]
    Disabled,

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Failed to install log subscriber: {0}")]
    Logger(String),
}

/// A source message that could not be turned into a normalized event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {topic} payload: {source}")]
    Payload {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Terminal outcome of a batch that was not delivered.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The batch could not be serialized. Data dropped.
    #[error("failed to serialize batch: {0}")]
    Payload(#[from] serde_json::Error),

    /// The endpoint answered with a 4xx. Retrying cannot help.
    #[error("{status}: batch of {events} events rejected by ingest endpoint")]
    Rejected { status: StatusCode, events: usize },

    /// Every attempt failed with a 5xx or a transport error.
    #[error("failed to ingest batch of {events} events after {attempts} attempts")]
    Exhausted { attempts: usize, events: usize },
}

impl DeliveryError {
    /// Number of events lost with this batch.
    #[must_use]
    pub fn events(&self) -> Option<usize> {
        match self {
            Self::Payload(_) => None,
            Self::Rejected { events, .. } | Self::Exhausted { events, .. } => Some(*events),
        }
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}
