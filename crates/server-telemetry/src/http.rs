// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tracing::error;

/// Request timeout of the shared ingest client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client shared by every delivery.
///
/// If the builder fails, logs an error and returns a default client so
/// telemetry keeps flowing without the custom settings.
#[must_use]
pub fn get_client(timeout: Duration) -> reqwest::Client {
    match build_client(timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("TELEMETRY | Unable to build HTTP client, falling back to defaults: {e}");
            reqwest::Client::new()
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}
