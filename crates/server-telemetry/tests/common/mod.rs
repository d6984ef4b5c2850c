// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::time::Duration;

use server_telemetry::config::TelemetryConfig;

pub const DATASET: &str = "servers";
pub const INGEST_PATH: &str = "/v1/datasets/servers/ingest";
pub const API_TOKEN: &str = "xaat-test-token";

/// An enabled configuration pointing at `url`. The timer is long enough that
/// only the batch size and shutdown trigger a flush.
pub fn config(url: &str, batch_size: i64) -> TelemetryConfig {
    TelemetryConfig {
        enabled: true,
        url: url.to_string(),
        api_token: API_TOKEN.to_string(),
        dataset: DATASET.to_string(),
        flush_interval: 3600,
        batch_size,
        ..Default::default()
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
