// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The normalized event shape shipped to the ingest API.
//!
//! Every event carries `_time`, `event_type` and `server_id`. The remaining
//! fields belong to a single event type and are left out of the JSON when
//! they hold their default value, so a status event never reports a zero
//! memory reading.

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Periodic resource usage sample.
    Stats,
    /// Server lifecycle state transition.
    Status,
    /// One chunk of raw console output.
    ConsoleOutput,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::Status => "status",
            Self::ConsoleOutput => "console_output",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource usage reported by a server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatsPayload {
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
    pub cpu_absolute: f64,
    pub network: NetworkStats,
    pub uptime: i64,
    pub disk_bytes: i64,
    pub state: Option<StateLabel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StateLabel {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    #[serde(rename = "_time")]
    pub time: String,
    pub event_type: EventType,
    pub server_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub line: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub memory_bytes: u64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub memory_limit_bytes: u64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub cpu_absolute: f64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub network_rx_bytes: u64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub network_tx_bytes: u64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub uptime: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub disk_bytes: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

/// Formats `at` as RFC3339 in UTC with nanosecond precision.
#[must_use]
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn now() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

impl NormalizedEvent {
    fn empty(event_type: EventType, server_id: &str) -> Self {
        Self {
            time: now(),
            event_type,
            server_id: server_id.to_string(),
            status: String::new(),
            line: String::new(),
            memory_bytes: 0,
            memory_limit_bytes: 0,
            cpu_absolute: 0.0,
            network_rx_bytes: 0,
            network_tx_bytes: 0,
            uptime: 0,
            disk_bytes: 0,
            state: String::new(),
        }
    }

    #[must_use]
    pub fn stats(server_id: &str, stats: &StatsPayload) -> Self {
        Self {
            memory_bytes: stats.memory_bytes,
            memory_limit_bytes: stats.memory_limit_bytes,
            cpu_absolute: stats.cpu_absolute,
            network_rx_bytes: stats.network.rx_bytes,
            network_tx_bytes: stats.network.tx_bytes,
            uptime: stats.uptime,
            disk_bytes: stats.disk_bytes,
            state: stats
                .state
                .as_ref()
                .map(|state| state.value.clone())
                .unwrap_or_default(),
            ..Self::empty(EventType::Stats, server_id)
        }
    }

    #[must_use]
    pub fn status(server_id: &str, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::empty(EventType::Status, server_id)
        }
    }

    #[must_use]
    pub fn console_output(server_id: &str, line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Self::empty(EventType::ConsoleOutput, server_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use time::macros::datetime;

    fn keys(event: &NormalizedEvent) -> Vec<String> {
        let Value::Object(map) = serde_json::to_value(event).expect("serialize failed") else {
            panic!("event must serialize to an object");
        };
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_stats_event_serializes_only_stats_fields() {
        let payload = StatsPayload {
            memory_bytes: 100,
            memory_limit_bytes: 200,
            cpu_absolute: 0.5,
            network: NetworkStats {
                rx_bytes: 10,
                tx_bytes: 20,
            },
            uptime: 5,
            disk_bytes: 1000,
            state: None,
        };
        let event = NormalizedEvent::stats("srv-1", &payload);

        assert_eq!(
            keys(&event),
            vec![
                "_time",
                "cpu_absolute",
                "disk_bytes",
                "event_type",
                "memory_bytes",
                "memory_limit_bytes",
                "network_rx_bytes",
                "network_tx_bytes",
                "server_id",
                "uptime",
            ]
        );

        let value = serde_json::to_value(&event).expect("serialize failed");
        assert_eq!(value["event_type"], "stats");
        assert_eq!(value["server_id"], "srv-1");
        assert_eq!(value["memory_bytes"], 100);
        assert_eq!(value["cpu_absolute"], 0.5);
        assert!(value.get("status").is_none());
        assert!(value.get("line").is_none());
    }

    #[test]
    fn test_stats_event_with_state_label() {
        let payload = StatsPayload {
            memory_bytes: 1,
            state: Some(StateLabel {
                value: "running".to_string(),
            }),
            ..Default::default()
        };
        let event = NormalizedEvent::stats("srv-1", &payload);
        let value = serde_json::to_value(&event).expect("serialize failed");
        assert_eq!(value["state"], "running");
    }

    #[test]
    fn test_status_and_console_events() {
        let status = NormalizedEvent::status("srv-1", "starting");
        assert_eq!(keys(&status), vec!["_time", "event_type", "server_id", "status"]);

        let console = NormalizedEvent::console_output("srv-1", "[INFO] Done (1.2s)!");
        assert_eq!(keys(&console), vec!["_time", "event_type", "line", "server_id"]);
        let value = serde_json::to_value(&console).expect("serialize failed");
        assert_eq!(value["event_type"], "console_output");
    }

    #[test]
    fn test_format_timestamp_is_utc_with_nanoseconds() {
        let at = datetime!(2024-03-01 12:30:45.123456789 +02:00);
        assert_eq!(format_timestamp(at), "2024-03-01T10:30:45.123456789Z");
    }

    #[test]
    fn test_timestamp_is_stamped_at_normalization() {
        let event = NormalizedEvent::status("srv-1", "offline");
        assert!(event.time.ends_with('Z'));
        assert!(OffsetDateTime::parse(&event.time, &Rfc3339).is_ok());
    }
}
