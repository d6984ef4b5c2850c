// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of raw source messages into [`NormalizedEvent`]s.
//!
//! Messages on a server's event bus are JSON envelopes `{"topic": ..., "data": ...}`.
//! Only resource usage and status topics are kept. Console output is also
//! published on the bus, but it is read from the console sink instead so it
//! would be counted twice here.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::event::{NormalizedEvent, StatsPayload};

pub const STATS_TOPIC: &str = "stats";
pub const STATUS_TOPIC: &str = "status";
pub const CONSOLE_OUTPUT_TOPIC: &str = "console output";

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    #[serde(default)]
    data: Value,
}

/// Decodes one event bus message published by `server_id`.
///
/// Returns `Ok(None)` for topics that are not forwarded.
pub fn decode_event(server_id: &str, data: &[u8]) -> Result<Option<NormalizedEvent>, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(data).map_err(DecodeError::Envelope)?;

    match envelope.topic.as_str() {
        STATS_TOPIC => {
            let stats: StatsPayload =
                serde_json::from_value(envelope.data).map_err(|source| DecodeError::Payload {
                    topic: STATS_TOPIC,
                    source,
                })?;
            Ok(Some(NormalizedEvent::stats(server_id, &stats)))
        }
        STATUS_TOPIC => {
            let status: String =
                serde_json::from_value(envelope.data).map_err(|source| DecodeError::Payload {
                    topic: STATUS_TOPIC,
                    source,
                })?;
            Ok(Some(NormalizedEvent::status(server_id, status)))
        }
        _ => Ok(None),
    }
}

/// Wraps one console sink message. The text is kept as received.
#[must_use]
pub fn decode_console_line(server_id: &str, data: &[u8]) -> NormalizedEvent {
    NormalizedEvent::console_output(server_id, String::from_utf8_lossy(data))
}
