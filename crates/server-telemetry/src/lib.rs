// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Server Telemetry
//!
//! Telemetry ingestion for a server-management daemon. Each managed server
//! publishes lifecycle events (status changes, resource usage samples) on a
//! structured event bus and raw console output on a separate sink. This crate
//! subscribes to every server, normalizes what it sees into one event shape,
//! batches the events and POSTs each batch to a remote ingest API.
//!
//! ## Architecture
//!
//! ```text
//!   SourceRegistry ──(hook, then enumerate)──> Pipeline
//!                                                │ try_subscribe
//!                                                v
//!   Source ──events/console──> SourceListener (one per source)
//!                                                │ enqueue (never blocks)
//!                                                v
//!                                   Aggregator (bounded, drop on full)
//!                                                │
//!                                                v
//!                                   FlushController (size or timer)
//!                                                │
//!                                                v
//!                                   IngestClient (retry 5xx, drop 4xx)
//! ```
//!
//! Nothing in here is fatal to the host process: the worst outcome of any
//! failure is lost telemetry.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod flusher;
pub mod http;
pub mod listener;
pub mod logger;
pub mod pipeline;
pub mod registry;
pub mod source;

/// Capacity of the shared event queue when the configuration does not set one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Capacity of each per-source channel handed to a source's event bus and console sink.
pub(crate) const SOURCE_CHANNEL_CAPACITY: usize = 64;

/// Number of delivery attempts per batch before it is dropped.
pub(crate) const FLUSH_RETRY_COUNT: usize = 3;
