// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interface to the daemon's server manager.
//!
//! The pipeline never owns servers. It only needs to enumerate them, hear
//! about new ones, and attach channels to each server's event bus and console
//! sink. [`local`] is an in-process implementation of both traits built on
//! [`sink::SinkPool`].

use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

pub mod local;
pub mod sink;

/// Callback invoked by a [`SourceRegistry`] for every source created after registration.
pub type SourceAddedHook = Arc<dyn Fn(Arc<dyn Source>) + Send + Sync>;

/// A managed server emitting events and console output.
pub trait Source: Send + Sync {
    /// Stable identifier. A recreated server keeps its id.
    fn id(&self) -> &str;

    /// Starts pushing structured event bus messages to `tx`.
    fn subscribe_events(&self, tx: Sender<Vec<u8>>);

    fn unsubscribe_events(&self, tx: &Sender<Vec<u8>>);

    /// Starts pushing raw console output to `tx`.
    fn subscribe_console(&self, tx: Sender<Vec<u8>>);

    fn unsubscribe_console(&self, tx: &Sender<Vec<u8>>);

    /// Cancelled when the server is torn down.
    fn cancellation_token(&self) -> CancellationToken;
}

/// The collection of managed servers.
pub trait SourceRegistry: Send + Sync {
    fn all(&self) -> Vec<Arc<dyn Source>>;

    /// Registers `hook` for sources added from now on. Sources already present
    /// are not replayed.
    fn on_source_added(&self, hook: SourceAddedHook);
}
