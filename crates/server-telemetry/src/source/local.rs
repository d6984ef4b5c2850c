// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process [`Source`] and [`SourceRegistry`] implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::sink::SinkPool;
use super::{Source, SourceAddedHook, SourceRegistry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct LocalSource {
    id: String,
    events: SinkPool,
    console: SinkPool,
    cancel_token: CancellationToken,
}

impl LocalSource {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            events: SinkPool::new(),
            console: SinkPool::new(),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Publishes `{"topic": topic, "data": data}` on the event bus.
    /// Returns the number of subscribers that received it.
    pub fn publish_event<T: Serialize>(&self, topic: &str, data: &T) -> usize {
        match serde_json::to_vec(&json!({ "topic": topic, "data": data })) {
            Ok(message) => self.events.push(&message),
            Err(e) => {
                error!("SOURCE | Failed to encode {topic} event for {}: {e}", self.id);
                0
            }
        }
    }

    /// Publishes raw bytes on the event bus.
    pub fn publish_raw(&self, message: &[u8]) -> usize {
        self.events.push(message)
    }

    pub fn write_console(&self, line: &str) -> usize {
        self.console.push(line.as_bytes())
    }

    #[must_use]
    pub fn event_subscribers(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn console_subscribers(&self) -> usize {
        self.console.len()
    }

    /// Cancels the source and closes both of its sinks.
    pub fn destroy(&self) {
        self.cancel_token.cancel();
        self.events.destroy();
        self.console.destroy();
    }
}

impl Source for LocalSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe_events(&self, tx: Sender<Vec<u8>>) {
        self.events.on(tx);
    }

    fn unsubscribe_events(&self, tx: &Sender<Vec<u8>>) {
        self.events.off(tx);
    }

    fn subscribe_console(&self, tx: Sender<Vec<u8>>) {
        self.console.on(tx);
    }

    fn unsubscribe_console(&self, tx: &Sender<Vec<u8>>) {
        self.console.off(tx);
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

#[derive(Default)]
pub struct LocalRegistry {
    sources: Mutex<Vec<Arc<LocalSource>>>,
    hooks: Mutex<Vec<SourceAddedHook>>,
}

impl LocalRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds `source` and notifies every registered hook.
    pub fn add(&self, source: Arc<LocalSource>) {
        lock(&self.sources).push(Arc::clone(&source));

        // Hooks run outside the lock so they may call back into the registry.
        let hooks: Vec<SourceAddedHook> = lock(&self.hooks).iter().cloned().collect();
        for hook in hooks {
            hook(Arc::clone(&source) as Arc<dyn Source>);
        }
    }

    /// Removes and destroys the source with `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<LocalSource>> {
        let removed = {
            let mut sources = lock(&self.sources);
            let index = sources.iter().position(|source| source.id == id)?;
            sources.remove(index)
        };
        removed.destroy();
        Some(removed)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<LocalSource>> {
        lock(&self.sources)
            .iter()
            .find(|source| source.id == id)
            .cloned()
    }
}

impl SourceRegistry for LocalRegistry {
    fn all(&self) -> Vec<Arc<dyn Source>> {
        lock(&self.sources)
            .iter()
            .map(|source| Arc::clone(source) as Arc<dyn Source>)
            .collect()
    }

    fn on_source_added(&self, hook: SourceAddedHook) {
        lock(&self.hooks).push(hook);
    }
}
