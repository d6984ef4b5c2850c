// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{decode_console_line, decode_event};
use crate::aggregator::AggregatorHandle;
use crate::registry::SubscriptionRegistry;
use crate::source::Source;
use crate::SOURCE_CHANNEL_CAPACITY;

/// Forwards one source's events and console output to the aggregator.
///
/// The listener owns the receiving ends of both channels and hands the
/// sources only the sending ends. It keeps weak senders so that a source
/// dropping its subscriptions closes the channels and ends the listener.
pub struct SourceListener {
    source: Arc<dyn Source>,
    aggregator: AggregatorHandle,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
}

impl SourceListener {
    #[must_use]
    pub fn new(
        source: Arc<dyn Source>,
        aggregator: AggregatorHandle,
        registry: Arc<SubscriptionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            aggregator,
            registry,
            shutdown,
        }
    }

    /// Runs until the source goes away or the pipeline shuts down, then
    /// unsubscribes and releases the source id.
    ///
    /// The caller must already hold the claim for the source id.
    pub async fn run(self) {
        let id = self.source.id().to_string();
        let source_cancelled = self.source.cancellation_token();

        let (events_tx, mut events_rx) = mpsc::channel::<Vec<u8>>(SOURCE_CHANNEL_CAPACITY);
        let (console_tx, mut console_rx) = mpsc::channel::<Vec<u8>>(SOURCE_CHANNEL_CAPACITY);
        let events_sub = events_tx.downgrade();
        let console_sub = console_tx.downgrade();
        self.source.subscribe_events(events_tx);
        self.source.subscribe_console(console_tx);
        debug!("TELEMETRY | Subscribed to server {id}");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = source_cancelled.cancelled() => {
                    debug!("TELEMETRY | Server {id} was removed");
                    break;
                }
                message = events_rx.recv() => {
                    let Some(message) = message else { break };
                    self.forward_event(&id, &message);
                }
                line = console_rx.recv() => {
                    let Some(line) = line else { break };
                    self.aggregator.enqueue(decode_console_line(&id, &line));
                }
            }
        }

        // Messages already handed over by the source are still forwarded.
        while let Ok(message) = events_rx.try_recv() {
            self.forward_event(&id, &message);
        }
        while let Ok(line) = console_rx.try_recv() {
            self.aggregator.enqueue(decode_console_line(&id, &line));
        }

        if let Some(tx) = events_sub.upgrade() {
            self.source.unsubscribe_events(&tx);
        }
        if let Some(tx) = console_sub.upgrade() {
            self.source.unsubscribe_console(&tx);
        }
        self.registry.release(&id);
        debug!("TELEMETRY | Unsubscribed from server {id}");
    }

    fn forward_event(&self, id: &str, message: &[u8]) {
        match decode_event(id, message) {
            Ok(Some(event)) => {
                self.aggregator.enqueue(event);
            }
            Ok(None) => {}
            Err(e) => warn!("TELEMETRY | Dropping event from server {id}: {e}"),
        }
    }
}
