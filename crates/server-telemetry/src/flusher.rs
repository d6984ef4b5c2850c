// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch formation.
//!
//! The flush controller is the only consumer of the [`EventQueue`] and the
//! only caller of [`Deliver`]. A batch is flushed when:
//! 1. **Count limit**: it reaches `batch_size` events (the timer is restarted)
//! 2. **Timer**: the flush interval elapses and the batch is not empty
//! 3. **Shutdown**: the queue is drained and whatever is left goes out
//!
//! Delivery runs on this task, so a slow endpoint delays the next batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::EventQueue;
use crate::config::TelemetryConfig;
use crate::delivery::Deliver;
use crate::event::NormalizedEvent;

// Upper bound on the capacity reserved up front for a new batch.
const MAX_PREALLOCATED_BATCH: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSettings {
    pub interval: Duration,
    pub batch_size: usize,
}

impl FlushSettings {
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            interval: config.flush_interval(),
            batch_size: config.batch_size(),
        }
    }
}

/// What the controller did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub batches: usize,
    pub delivered_events: usize,
    pub lost_events: usize,
}

pub struct FlushController {
    queue: EventQueue,
    delivery: Arc<dyn Deliver>,
    settings: FlushSettings,
    shutdown: CancellationToken,
    batch: Vec<NormalizedEvent>,
    summary: FlushSummary,
}

impl FlushController {
    #[must_use]
    pub fn new(
        queue: EventQueue,
        delivery: Arc<dyn Deliver>,
        settings: FlushSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let settings = FlushSettings {
            interval: settings.interval.max(Duration::from_millis(1)),
            batch_size: settings.batch_size.max(1),
        };
        Self {
            queue,
            delivery,
            settings,
            shutdown,
            batch: Self::new_batch(settings.batch_size),
            summary: FlushSummary::default(),
        }
    }

    fn new_batch(batch_size: usize) -> Vec<NormalizedEvent> {
        Vec::with_capacity(batch_size.min(MAX_PREALLOCATED_BATCH))
    }

    /// Runs until shutdown is requested or every queue handle is dropped.
    pub async fn run(mut self) -> FlushSummary {
        let period = self.settings.interval;
        // First tick one full interval from now, not immediately.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("TELEMETRY | Received shutdown signal, draining queued events");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
                event = self.queue.recv() => {
                    let Some(event) = event else {
                        debug!("TELEMETRY | Event queue closed, finishing");
                        break;
                    };
                    self.batch.push(event);
                    if self.batch.len() >= self.settings.batch_size {
                        self.flush().await;
                        ticker.reset();
                    }
                }
            }
        }

        let remaining = self.queue.drain();
        self.batch.extend(remaining);
        if !self.batch.is_empty() {
            self.flush().await;
        }

        info!(
            "TELEMETRY | Shutdown complete: {} batches, {} events delivered, {} lost",
            self.summary.batches, self.summary.delivered_events, self.summary.lost_events
        );
        self.summary
    }

    async fn flush(&mut self) {
        let batch = std::mem::replace(&mut self.batch, Self::new_batch(self.settings.batch_size));
        self.summary.batches += 1;

        debug!("TELEMETRY | Flushing {} events", batch.len());
        match self.delivery.deliver(&batch).await {
            Ok(delivered) => self.summary.delivered_events += delivered.events,
            Err(e) => {
                let lost = e.events().unwrap_or(batch.len());
                self.summary.lost_events += lost;
                if e.is_permanent() {
                    error!("TELEMETRY | Dropping {lost} events, not retryable: {e}");
                } else {
                    error!("TELEMETRY | Dropping {lost} events after retries: {e}");
                }
            }
        }
    }
}
