// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded queue shared by every source listener.
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (one clone per listener)
//!    └──────┬───────┘
//!           │ try_send, drop on full
//!           v
//!    ┌──────────────┐
//!    │  EventQueue  │ (owned by the flush controller)
//!    └──────────────┘
//! ```
//!
//! Producers never wait. When the queue is full the event is dropped and a
//! warning is logged at most once per [`DROP_WARNING_INTERVAL`], so an
//! overload does not also flood the daemon's own logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::NormalizedEvent;

/// Minimum time between two "queue full" warnings.
pub const DROP_WARNING_INTERVAL: Duration = Duration::from_secs(60);

/// Rate limiter for the "queue full" warning.
#[derive(Debug)]
pub struct DropWarning {
    interval: Duration,
    last_warning: Mutex<Option<Instant>>,
}

impl Default for DropWarning {
    fn default() -> Self {
        Self::new(DROP_WARNING_INTERVAL)
    }
}

impl DropWarning {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_warning: Mutex::new(None),
        }
    }

    /// Returns `true`, and records `now`, if no warning was emitted in the last interval.
    pub fn should_warn_at(&self, now: Instant) -> bool {
        let mut last_warning = self
            .last_warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *last_warning {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last_warning = Some(now);
                true
            }
        }
    }
}

/// Producer side of the queue.
#[derive(Clone, Debug)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<NormalizedEvent>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
    drop_warning: Arc<DropWarning>,
}

impl AggregatorHandle {
    /// Enqueues `event` without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, event: NormalizedEvent) -> bool {
        if event.server_id.is_empty() {
            debug!("TELEMETRY | Discarding {} event without server id", event.event_type);
            return false;
        }

        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if self.drop_warning.should_warn_at(Instant::now()) {
                    warn!(
                        "TELEMETRY | Event queue full ({} slots), dropping events; {} dropped so far",
                        self.capacity, dropped
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("TELEMETRY | Event queue closed, discarding event");
                false
            }
        }
    }

    /// Total number of events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side of the queue. There is exactly one.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<NormalizedEvent>,
}

impl EventQueue {
    /// Creates a queue holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, AggregatorHandle) {
        Self::with_drop_warning(capacity, DropWarning::default())
    }

    #[must_use]
    pub fn with_drop_warning(capacity: usize, drop_warning: DropWarning) -> (Self, AggregatorHandle) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let handle = AggregatorHandle {
            tx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
            drop_warning: Arc::new(drop_warning),
        };
        (Self { rx }, handle)
    }

    /// Waits for the next event. `None` once every handle is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<NormalizedEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<NormalizedEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Takes every event currently queued without waiting.
    pub fn drain(&mut self) -> Vec<NormalizedEvent> {
        let mut events = Vec::with_capacity(self.rx.len());
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn line(n: usize) -> NormalizedEvent {
        NormalizedEvent::console_output("srv-1", format!("line {n}"))
    }

    #[tokio::test]
    async fn test_fifo_within_capacity() {
        let (mut queue, handle) = EventQueue::new(10);
        for n in 0..10 {
            assert!(handle.enqueue(line(n)));
        }
        assert_eq!(queue.len(), 10);

        let lines: Vec<String> = queue.drain().into_iter().map(|e| e.line).collect();
        let expected: Vec<String> = (0..10).map(|n| format!("line {n}")).collect();
        assert_eq!(lines, expected);
        assert!(queue.is_empty());
        assert_eq!(handle.dropped(), 0);
    }

    #[tokio::test]
    async fn test_overflow_is_dropped() {
        let (mut queue, handle) = EventQueue::new(3);
        let accepted = (0..10).filter(|n| handle.enqueue(line(*n))).count();

        assert_eq!(accepted, 3);
        assert_eq!(handle.dropped(), 7);
        let lines: Vec<String> = queue.drain().into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["line 0", "line 1", "line 2"]);
    }

    #[tokio::test]
    async fn test_event_without_server_id_is_rejected() {
        let (queue, handle) = EventQueue::new(3);
        assert!(!handle.enqueue(NormalizedEvent::status("", "running")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_discards() {
        let (queue, handle) = EventQueue::new(3);
        drop(queue);
        assert!(!handle.enqueue(line(0)));
        assert_eq!(handle.dropped(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (mut queue, handle) = EventQueue::new(0);
        assert_eq!(handle.capacity(), 1);
        assert!(handle.enqueue(line(0)));
        assert!(queue.try_recv().is_some());
    }

    #[test]
    fn test_drop_warning_window() {
        let warning = DropWarning::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(warning.should_warn_at(start));
        assert!(!warning.should_warn_at(start + Duration::from_secs(1)));
        assert!(!warning.should_warn_at(start + Duration::from_secs(59)));
        assert!(warning.should_warn_at(start + Duration::from_secs(60)));
        assert!(!warning.should_warn_at(start + Duration::from_secs(119)));
        assert!(warning.should_warn_at(start + Duration::from_secs(121)));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_one_drop_warning_per_minute() {
        let (_queue, handle) = EventQueue::new(1);
        for n in 0..1000 {
            handle.enqueue(line(n));
        }
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Event queue full")).count() {
                1 => Ok(()),
                n => Err(format!("expected 1 drop warning, got {n}")),
            }
        });

        tokio::time::advance(Duration::from_secs(30)).await;
        handle.enqueue(line(0));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Event queue full")).count() {
                1 => Ok(()),
                n => Err(format!("expected 1 drop warning, got {n}")),
            }
        });

        tokio::time::advance(Duration::from_secs(31)).await;
        handle.enqueue(line(0));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Event queue full")).count() {
                2 => Ok(()),
                n => Err(format!("expected 2 drop warnings, got {n}")),
            }
        });
        assert_eq!(handle.dropped(), 1001);
    }
}
