// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::trace;

/// Fan-out of byte messages to every registered channel.
///
/// Pushing never waits on a slow receiver: a message is skipped for any
/// channel that is full, and closed channels are pruned.
#[derive(Debug, Default)]
pub struct SinkPool {
    sinks: Mutex<Vec<Sender<Vec<u8>>>>,
}

impl SinkPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sinks(&self) -> MutexGuard<'_, Vec<Sender<Vec<u8>>>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self, tx: Sender<Vec<u8>>) {
        let mut sinks = self.sinks();
        if !sinks.iter().any(|sink| sink.same_channel(&tx)) {
            sinks.push(tx);
        }
    }

    pub fn off(&self, tx: &Sender<Vec<u8>>) {
        self.sinks().retain(|sink| !sink.same_channel(tx));
    }

    /// Sends `data` to every registered channel. Returns how many accepted it.
    pub fn push(&self, data: &[u8]) -> usize {
        let mut delivered = 0;
        self.sinks().retain(|sink| match sink.try_send(data.to_vec()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!("SINK | Receiver full, skipping message");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks().is_empty()
    }

    /// Drops every registered sender, closing receivers that have no other sender.
    pub fn destroy(&self) {
        self.sinks().clear();
    }
}
