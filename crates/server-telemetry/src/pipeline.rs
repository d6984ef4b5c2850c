// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline lifecycle.
//!
//! [`Pipeline::start`] wires every stage together and returns immediately.
//! The host keeps the returned value and calls [`Pipeline::shutdown`] when
//! it stops, or cancels the token it passed in.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::aggregator::{AggregatorHandle, EventQueue};
use crate::config::TelemetryConfig;
use crate::delivery::{Deliver, IngestClient};
use crate::error::ConfigError;
use crate::flusher::{FlushController, FlushSettings, FlushSummary};
use crate::http::{get_client, DEFAULT_TIMEOUT};
use crate::listener::SourceListener;
use crate::registry::SubscriptionRegistry;
use crate::source::{Source, SourceRegistry};

/// State shared between the pipeline and the source creation hook.
struct Subscriber {
    aggregator: AggregatorHandle,
    subscriptions: Arc<SubscriptionRegistry>,
    cancel: CancellationToken,
    listeners: TaskTracker,
    // Creation hooks may run on threads outside the runtime.
    runtime: Handle,
}

impl Subscriber {
    fn try_subscribe(&self, source: Arc<dyn Source>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !self.subscriptions.try_claim(source.id()) {
            debug!("TELEMETRY | Server {} is already subscribed", source.id());
            return false;
        }

        let listener = SourceListener::new(
            source,
            self.aggregator.clone(),
            Arc::clone(&self.subscriptions),
            self.cancel.clone(),
        );
        self.listeners.spawn_on(listener.run(), &self.runtime);
        true
    }
}

pub struct Pipeline {
    subscriber: Arc<Subscriber>,
    flush_cancel: CancellationToken,
    flusher: JoinHandle<FlushSummary>,
}

impl Pipeline {
    /// Starts the pipeline, or returns `None` if telemetry is disabled or
    /// misconfigured. A misconfiguration is logged once.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn start(
        config: &TelemetryConfig,
        registry: Arc<dyn SourceRegistry>,
        shutdown: &CancellationToken,
    ) -> Option<Self> {
        match Self::try_start(config, registry, shutdown) {
            Ok(pipeline) => Some(pipeline),
            Err(ConfigError::Disabled) => {
                debug!("TELEMETRY | Telemetry is disabled");
                None
            }
            Err(e) => {
                warn!("TELEMETRY | Not starting telemetry: {e}");
                None
            }
        }
    }

    /// Same as [`Pipeline::start`], but reports why the pipeline did not start.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn try_start(
        config: &TelemetryConfig,
        registry: Arc<dyn SourceRegistry>,
        shutdown: &CancellationToken,
    ) -> Result<Self, ConfigError> {
        if !config.enabled {
            return Err(ConfigError::Disabled);
        }
        config.validate()?;

        let delivery = IngestClient::from_config(get_client(DEFAULT_TIMEOUT), config);
        info!("TELEMETRY | Sending telemetry to {}", delivery.url());
        Ok(Self::start_with_delivery(
            config,
            registry,
            Arc::new(delivery),
            shutdown,
        ))
    }

    /// Starts the pipeline with a custom [`Deliver`] implementation. The
    /// configuration is not validated.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn start_with_delivery(
        config: &TelemetryConfig,
        registry: Arc<dyn SourceRegistry>,
        delivery: Arc<dyn Deliver>,
        shutdown: &CancellationToken,
    ) -> Self {
        let runtime = Handle::current();
        let (queue, aggregator) = EventQueue::new(config.queue_capacity());

        let subscriber = Arc::new(Subscriber {
            aggregator,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            cancel: shutdown.child_token(),
            listeners: TaskTracker::new(),
            runtime: runtime.clone(),
        });

        // Register before enumerating so that a source created in between
        // is seen at least once. The registry deduplicates.
        let hook_target: Weak<Subscriber> = Arc::downgrade(&subscriber);
        registry.on_source_added(Arc::new(move |source: Arc<dyn Source>| {
            if let Some(subscriber) = hook_target.upgrade() {
                subscriber.try_subscribe(source);
            }
        }));
        let mut existing = 0;
        for source in registry.all() {
            if subscriber.try_subscribe(source) {
                existing += 1;
            }
        }
        debug!("TELEMETRY | Subscribed to {existing} existing servers");

        let flush_cancel = shutdown.child_token();
        let controller = FlushController::new(
            queue,
            delivery,
            FlushSettings::from_config(config),
            flush_cancel.clone(),
        );
        let flusher = runtime.spawn(controller.run());

        Self {
            subscriber,
            flush_cancel,
            flusher,
        }
    }

    /// Subscribes to `source` unless it is already subscribed or the pipeline
    /// is shutting down. Returns whether a listener was started.
    pub fn try_subscribe(&self, source: Arc<dyn Source>) -> bool {
        self.subscriber.try_subscribe(source)
    }

    /// Producer handle of the shared queue, for events that do not come from a source.
    #[must_use]
    pub fn handle(&self) -> AggregatorHandle {
        self.subscriber.aggregator.clone()
    }

    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriber.subscriptions
    }

    /// Stops every listener, then drains the queue and flushes it once.
    pub async fn shutdown(self) -> FlushSummary {
        self.subscriber.cancel.cancel();
        self.subscriber.listeners.close();
        self.subscriber.listeners.wait().await;

        self.flush_cancel.cancel();
        match self.flusher.await {
            Ok(summary) => summary,
            Err(e) => {
                error!("TELEMETRY | Flush task failed: {e}");
                FlushSummary::default()
            }
        }
    }
}
