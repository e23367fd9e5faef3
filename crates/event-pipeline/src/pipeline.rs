// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline lifecycle and the caller-facing API.
//!
//! [`Pipeline::start`] wires the ingestion queue, the dispatcher, the consumer pool and the bulk
//! delivery driver around one sink. Producers talk to it through cloned [`PipelineHandle`]s;
//! the owner keeps the [`Pipeline`] to drain and shut it down.

use crate::batch::{self, Batch};
use crate::config::PipelineConfig;
use crate::consumer::ConsumerPool;
use crate::delivery::BatchDelivery;
use crate::dispatch::{DispatchPool, Dispatcher};
use crate::envelope::{Envelope, EnvelopeBuilder};
use crate::errors::Error;
use crate::queue::IngestionQueue;
use crate::sink::{self, Sink};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cheap, cloneable producer handle.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    builder: EnvelopeBuilder,
    dispatcher: Dispatcher,
    delivery: BatchDelivery,
    queue: IngestionQueue,
    cancel_token: CancellationToken,
}

impl PipelineHandle {
    pub fn builder(&self) -> &EnvelopeBuilder {
        &self.builder
    }

    /// Builds an envelope and admits it to the streaming path.
    ///
    /// Returns once the envelope is queued. Delivery failures after that point are logged by
    /// the consumer and never reach the caller.
    pub async fn track<P>(&self, event_name: &str, properties: &P) -> Result<(), Error>
    where
        P: Serialize + ?Sized,
    {
        let envelope = self.builder.event(event_name, properties)?;
        self.admit(envelope).await
    }

    /// Same as [`PipelineHandle::track`], attributing the event to `distinct_id`.
    pub async fn track_with_id<P>(
        &self,
        distinct_id: &str,
        event_name: &str,
        properties: &P,
    ) -> Result<(), Error>
    where
        P: Serialize + ?Sized,
    {
        let envelope = self.builder.build(Some(distinct_id), event_name, properties)?;
        self.admit(envelope).await
    }

    /// Admits a caller-assembled envelope. Fails with [`Error::InvalidEnvelope`] before
    /// anything is queued if it lacks a required field.
    pub async fn track_envelope(&self, candidate: Value) -> Result<(), Error> {
        let envelope = batch::parse(candidate)?;
        self.admit(envelope).await
    }

    /// Delivers `batch` on the bulk path, returning after every chunk was accepted or the
    /// first one was refused.
    pub async fn track_blocking(&self, batch: Batch) -> Result<(), Error> {
        if self.is_shut_down() {
            return Err(Error::ShutDown);
        }
        self.delivery.deliver(batch).await
    }

    /// Validates one candidate and delivers it on the bulk path.
    pub async fn send_message(&self, candidate: Value) -> Result<(), Error> {
        if self.is_shut_down() {
            return Err(Error::ShutDown);
        }
        self.delivery.deliver_one(candidate).await
    }

    /// Envelopes admitted but not yet picked up by a consumer.
    pub fn queued(&self) -> usize {
        self.queue.len() + self.dispatcher.backlog_len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn admit(&self, envelope: Envelope) -> Result<(), Error> {
        self.dispatcher.dispatch(envelope).await
    }
}

/// A running pipeline. Dropping it without calling [`Pipeline::shutdown`] leaves the workers
/// running until the runtime stops.
pub struct Pipeline {
    handle: PipelineHandle,
    consumers: ConsumerPool,
    dispatch_pool: Option<DispatchPool>,
}

impl Pipeline {
    /// Starts the workers on the current tokio runtime.
    pub fn start(config: &PipelineConfig, sink: Arc<dyn Sink>) -> Result<Self, Error> {
        config.validate()?;

        let cancel_token = CancellationToken::new();
        let queue = IngestionQueue::new(config.queue_capacity);
        let (dispatcher, dispatch_pool) = Dispatcher::new(
            &config.dispatch,
            queue.clone(),
            config.enqueue_timeout,
            cancel_token.clone(),
        );
        let consumers = ConsumerPool::spawn(
            config.consumer_workers,
            queue.clone(),
            Arc::clone(&sink),
            cancel_token.clone(),
        );

        info!(
            consumers = consumers.len(),
            dispatchers = dispatch_pool.as_ref().map_or(0, DispatchPool::len),
            queue_capacity = queue.capacity(),
            "Event pipeline started"
        );

        Ok(Self {
            handle: PipelineHandle {
                builder: EnvelopeBuilder::new(config.token.clone()),
                dispatcher,
                delivery: BatchDelivery::new(sink, config.max_chunk_size),
                queue,
                cancel_token,
            },
            consumers,
            dispatch_pool,
        })
    }

    /// Builds the configured sink and starts the pipeline around it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Error> {
        config.validate()?;
        let sink = sink::build_sink(&config.sink)?;
        Self::start(config, sink)
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Waits until every admitted envelope has been picked up by a consumer, or `timeout`
    /// elapses. Returns whether the pipeline drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.handle.queued() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Stops admission, lets in-flight sink calls finish and stops every worker.
    ///
    /// Returns the number of admitted envelopes that were never delivered.
    pub async fn shutdown(self) -> usize {
        debug!("Shutting down event pipeline");
        self.handle.cancel_token.cancel();

        if let Some(pool) = self.dispatch_pool {
            pool.join().await;
        }
        self.consumers.join().await;

        let undelivered = self.handle.queued();
        if undelivered > 0 {
            warn!("{} queued events were not delivered", undelivered);
        }
        info!("Event pipeline stopped");
        undelivered
    }
}
