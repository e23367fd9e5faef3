// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consumer workers draining the ingestion queue into the sink.
//!
//! Each worker forwards one envelope per sink call. A refused or failed delivery is logged and
//! the worker moves on: the producer returned as soon as the envelope was enqueued, so there is
//! nobody left to report to and the envelope is not retried.

use crate::envelope::Envelope;
use crate::queue::IngestionQueue;
use crate::sink::Sink;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Streaming-path payload: a JSON array holding the single envelope.
pub fn serialize_envelope(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(std::slice::from_ref(envelope))
}

pub struct Consumer {
    id: usize,
    queue: IngestionQueue,
    sink: Arc<dyn Sink>,
    cancel_token: CancellationToken,
}

impl Consumer {
    pub fn new(
        id: usize,
        queue: IngestionQueue,
        sink: Arc<dyn Sink>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            sink,
            cancel_token,
        }
    }

    /// Runs until cancelled. A sink call already in progress is always allowed to finish.
    pub async fn run(self) {
        debug!(worker = self.id, "Consumer started");

        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                next = self.queue.dequeue() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.forward(&envelope).await;
        }

        debug!(worker = self.id, "Consumer stopped");
    }

    /// Sends one envelope to the sink, returning whether it was accepted.
    async fn forward(&self, envelope: &Envelope) -> bool {
        let payload = match serialize_envelope(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(worker = self.id, event = envelope.event(), "Failed to serialize event: {}", e);
                return false;
            }
        };

        match self.sink.submit(&payload).await {
            Ok(true) => {
                trace!(worker = self.id, event = envelope.event(), "Event delivered");
                true
            }
            Ok(false) => {
                error!(worker = self.id, event = envelope.event(), "Sink refused to accept event, dropping it");
                false
            }
            Err(e) => {
                error!(worker = self.id, event = envelope.event(), "Failed to deliver event: {}", e);
                false
            }
        }
    }
}

/// Fixed set of consumer workers sharing one queue and one sink.
pub struct ConsumerPool {
    workers: JoinSet<()>,
}

impl ConsumerPool {
    /// Spawns `workers` consumers (at least one) on the current tokio runtime.
    pub fn spawn(
        workers: usize,
        queue: IngestionQueue,
        sink: Arc<dyn Sink>,
        cancel_token: CancellationToken,
    ) -> Self {
        let mut set = JoinSet::new();
        for id in 0..workers.max(1) {
            let consumer = Consumer::new(
                id,
                queue.clone(),
                Arc::clone(&sink),
                cancel_token.clone(),
            );
            set.spawn(consumer.run());
        }
        Self { workers: set }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit. Workers only exit once cancelled.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Consumer task failed: {}", e);
            }
        }
    }
}
