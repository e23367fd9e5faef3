// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO queue shared by producers and consumer workers.
//!
//! Enqueue waits while the queue is at capacity; this is the only admission control the
//! pipeline has. Nothing is ever dropped to make room.

use crate::envelope::Envelope;
use crate::errors::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<Envelope>,
    // Consumers take turns on the receiver; the lock is held for a single dequeue.
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
}

impl IngestionQueue {
    /// Creates a queue holding at most `capacity` envelopes. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Appends `envelope`, waiting for space while the queue is full.
    pub async fn enqueue(&self, envelope: Envelope) -> Result<(), Error> {
        self.tx.send(envelope).await.map_err(|_| Error::ShutDown)
    }

    /// Like [`IngestionQueue::enqueue`], but gives up with [`Error::Backpressure`] once
    /// `timeout` has elapsed without space freeing up.
    pub async fn enqueue_timeout(&self, envelope: Envelope, timeout: Duration) -> Result<(), Error> {
        match self.tx.send_timeout(envelope, timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                Err(Error::Backpressure { waited: timeout })
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(Error::ShutDown),
        }
    }

    /// Appends `envelope` only if there is room right now.
    pub fn try_enqueue(&self, envelope: Envelope) -> Result<(), Error> {
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::Backpressure {
                waited: Duration::ZERO,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::ShutDown),
        }
    }

    /// Removes the oldest envelope, waiting while the queue is empty.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    pub async fn dequeue(&self) -> Option<Envelope> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
