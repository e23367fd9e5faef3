// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chunked delivery of a whole batch (the bulk path).
//!
//! A batch is split into chunks of at most `max_chunk_size` envelopes, in order. Each chunk is
//! sent as one JSON array. The first refused chunk stops delivery: later chunks are never sent
//! and earlier ones are not rolled back.

use crate::batch::Batch;
use crate::envelope::Envelope;
use crate::errors::Error;
use crate::sink::Sink;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error};

/// Wire payload for one chunk.
pub fn serialize_chunk(chunk: &[Envelope]) -> Result<String, serde_json::Error> {
    serde_json::to_string(chunk)
}

#[derive(Clone)]
pub struct BatchDelivery {
    sink: Arc<dyn Sink>,
    max_chunk_size: usize,
}

impl BatchDelivery {
    /// A `max_chunk_size` of zero is raised to one.
    pub fn new(sink: Arc<dyn Sink>, max_chunk_size: usize) -> Self {
        Self {
            sink,
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Delivers every envelope of `batch`, returning once all chunks were accepted or one was
    /// refused. An empty batch makes no sink call.
    ///
    /// A sink refusal or transport failure ends delivery with [`Error::DeliveryRejected`]
    /// carrying the refused chunk.
    pub async fn deliver(&self, batch: Batch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let envelopes = batch.into_envelopes();
        let n_chunks = envelopes.len().div_ceil(self.max_chunk_size);
        debug!(
            "Delivering {} envelopes in {} chunks",
            envelopes.len(),
            n_chunks
        );

        for (index, chunk) in envelopes.chunks(self.max_chunk_size).enumerate() {
            let payload =
                serialize_chunk(chunk).map_err(|e| Error::Construction(e.to_string()))?;

            let reason = match self.sink.submit(&payload).await {
                Ok(true) => {
                    debug!(chunk = index, size = chunk.len(), "Chunk accepted");
                    continue;
                }
                Ok(false) => "sink refused to accept messages, they may be malformed".to_string(),
                Err(e) => {
                    error!(chunk = index, size = chunk.len(), "Error delivering chunk: {}", e);
                    e.to_string()
                }
            };

            error!(
                "Delivery stopped at chunk {} of {}, {} envelopes not sent",
                index + 1,
                n_chunks,
                chunk.len()
            );
            return Err(Error::DeliveryRejected {
                chunk: chunk.to_vec(),
                reason,
            });
        }

        Ok(())
    }

    /// Validates a single candidate and delivers it on its own.
    pub async fn deliver_one(&self, candidate: Value) -> Result<(), Error> {
        let mut batch = Batch::new();
        batch.add(candidate)?;
        self.deliver(batch).await
    }
}

impl Debug for BatchDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDelivery")
            .field("max_chunk_size", &self.max_chunk_size)
            .finish_non_exhaustive()
    }
}
