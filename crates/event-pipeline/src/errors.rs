// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::envelope::Envelope;
use crate::sink::SinkError;
use serde_json::Value;
use std::time::Duration;

/// Failures surfaced to callers of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The candidate is missing `event`, `properties`, or one of the required properties.
    #[error("Given value was not a valid event envelope")]
    InvalidEnvelope { candidate: Value },

    /// The sink refused a chunk on the bulk path. Chunks before it were delivered.
    #[error("Sink refused to accept {} envelopes: {reason}", .chunk.len())]
    DeliveryRejected { chunk: Vec<Envelope>, reason: String },

    /// Caller supplied properties that cannot be turned into a JSON object.
    #[error("Can't construct an event envelope: {0}")]
    Construction(String),

    #[error("Ingestion queue still full after {waited:?}")]
    Backpressure { waited: Duration },

    #[error("Dispatch pool is saturated")]
    DispatchSaturated,

    #[error("Pipeline is shut down")]
    ShutDown,

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Contents of a rejected chunk, for diagnostics or replay by the caller.
    pub fn rejected_contents(&self) -> Option<&[Envelope]> {
        match self {
            Error::DeliveryRejected { chunk, .. } => Some(chunk),
            _ => None,
        }
    }
}
