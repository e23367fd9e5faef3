// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use tracing::info;

/// Writes every payload to the log at info level. Always accepts.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    tag: String,
}

impl ConsoleSink {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn submit(&self, payload: &str) -> Result<bool, SinkError> {
        info!(tag = %self.tag, "{}", payload);
        Ok(true)
    }
}
