// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock sinks for driving the pipeline without a collector

use async_trait::async_trait;
use event_pipeline::sink::{Sink, SinkError};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Records every payload and accepts it
#[derive(Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<Value>>,
}

impl RecordingSink {
    /// Event names in the order the sink saw them
    pub fn events(&self) -> Vec<String> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .flat_map(|payload| payload.as_array().cloned().unwrap_or_default())
            .filter_map(|envelope| envelope["event"].as_str().map(str::to_string))
            .collect()
    }

    /// Number of envelopes in each sink call
    pub fn call_sizes(&self) -> Vec<usize> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|payload| payload.as_array().map_or(0, Vec::len))
            .collect()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn submit(&self, payload: &str) -> Result<bool, SinkError> {
        let value = serde_json::from_str(payload).map_err(|e| SinkError::Config(e.to_string()))?;
        self.payloads.lock().unwrap().push(value);
        Ok(true)
    }
}

/// Refuses every payload, counting the attempts
#[derive(Default)]
#[allow(dead_code)]
pub struct RejectingSink {
    calls: Mutex<usize>,
}

#[allow(dead_code)]
impl RejectingSink {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Sink for RejectingSink {
    async fn submit(&self, _payload: &str) -> Result<bool, SinkError> {
        *self.calls.lock().unwrap() += 1;
        Ok(false)
    }
}

/// Accepts every payload after a fixed delay
#[allow(dead_code)]
pub struct SlowSink {
    pub delay: Duration,
    pub inner: RecordingSink,
}

#[async_trait]
impl Sink for SlowSink {
    async fn submit(&self, payload: &str) -> Result<bool, SinkError> {
        tokio::time::sleep(self.delay).await;
        self.inner.submit(payload).await
    }
}
