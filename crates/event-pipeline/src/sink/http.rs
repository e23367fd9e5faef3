// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP collector sink.
//!
//! Payloads are base64 encoded and posted as the `data` field of a form-urlencoded body. The
//! collector signals acceptance with a response body of exactly `1`.

use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ACCEPTED_BODY: &str = "1";

/// Base64 form of `payload` as sent in the `data` field (before form encoding).
pub fn encode_payload(payload: &str) -> String {
    STANDARD.encode(payload.as_bytes())
}

/// Builds a reqwest client with optional proxy configuration and timeouts.
pub fn build_client(
    proxy_url: Option<&str>,
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<reqwest::Client, SinkError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        https_proxy: Option<&str>,
    ) -> Result<Self, SinkError> {
        let client = build_client(https_proxy, connect_timeout, read_timeout)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn submit(&self, payload: &str) -> Result<bool, SinkError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", encode_payload(payload))])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let elapsed = start.elapsed();

        if body == ACCEPTED_BODY {
            debug!(
                "Collector accepted payload in {} ms ({} bytes)",
                elapsed.as_millis(),
                payload.len()
            );
            Ok(true)
        } else {
            warn!("{}: Collector refused payload: {:?}", status, body);
            Ok(false)
        }
    }
}
