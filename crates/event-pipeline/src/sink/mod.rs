// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport sinks: where payloads finally go.
//!
//! A sink receives serialized payloads (a JSON array of envelopes) and reports whether it
//! accepted them. Consumer workers share one sink, so implementations must tolerate concurrent
//! `submit` calls; the file sink serializes its writes internally for that reason.

pub mod console;
pub mod file;
pub mod http;

pub use console::ConsoleSink;
pub use file::FileSink;
pub use http::HttpSink;

use crate::config::SinkConfig;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid sink configuration: {0}")]
    Config(String),
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Hands `payload` to the backend. `Ok(false)` means the backend refused it; an error means
    /// it could not be reached. Callers treat both as non-acceptance.
    async fn submit(&self, payload: &str) -> Result<bool, SinkError>;
}

/// Builds the sink selected by `config`.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn Sink>, SinkError> {
    let sink: Arc<dyn Sink> = match config {
        SinkConfig::Http {
            endpoint,
            connect_timeout,
            read_timeout,
            https_proxy,
        } => Arc::new(HttpSink::new(
            endpoint.clone(),
            *connect_timeout,
            *read_timeout,
            https_proxy.as_deref(),
        )?),
        SinkConfig::File { path, rotation } => {
            Arc::new(FileSink::new(path.clone(), rotation.clone()))
        }
        SinkConfig::Console { tag } => Arc::new(ConsoleSink::new(tag.clone())),
    };
    Ok(sink)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::FileRotation;
    use std::time::Duration;

    #[tokio::test]
    async fn test_build_console_sink_accepts() {
        let sink = build_sink(&SinkConfig::default()).unwrap();
        assert!(sink.submit("[]").await.unwrap());
    }

    #[tokio::test]
    async fn test_build_file_sink_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("message");
        let sink = build_sink(&SinkConfig::File {
            path: path.clone(),
            rotation: FileRotation::Never,
        })
        .unwrap();

        assert!(sink.submit("[1]").await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]\n");
    }

    #[test]
    fn test_build_http_sink_with_bad_proxy_fails() {
        let result = build_sink(&SinkConfig::Http {
            endpoint: "http://127.0.0.1:1/post".to_string(),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            https_proxy: Some("not a url".to_string()),
        });
        assert!(matches!(result, Err(SinkError::Http(_))));
    }
}
