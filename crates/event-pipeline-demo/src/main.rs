// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use event_pipeline::{
    batch::Batch,
    config::PipelineConfig,
    errors::Error,
    pipeline::{Pipeline, PipelineHandle},
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_EVENTS: usize = 100;
const DEMO_BATCH_SIZE: usize = 10;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
pub async fn main() {
    let config = PipelineConfig::from_env();
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Error reading event pipeline configuration: {e}");
            return;
        }
    };

    let pipeline = match Pipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("Error starting event pipeline: {e}");
            return;
        }
    };
    let handle = pipeline.handle();

    tokio::select! {
        result = emit(&handle) => {
            if let Err(e) = result {
                error!("Demo run failed: {e}");
            }
            if !pipeline.drain(DRAIN_TIMEOUT).await {
                warn!("Pipeline did not drain within {:?}", DRAIN_TIMEOUT);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    let undelivered = pipeline.shutdown().await;
    info!("Demo finished, {} events left undelivered", undelivered);
}

async fn emit(handle: &PipelineHandle) -> Result<(), Error> {
    for i in 0..DEMO_EVENTS {
        handle
            .track(&format!("TestEvent{i}"), &json!({"test": "value"}))
            .await?;
    }
    info!("Queued {} events on the streaming path", DEMO_EVENTS);

    let mut batch = Batch::new();
    for i in 0..DEMO_BATCH_SIZE {
        let envelope = handle.builder().build(
            Some("demo-user"),
            &format!("BatchEvent{i}"),
            &json!({"test": "value", "index": i}),
        )?;
        batch.add_envelope(envelope);
    }

    match handle.track_blocking(batch).await {
        Ok(()) => info!("Delivered a batch of {} events", DEMO_BATCH_SIZE),
        Err(e @ Error::DeliveryRejected { .. }) => {
            let rejected = e.rejected_contents().map_or(0, <[_]>::len);
            warn!("{e}; {rejected} events in the refused chunk");
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
