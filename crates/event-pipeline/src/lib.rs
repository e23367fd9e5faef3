// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side event telemetry pipeline.
//!
//! Application code emits named events with arbitrary properties. The pipeline wraps each one
//! in an [`envelope::Envelope`], validates it, and hands it either to a bounded ingestion queue
//! drained by a pool of consumer workers (the streaming path) or to the chunked
//! [`delivery::BatchDelivery`] driver (the bulk path). Both paths end at a [`sink::Sink`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod delivery;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod pipeline;
pub mod queue;
pub mod sink;
