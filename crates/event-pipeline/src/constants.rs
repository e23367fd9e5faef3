// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Property key holding the client token.
pub const TOKEN_KEY: &str = "token";
/// Property key holding the event time in seconds since the epoch.
pub const TIME_KEY: &str = "time";
/// Property key identifying the library that produced the envelope.
/// Kept as `sugo_lib` for compatibility with existing collectors.
pub const LIB_TAG_KEY: &str = "sugo_lib";
pub const LIB_TAG_VALUE: &str = "rust";
pub const DISTINCT_ID_KEY: &str = "distinct_id";

/// Maximum number of envelopes per chunk on the bulk path
pub const MAX_CHUNK_SIZE: usize = 50;

// A full queue blocks producers, so the default is large but finite.
pub const QUEUE_CAPACITY: usize = 1_000_000;
pub const CONSUMER_WORKERS: usize = 2;

pub const DISPATCH_BACKLOG: usize = 1_024;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MESSAGE_FILE: &str = "./event_messages/message";
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_BACKUPS: usize = 50;
pub const DEFAULT_DATE_PATTERN: &str = "%Y%m%d";

pub const DEFAULT_CONSOLE_TAG: &str = "event-pipeline";
