// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants;
use crate::dispatch::{DispatchMode, SaturationPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "EVENT_PIPELINE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the file sink rolls its output file over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRotation {
    Never,
    /// Roll to `file.1 .. file.<max_backups>` once `max_bytes` would be exceeded.
    Size { max_bytes: u64, max_backups: usize },
    /// Roll to `file_<date>` on the first write of a new day. `date_pattern` is a strftime pattern.
    Daily { date_pattern: String },
}

impl Default for FileRotation {
    fn default() -> Self {
        FileRotation::Size {
            max_bytes: constants::DEFAULT_MAX_FILE_BYTES,
            max_backups: constants::DEFAULT_MAX_BACKUPS,
        }
    }
}

/// Selects and configures the transport sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Http {
        endpoint: String,
        connect_timeout: Duration,
        read_timeout: Duration,
        https_proxy: Option<String>,
    },
    File {
        path: PathBuf,
        rotation: FileRotation,
    },
    Console {
        tag: String,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Console {
            tag: constants::DEFAULT_CONSOLE_TAG.to_string(),
        }
    }
}

/// Configuration for an event pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Client token injected into every envelope that does not carry one
    pub token: String,
    /// Maximum number of envelopes per sink call on the bulk path
    pub max_chunk_size: usize,
    /// Number of envelopes the ingestion queue holds before producers wait
    pub queue_capacity: usize,
    /// Number of consumer workers draining the ingestion queue
    pub consumer_workers: usize,
    /// Give up on a full queue after this long instead of waiting indefinitely
    pub enqueue_timeout: Option<Duration>,
    /// Whether producers enqueue directly or through a dispatch pool
    pub dispatch: DispatchMode,
    pub sink: SinkConfig,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            max_chunk_size: constants::MAX_CHUNK_SIZE,
            queue_capacity: constants::QUEUE_CAPACITY,
            consumer_workers: constants::CONSUMER_WORKERS,
            enqueue_timeout: None,
            dispatch: DispatchMode::Inline,
            sink: SinkConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `EVENT_PIPELINE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source. Unset variables keep their
    /// defaults, as do numeric values that fail to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let number = |name: &str| var(name).and_then(|val| val.trim().parse::<u64>().ok());
        let millis = |name: &str| number(name).map(Duration::from_millis);
        let count = |name: &str| number(name).and_then(|val| usize::try_from(val).ok());

        let defaults = Self::default();

        let dispatchers = count("DISPATCHERS").unwrap_or(0);
        let dispatch = if dispatchers == 0 {
            DispatchMode::Inline
        } else {
            let saturation = match var("DISPATCH_SATURATION")
                .map(|val| val.to_lowercase())
                .as_deref()
            {
                Some("reject") => SaturationPolicy::Reject,
                _ => SaturationPolicy::Block,
            };
            DispatchMode::Pooled {
                dispatchers,
                backlog: count("DISPATCH_BACKLOG")
                    .unwrap_or(constants::DISPATCH_BACKLOG),
                saturation,
            }
        };

        let sink_kind = var("SINK")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "console".to_string());
        let sink = match sink_kind.as_str() {
            "http" => SinkConfig::Http {
                endpoint: var("ENDPOINT").unwrap_or_default(),
                connect_timeout: millis("CONNECT_TIMEOUT_MS").unwrap_or(constants::CONNECT_TIMEOUT),
                read_timeout: millis("READ_TIMEOUT_MS").unwrap_or(constants::READ_TIMEOUT),
                https_proxy: var("PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")),
            },
            "file" => {
                let rotation = match var("FILE_ROTATION")
                    .map(|val| val.to_lowercase())
                    .as_deref()
                {
                    Some("never") => FileRotation::Never,
                    Some("daily") => FileRotation::Daily {
                        date_pattern: var("FILE_DATE_PATTERN")
                            .unwrap_or_else(|| constants::DEFAULT_DATE_PATTERN.to_string()),
                    },
                    _ => FileRotation::Size {
                        max_bytes: number("FILE_MAX_BYTES")
                            .unwrap_or(constants::DEFAULT_MAX_FILE_BYTES),
                        max_backups: count("FILE_MAX_BACKUPS")
                            .unwrap_or(constants::DEFAULT_MAX_BACKUPS),
                    },
                };
                SinkConfig::File {
                    path: PathBuf::from(
                        var("FILE").unwrap_or_else(|| constants::DEFAULT_MESSAGE_FILE.to_string()),
                    ),
                    rotation,
                }
            }
            "console" => SinkConfig::Console {
                tag: var("CONSOLE_TAG")
                    .unwrap_or_else(|| constants::DEFAULT_CONSOLE_TAG.to_string()),
            },
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown sink '{other}'. Must be one of: http, file, console"
                )))
            }
        };

        let config = Self {
            token: var("TOKEN").unwrap_or(defaults.token),
            max_chunk_size: count("MAX_CHUNK_SIZE")
                .unwrap_or(defaults.max_chunk_size),
            queue_capacity: count("QUEUE_CAPACITY")
                .unwrap_or(defaults.queue_capacity),
            consumer_workers: count("CONSUMER_WORKERS")
                .unwrap_or(defaults.consumer_workers),
            enqueue_timeout: millis("ENQUEUE_TIMEOUT_MS"),
            dispatch,
            sink,
            log_level: var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "max chunk size must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.consumer_workers == 0 {
            return Err(ConfigError::Invalid(
                "at least one consumer worker is required".to_string(),
            ));
        }
        if let DispatchMode::Pooled {
            dispatchers,
            backlog,
            ..
        } = self.dispatch
        {
            if dispatchers == 0 || backlog == 0 {
                return Err(ConfigError::Invalid(
                    "dispatch pool needs at least one dispatcher and a non-zero backlog"
                        .to_string(),
                ));
            }
        }

        match &self.sink {
            SinkConfig::Http { endpoint, .. } if endpoint.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "HTTP sink requires an endpoint".to_string(),
                ));
            }
            SinkConfig::File { path, rotation } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid(
                        "file sink requires a path".to_string(),
                    ));
                }
                if let FileRotation::Size { max_bytes: 0, .. } = rotation {
                    return Err(ConfigError::Invalid(
                        "file rotation size must be greater than 0".to_string(),
                    ));
                }
            }
            _ => {}
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}
