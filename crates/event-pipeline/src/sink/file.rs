// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-only file sink with size or daily rotation.
//!
//! One payload per line. Writes are serialized under an internal lock, so the sink is safe to
//! share between consumer workers. The file is opened lazily on the first write and parent
//! directories are created as needed.

use crate::config::FileRotation;
use crate::sink::{Sink, SinkError};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

struct OpenFile {
    file: File,
    size: u64,
    opened_on: NaiveDate,
}

pub struct FileSink {
    path: PathBuf,
    rotation: FileRotation,
    state: Mutex<Option<OpenFile>>,
    today: Clock,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, rotation: FileRotation) -> Self {
        Self {
            path: path.into(),
            rotation,
            state: Mutex::new(None),
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, today: Clock) -> Self {
        self.today = today;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<OpenFile, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let size = file.metadata().await?.len();
        Ok(OpenFile {
            file,
            size,
            opened_on: (self.today)(),
        })
    }

    fn should_roll(&self, current: &OpenFile, incoming: u64) -> bool {
        match &self.rotation {
            FileRotation::Never => false,
            FileRotation::Size { max_bytes, .. } => {
                current.size > 0 && current.size + incoming > *max_bytes
            }
            FileRotation::Daily { .. } => (self.today)() != current.opened_on,
        }
    }

    async fn roll(&self, opened_on: NaiveDate) -> Result<(), SinkError> {
        match &self.rotation {
            FileRotation::Never => Ok(()),
            FileRotation::Size { max_backups, .. } => {
                if *max_backups == 0 {
                    return ignore_missing(fs::remove_file(&self.path).await);
                }
                ignore_missing(
                    fs::remove_file(with_suffix(&self.path, &format!(".{max_backups}"))).await,
                )?;
                for index in (1..*max_backups).rev() {
                    ignore_missing(
                        fs::rename(
                            with_suffix(&self.path, &format!(".{index}")),
                            with_suffix(&self.path, &format!(".{}", index + 1)),
                        )
                        .await,
                    )?;
                }
                ignore_missing(fs::rename(&self.path, with_suffix(&self.path, ".1")).await)
            }
            FileRotation::Daily { date_pattern } => {
                let mut suffix = String::from("_");
                write!(suffix, "{}", opened_on.format(date_pattern)).map_err(|_| {
                    SinkError::Config(format!("invalid date pattern '{date_pattern}'"))
                })?;
                ignore_missing(fs::rename(&self.path, with_suffix(&self.path, &suffix)).await)
            }
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn submit(&self, payload: &str) -> Result<bool, SinkError> {
        if payload.is_empty() {
            return Ok(false);
        }
        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload);
        line.push('\n');
        let incoming = line.len() as u64;

        let mut state = self.state.lock().await;

        let current = match state.take() {
            Some(current) => current,
            None => self.open().await?,
        };
        let mut current = if self.should_roll(&current, incoming) {
            let opened_on = current.opened_on;
            drop(current);
            debug!("Rotating event file {}", self.path.display());
            self.roll(opened_on).await?;
            self.open().await?
        } else {
            current
        };

        current.file.write_all(line.as_bytes()).await?;
        current.file.flush().await?;
        current.size += incoming;
        *state = Some(current);

        Ok(true)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn ignore_missing(result: std::io::Result<()>) -> Result<(), SinkError> {
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
