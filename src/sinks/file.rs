//! The file sink with rotation (§4.7). Rotation trigger: a write that would
//! push the file above `max_bytes` rotates `.1`, `.2`, ... up to
//! `backup_count`, then reopens the base path. Writes are flushed
//! immediately after each batch to bound crash loss.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use lumen_common::Event;
use tokio::fs::File as AsyncFile;
use tokio::io::AsyncWriteExt;

use crate::error::ConfigError;
use crate::sink::{Sink, SinkError, SinkUri};

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_BACKUP_COUNT: u32 = 5;

struct RotationState {
    current_size: u64,
}

pub struct FileSink {
    path: PathBuf,
    max_bytes: u64,
    backup_count: u32,
    state: Mutex<RotationState>,
}

impl FileSink {
    pub fn from_uri(uri: &SinkUri) -> Result<Self, ConfigError> {
        uri.reject_unknown_params(&["max_bytes", "backup_count"])?;

        let max_bytes = match uri.param("max_bytes") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidSetting {
                field: "max_bytes".to_string(),
                reason: format!("`{raw}` is not a valid byte count"),
            })?,
            None => DEFAULT_MAX_BYTES,
        };
        let backup_count = match uri.param("backup_count") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidSetting {
                field: "backup_count".to_string(),
                reason: format!("`{raw}` is not a valid backup count"),
            })?,
            None => DEFAULT_BACKUP_COUNT,
        };

        let path = PathBuf::from(uri.host.as_deref().unwrap_or("").to_string() + &uri.path);
        let path = if path.as_os_str().is_empty() {
            PathBuf::from(uri.raw().trim_start_matches("file://"))
        } else {
            path
        };

        let current_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        Ok(FileSink {
            path,
            max_bytes,
            backup_count,
            state: Mutex::new(RotationState { current_size }),
        })
    }

    async fn rotate(&self) -> std::io::Result<()> {
        for index in (1..self.backup_count).rev() {
            let from = self.backup_path(index);
            let to = self.backup_path(index + 1);
            if tokio::fs::metadata(&from).await.is_ok() {
                let _ = tokio::fs::rename(&from, &to).await;
            }
        }
        if self.backup_count > 0 {
            let first_backup = self.backup_path(1);
            if tokio::fs::metadata(&self.path).await.is_ok() {
                let _ = tokio::fs::rename(&self.path, &first_backup).await;
            }
        }

        let beyond = self.backup_path(self.backup_count + 1);
        let _ = tokio::fs::remove_file(&beyond).await;

        Ok(())
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn initialize(&self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| SinkError::permanent(err.to_string()))?;
            }
        }
        Ok(())
    }

    async fn write_batch(&self, batch: &[Event]) -> Result<(), SinkError> {
        let mut rendered = String::new();
        for event in batch {
            rendered.push_str(&event.to_json_string());
            rendered.push('\n');
        }
        let bytes = rendered.as_bytes();

        let would_exceed = {
            let state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.current_size + bytes.len() as u64 > self.max_bytes && state.current_size > 0
        };

        if would_exceed {
            self.rotate().await.map_err(|err| SinkError::transient(err.to_string()))?;
            self.state.lock().unwrap_or_else(|poison| poison.into_inner()).current_size = 0;
        }

        let mut file = AsyncFile::options()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| SinkError::transient(err.to_string()))?;
        file.write_all(bytes)
            .await
            .map_err(|err| SinkError::transient(err.to_string()))?;
        file.flush().await.map_err(|err| SinkError::transient(err.to_string()))?;

        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).current_size += bytes.len() as u64;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
