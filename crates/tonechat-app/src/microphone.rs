//! Microphone implementations for the terminal screen.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use tonechat_core::error::{Result, ToneChatError};
use tonechat_services::{AudioSource, Microphone};

/// Streams an audio file in fixed-size chunks, paced like live capture.
pub struct FileMicrophone {
    path: PathBuf,
    chunk_bytes: usize,
    pace: Duration,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>, chunk_bytes: usize, pace: Duration) -> Self {
        Self {
            path: path.into(),
            chunk_bytes: chunk_bytes.max(1),
            pace,
        }
    }
}

#[async_trait]
impl Microphone for FileMicrophone {
    async fn open(&self, content_type: &str) -> Result<Box<dyn AudioSource>> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            ToneChatError::Recognition(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        tracing::debug!(
            path = %self.path.display(),
            bytes = data.len(),
            content_type,
            "Microphone file opened"
        );
        Ok(Box::new(FileSource {
            data,
            offset: 0,
            chunk_bytes: self.chunk_bytes,
            pace: self.pace,
        }))
    }
}

struct FileSource {
    data: Vec<u8>,
    offset: usize,
    chunk_bytes: usize,
    pace: Duration,
}

#[async_trait]
impl AudioSource for FileSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        let end = (self.offset + self.chunk_bytes).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }
}

/// Stand-in when no capture device is configured.
pub struct NoMicrophone;

#[async_trait]
impl Microphone for NoMicrophone {
    async fn open(&self, _content_type: &str) -> Result<Box<dyn AudioSource>> {
        Err(ToneChatError::Recognition(
            "no microphone available; start with --mic-file <audio file>".to_string(),
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
