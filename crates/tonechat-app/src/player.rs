//! Playback sink that spools reply audio to disk.
//!
//! There is no portable audio output in the workspace, so the most recent
//! reply is written to `<spool_dir>/reply.<ext>` where any player can pick
//! it up. `stop` ends the current playback; the file stays.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tonechat_core::error::{Result, ToneChatError};
use tonechat_core::types::AudioClip;
use tonechat_services::AudioPlayer;

pub struct SpoolPlayer {
    dir: PathBuf,
    current: Mutex<Option<PathBuf>>,
}

impl SpoolPlayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    /// File of the clip currently playing, if any.
    pub fn current(&self) -> Option<PathBuf> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AudioPlayer for SpoolPlayer {
    fn play(&self, clip: &AudioClip) -> Result<()> {
        if clip.is_empty() {
            return Err(ToneChatError::Playback("empty audio clip".to_string()));
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ToneChatError::Playback(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        let path = self.dir.join(format!("reply.{}", clip.extension()));
        std::fs::write(&path, &clip.data).map_err(|e| {
            ToneChatError::Playback(format!("cannot write {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), bytes = clip.data.len(), "Reply audio spooled");
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path);
        Ok(())
    }

    fn stop(&self) {
        if let Some(path) = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            tracing::debug!(path = %path.display(), "Playback stopped");
        }
    }

    fn is_playing(&self) -> bool {
        self.current().is_some()
    }
}

/// Expand a leading `~` to the home directory.
pub fn resolve_dir(dir: &str) -> PathBuf {
    if dir.starts_with("~/") || dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(&dir[2..])
    } else {
        PathBuf::from(dir)
    }
}

// =============================================================================
// Tests
// =============================================================================
