//! JSON document storage and the state-directory lock
//!
//! Every persisted artifact (knowledge base, index, ledger, feedback log,
//! custom rules) is a single JSON document read and written wholesale.
//! Writes go to a sibling temp file first and are renamed into place so a
//! crash never leaves a half-written document behind.

use crate::error::{Result, RsiError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Read a JSON document. `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = serde_json::from_str(&content)?;
    Ok(Some(value))
}

/// Read a JSON document, falling back to `T::default()` when the file is
/// missing or unreadable. Used for state that is allowed to self-heal.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path).await {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable document {}: {}", path.display(), e);
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Advisory single-writer lock over the state directory.
///
/// The lock file is created exclusively and removed when the guard drops.
/// A stale lock left behind by a killed process must be removed by hand.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// File name of the lock inside the state directory
    pub const FILE_NAME: &'static str = "rsi.lock";

    /// Acquire the lock, failing with [`RsiError::Locked`] if it is held.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(Self::FILE_NAME);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                use std::io::Write;
                writeln!(file, "{}", std::process::id())?;
                tracing::debug!("Acquired state lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(RsiError::Locked(path)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release state lock {}: {}", self.path.display(), e);
        }
    }
}
