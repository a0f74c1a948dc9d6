//! File-backed progress cursor.
//!
//! The cursor is a small JSON document next to the CSV output. Writes go to a
//! temporary file in the same directory which is fsynced and then renamed over
//! the old cursor, so a reader after a crash sees either the previous or the
//! new value. On unix the directory is fsynced too, making the rename itself
//! durable.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::models::ProgressCursor;
use crate::traits::ProgressStore;

/// [`ProgressStore`] persisted as JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonProgressTracker {
    path: PathBuf,
}

impl JsonProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_atomically(&self, cursor: &ProgressCursor) -> Result<(), AppError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(cursor)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| AppError::PersistenceError(format!("Failed to replace cursor: {e}")))?;
        sync_dir(&dir)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), AppError> {
    Ok(())
}

impl ProgressStore for JsonProgressTracker {
    fn load(&self) -> Result<ProgressCursor, AppError> {
        if !self.path.exists() {
            tracing::info!("No progress file at {}; starting fresh", self.path.display());
            return Ok(ProgressCursor::initial());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let cursor: ProgressCursor = serde_json::from_str(&raw).map_err(|e| {
            AppError::PersistenceError(format!(
                "Progress file {} is unreadable ({e}); delete it to restart from the first location",
                self.path.display()
            ))
        })?;

        match cursor.last_completed {
            Some(last) => tracing::info!(last_completed = last, "Resuming from saved progress"),
            None => tracing::info!("Progress file present but no location completed yet"),
        }
        Ok(cursor)
    }

    fn advance(&mut self, index: usize) -> Result<ProgressCursor, AppError> {
        let cursor = ProgressCursor::at(index);
        self.write_atomically(&cursor)?;
        tracing::debug!(index, "Progress cursor advanced");
        Ok(cursor)
    }
}
