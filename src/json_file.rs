//! Whole-document JSON persistence.
//!
//! The collection is always read and written as one array. Writes go to a
//! sibling `.tmp` file first and are renamed over the target, so a crash
//! mid-write leaves the previous document in place.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::app_response::{AppResponse, AppResult};

#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the raw array.
    ///
    /// Returns `Ok(None)` when the file does not exist yet; the parent
    /// directory is created so the first save cannot fail on it.
    pub fn load(&self) -> AppResult<Option<Vec<JsonValue>>> {
        if !self.path.exists() {
            self.ensure_parent()?;
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            AppResponse::StorageError(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        if contents.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let records: Vec<JsonValue> = serde_json::from_str(&contents).map_err(|e| {
            AppResponse::StorageError(format!("Failed to parse {}: {e}", self.path.display()))
        })?;

        debug!("Loaded {} raw records from {}", records.len(), self.path.display());
        Ok(Some(records))
    }

    /// Serialize `records` and replace the file.
    pub fn save<T: Serialize>(&self, records: &[T]) -> AppResult<()> {
        self.ensure_parent()?;

        let json = serde_json::to_string_pretty(records)?;
        let tmp_path = self.tmp_path();

        fs::write(&tmp_path, json).map_err(|e| {
            AppResponse::StorageError(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            // Best-effort; the rename error is the one reported.
            let _ = fs::remove_file(&tmp_path);
            return Err(AppResponse::StorageError(format!(
                "Failed to replace {} with {}: {e}",
                self.path.display(),
                tmp_path.display()
            )));
        }

        Ok(())
    }

    /// Move an unreadable file out of the way so later saves cannot overwrite it.
    ///
    /// Returns where the file went.
    pub fn quarantine(&self) -> AppResult<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "store.json".to_string());
        let target = self.path.with_file_name(format!(
            "{file_name}.corrupt-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));

        fs::rename(&self.path, &target).map_err(|e| {
            AppResponse::StorageError(format!(
                "Failed to move unreadable {} aside: {e}",
                self.path.display()
            ))
        })?;

        warn!("Unreadable store file moved to {}", target.display());
        Ok(target)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn ensure_parent(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppResponse::StorageError(format!(
                        "Failed to create store directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(())
    }
}
