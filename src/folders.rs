//! Directory management under the store's base directory.
//!
//! Covers both the folder owned by each trainee record and the ad-hoc folders
//! the front-end lets users create, rename and delete by name.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app_response::{AppResponse, AppResult};

#[derive(Debug, Clone)]
pub struct ClientFolders {
    base_dir: PathBuf,
}

impl ClientFolders {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create(&self, name: &str) -> AppResult<String> {
        let path = self.resolve(name)?;
        if path.exists() {
            return Err(AppResponse::Conflict(format!("Folder {name} already exists")));
        }
        fs::create_dir_all(&path).map_err(|e| {
            AppResponse::StorageError(format!("Failed to create folder {name}: {e}"))
        })?;
        info!("Created folder {}", path.display());
        Ok(name.trim().to_string())
    }

    /// Names of the directories directly under the base directory, sorted.
    pub fn list(&self) -> AppResult<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            AppResponse::StorageError(format!("Failed to read folders: {e}"))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {e}");
                    continue;
                }
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> AppResult<String> {
        let old_path = self.resolve(old_name)?;
        let new_path = self.resolve(new_name)?;

        if !old_path.is_dir() {
            return Err(AppResponse::NotFound(format!("Folder {old_name} does not exist")));
        }
        if new_path.exists() {
            return Err(AppResponse::Conflict(format!("Folder {new_name} already exists")));
        }

        fs::rename(&old_path, &new_path).map_err(|e| {
            AppResponse::StorageError(format!("Failed to rename folder {old_name}: {e}"))
        })?;
        info!("Renamed folder {} -> {}", old_path.display(), new_path.display());
        Ok(new_name.trim().to_string())
    }

    pub fn delete(&self, name: &str) -> AppResult<bool> {
        let path = self.resolve(name)?;
        if !path.is_dir() {
            return Err(AppResponse::NotFound(format!("Folder {name} does not exist")));
        }
        fs::remove_dir_all(&path).map_err(|e| {
            AppResponse::StorageError(format!("Failed to delete folder {name}: {e}"))
        })?;
        info!("Deleted folder {}", path.display());
        Ok(true)
    }

    /// Create the folder owned by a record. Existing directories are reused.
    pub fn ensure_client_dir(&self, path: &Path) -> AppResult<()> {
        fs::create_dir_all(path).map_err(|e| {
            AppResponse::StorageError(format!(
                "Failed to create client folder {}: {e}",
                path.display()
            ))
        })
    }

    /// Remove the folder owned by a deleted record.
    ///
    /// Failures are logged and reported as `false`; record deletion goes
    /// ahead regardless.
    pub fn remove_client_dir(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() || !path.exists() {
            return false;
        }
        if !path.starts_with(&self.base_dir) || path == self.base_dir {
            warn!(
                "Not removing {}: outside of {}",
                path.display(),
                self.base_dir.display()
            );
            return false;
        }

        match fs::remove_dir_all(path) {
            Ok(()) => {
                info!("Removed client folder {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove client folder {}: {e}", path.display());
                false
            }
        }
    }

    /// A single path component under the base directory.
    fn resolve(&self, name: &str) -> AppResult<PathBuf> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\', '\0'])
        {
            return Err(AppResponse::ValidationError(format!("Invalid folder name: {name:?}")));
        }
        Ok(self.base_dir.join(trimmed))
    }
}
