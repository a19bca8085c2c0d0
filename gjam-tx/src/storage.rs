//! Storage medium availability
//!
//! A session checks the medium before opening any file, so "card not present"
//! and "file missing" are reported separately.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageStatus {
    Mounted,
    NotPresent,
    /// Present but cannot be listed (permissions, I/O error)
    Unreadable,
}

impl StorageStatus {
    pub fn is_mounted(self) -> bool {
        self == StorageStatus::Mounted
    }
}

impl std::fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStatus::Mounted => write!(f, "mounted"),
            StorageStatus::NotPresent => write!(f, "not present"),
            StorageStatus::Unreadable => write!(f, "unreadable"),
        }
    }
}

pub trait StorageMedium: Send + Sync {
    fn status(&self) -> StorageStatus;

    /// Root the waveform paths are resolved against
    fn root(&self) -> &Path;
}

/// A directory standing in for the removable medium
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageMedium for DirectoryStorage {
    fn status(&self) -> StorageStatus {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => match std::fs::read_dir(&self.root) {
                Ok(_) => StorageStatus::Mounted,
                Err(e) => {
                    debug!("Storage root {} unreadable: {}", self.root.display(), e);
                    StorageStatus::Unreadable
                }
            },
            Ok(_) => StorageStatus::NotPresent,
            Err(e) => {
                debug!("Storage root {} missing: {}", self.root.display(), e);
                StorageStatus::NotPresent
            }
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_directory_is_mounted() {
        let dir = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        assert_eq!(storage.status(), StorageStatus::Mounted);
        assert_eq!(storage.root(), dir.path());
    }

    #[test]
    fn test_missing_directory_is_not_present() {
        let dir = TempDir::new().unwrap();
        let storage = DirectoryStorage::new(dir.path().join("sdcard"));
        assert_eq!(storage.status(), StorageStatus::NotPresent);
        assert!(!storage.status().is_mounted());
    }

    #[test]
    fn test_regular_file_is_not_present() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("card");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(DirectoryStorage::new(&file).status(), StorageStatus::NotPresent);
    }
}
