//! Storage descriptor
//!
//! A storage is a named volume rooted at a host filesystem path. The
//! descriptor is passive: the engine queries it when answering
//! GetStorageInfo and when validating incoming transfers, and the object
//! database ingests its mount path separately.

use std::path::{Path, PathBuf};

use crate::protocol::consts::storage;

/// A mounted storage volume
#[derive(Debug, Clone)]
pub struct MtpStorage {
    id: u32,
    path: PathBuf,
    description: String,
    reserve_space: u64,
    removable: bool,
    max_file_size: u64,
}

impl MtpStorage {
    /// Describe a volume rooted at `path`.
    ///
    /// `reserve_space` is held back from the advertised free space so the
    /// host cannot fill the disk completely. `max_file_size` of 0 disables
    /// the incoming-size check.
    pub fn new(
        id: u32,
        path: impl Into<PathBuf>,
        description: impl Into<String>,
        reserve_space: u64,
        removable: bool,
        max_file_size: u64,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            description: description.into(),
            reserve_space,
            removable,
            max_file_size,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// StorageInfo `storage type` field
    pub fn storage_type(&self) -> u16 {
        if self.removable {
            storage::TYPE_REMOVABLE_RAM
        } else {
            storage::TYPE_FIXED_RAM
        }
    }

    /// StorageInfo `filesystem type` field
    pub fn filesystem_type(&self) -> u16 {
        storage::FILESYSTEM_GENERIC_HIERARCHICAL
    }

    /// StorageInfo `access capability` field
    pub fn access_capability(&self) -> u16 {
        storage::ACCESS_READ_WRITE
    }

    /// Total capacity of the backing volume in bytes
    pub fn max_capacity(&self) -> u64 {
        match fs2::total_space(&self.path) {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!("total_space({}) failed: {}", self.path.display(), e);
                0
            }
        }
    }

    /// Free space in bytes, less the configured reserve
    pub fn free_space(&self) -> u64 {
        match fs2::available_space(&self.path) {
            Ok(avail) => avail.saturating_sub(self.reserve_space),
            Err(e) => {
                tracing::warn!("available_space({}) failed: {}", self.path.display(), e);
                0
            }
        }
    }

    /// Largest file this storage accepts; 0 means unlimited
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_capacity_accessors() {
        let dir = tempdir().unwrap();
        let store = MtpStorage::new(
            storage::FIRST_STORAGE_ID,
            dir.path(),
            "card",
            0,
            true,
            1024,
        );

        assert_eq!(store.id(), storage::FIRST_STORAGE_ID);
        assert_eq!(store.storage_type(), storage::TYPE_REMOVABLE_RAM);
        assert!(store.max_capacity() > 0);
        assert!(store.free_space() <= store.max_capacity());
        assert_eq!(store.max_file_size(), 1024);
    }

    #[test]
    fn test_reserve_subtracts_from_free_space() {
        let dir = tempdir().unwrap();
        let open = MtpStorage::new(1, dir.path(), "open", 0, false, 0);
        let reserved = MtpStorage::new(2, dir.path(), "reserved", u64::MAX, false, 0);

        assert_eq!(open.storage_type(), storage::TYPE_FIXED_RAM);
        assert_eq!(reserved.free_space(), 0);
        assert!(open.free_space() >= reserved.free_space());
    }
}
