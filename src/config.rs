//! Configuration for mtpd
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MtpError, Result};
use crate::protocol::consts::storage;

/// Main configuration for an mtpd responder instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Identity (reported by GetDeviceInfo)
    // -------------------------------------------------------------------------
    /// Manufacturer string
    pub manufacturer: String,

    /// Model string
    pub model: String,

    /// Device firmware/software version string
    pub device_version: String,

    /// Serial number string
    pub serial_number: String,

    /// Run in PTP compatibility mode (no vendor extensions advertised)
    pub ptp: bool,

    // -------------------------------------------------------------------------
    // Storage Configuration (consumed by the server binary)
    // -------------------------------------------------------------------------
    /// Filesystem subtree exposed to the host
    pub root_path: PathBuf,

    /// Volume description shown by the host
    pub storage_description: String,

    /// Storage id advertised for the subtree
    pub storage_id: u32,

    /// Expose the subtree's children directly at the storage root instead
    /// of a single named folder
    pub hidden_root: bool,

    /// Bytes held back from the advertised free space
    pub reserve_space: u64,

    /// Largest acceptable incoming file; 0 disables the check
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manufacturer: "unknown manufacturer".to_string(),
            model: "MTP Device".to_string(),
            device_version: "1.0".to_string(),
            serial_number: "????????".to_string(),
            ptp: false,
            root_path: PathBuf::from("."),
            storage_description: "storage".to_string(),
            storage_id: storage::FIRST_STORAGE_ID,
            hidden_root: true,
            reserve_space: 100 * 1024 * 1024,
            max_file_size: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file; absent fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| MtpError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn manufacturer(mut self, value: impl Into<String>) -> Self {
        self.config.manufacturer = value.into();
        self
    }

    pub fn model(mut self, value: impl Into<String>) -> Self {
        self.config.model = value.into();
        self
    }

    pub fn device_version(mut self, value: impl Into<String>) -> Self {
        self.config.device_version = value.into();
        self
    }

    pub fn serial_number(mut self, value: impl Into<String>) -> Self {
        self.config.serial_number = value.into();
        self
    }

    pub fn ptp(mut self, value: bool) -> Self {
        self.config.ptp = value;
        self
    }

    pub fn root_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.root_path = value.into();
        self
    }

    pub fn storage_description(mut self, value: impl Into<String>) -> Self {
        self.config.storage_description = value.into();
        self
    }

    pub fn storage_id(mut self, value: u32) -> Self {
        self.config.storage_id = value;
        self
    }

    pub fn hidden_root(mut self, value: bool) -> Self {
        self.config.hidden_root = value;
        self
    }

    pub fn reserve_space(mut self, value: u64) -> Self {
        self.config.reserve_space = value;
        self
    }

    pub fn max_file_size(mut self, value: u64) -> Self {
        self.config.max_file_size = value;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
