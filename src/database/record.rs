//! Object records
//!
//! The in-memory unit of the database, plus format inference from file
//! extensions.

use std::path::{Path, PathBuf};

use crate::protocol::consts::format;

/// One object known to the responder
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Storage the object belongs to
    pub storage_id: u32,

    /// Containing folder's handle, or 0 at the top of a storage
    pub parent: u32,

    /// MTP object format code
    pub format: u16,

    /// Size in bytes (0 for folders)
    pub size: u64,

    /// Name shown to the host
    pub display_name: String,

    /// Backing path on the host filesystem
    pub path: PathBuf,

    /// Modification time, seconds since epoch
    pub modified: i64,

    /// Folders only: children already enumerated into the database
    pub scanned: bool,
}

/// Guess an object format from the file extension.
///
/// Unknown extensions map to `UNDEFINED`; directories never reach this
/// (they are always `ASSOCIATION`).
pub fn guess_format(path: &Path) -> u16 {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return format::UNDEFINED,
    };

    match ext.as_str() {
        "gif" => format::GIF,
        "png" => format::PNG,
        "jpeg" => format::JFIF,
        "tiff" => format::TIFF,
        "ogg" => format::OGG,
        "mp3" => format::MP3,
        "wav" => format::WAV,
        "wma" => format::WMA,
        "aac" => format::AAC,
        "flac" => format::FLAC,
        _ => format::UNDEFINED,
    }
}
