//! Object Database Module
//!
//! The per-object metadata database behind the transaction engine.
//!
//! ## Responsibilities
//! - Map 32-bit object handles to object records
//! - Enumerate directories lazily, on first listing
//! - Track tentative records reserved by SendObjectInfo
//! - Answer and mutate per-object properties
//!
//! The engine depends only on the [`Database`] trait; [`ObjectDb`] is the
//! filesystem-backed implementation. Event notification flows the other
//! way through a weak [`EventSink`] the engine installs when a session
//! opens, so neither side owns the other.

mod fs;
pub mod record;

pub use fs::ObjectDb;
pub use record::{guess_format, ObjectRecord};

use std::path::{Path, PathBuf};
use std::sync::Weak;

use crate::protocol::consts::data_type;

/// 32-bit object identifier, unique for the responder's lifetime
pub type ObjectHandle = u32;

/// 32-bit storage identifier assigned at registration
pub type StorageId = u32;

/// Database operations fail with an MTP response code
pub type DbResult<T> = std::result::Result<T, u16>;

/// Receives object lifecycle notifications raised by the database
/// (e.g. records discovered during a lazy scan).
pub trait EventSink: Send + Sync {
    fn object_added(&self, handle: ObjectHandle);
    fn object_removed(&self, handle: ObjectHandle);
}

/// A typed property value together with its wire encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Text(String),
}

impl PropValue {
    /// Dataset type code announcing this value on the wire
    pub fn data_type(&self) -> u16 {
        match self {
            PropValue::U16(_) => data_type::UINT16,
            PropValue::U32(_) => data_type::UINT32,
            PropValue::U64(_) => data_type::UINT64,
            PropValue::U128(_) => data_type::UINT128,
            PropValue::Text(_) => data_type::STR,
        }
    }
}

/// ObjectInfo dataset, as consumed by GetObjectInfo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub format: u16,
    pub protection_status: u16,
    pub compressed_size: u32,
    pub parent: u32,
    pub association_type: u16,
    pub association_desc: u32,
    pub name: String,
    pub date_modified: i64,
}

/// The metadata database capability the transaction engine runs against
pub trait Database: Send {
    /// Whether `handle` was ever assigned by this database.
    fn is_valid(&self, handle: ObjectHandle) -> bool;

    /// Ingest a storage mount point. With `hidden` set the subtree's
    /// children become the storage's top level; otherwise the root itself
    /// is the single top-level folder named `display_name`.
    fn add_storage_path(&mut self, path: &Path, display_name: &str, storage: StorageId, hidden: bool);

    /// Drop every record belonging to `storage`.
    fn remove_storage(&mut self, storage: StorageId);

    /// Reserve a handle for an incoming object. Returns `None` when the
    /// target placement is rejected.
    fn begin_send(
        &mut self,
        path: &Path,
        format: u16,
        parent: ObjectHandle,
        storage: StorageId,
        size: u64,
        modified: i64,
    ) -> Option<ObjectHandle>;

    /// Commit or roll back a reservation made by [`Database::begin_send`].
    /// On success the on-disk size is re-read (an edit may have changed it).
    fn end_send(&mut self, handle: ObjectHandle, format: u16, succeeded: bool);

    /// Handles matching the filter. `storage` 0xFFFFFFFF matches all
    /// storages, `format` 0 all formats, `parent` 0xFFFFFFFF aliases the
    /// storage root. Scans the parent directory first if it has not been
    /// enumerated yet.
    fn list(&mut self, storage: StorageId, format: u16, parent: ObjectHandle) -> Vec<ObjectHandle>;

    /// `list(...).len()` without materializing the handles for the caller.
    fn count(&mut self, storage: StorageId, format: u16, parent: ObjectHandle) -> usize;

    /// Read a single property.
    fn get_prop(&self, handle: ObjectHandle, prop: u16) -> DbResult<PropValue>;

    /// Write a single property. Only `OBJECT_FILE_NAME` (renames on disk)
    /// and `PARENT_OBJECT` (record-only) are writable.
    fn set_prop(&mut self, handle: ObjectHandle, prop: u16, value: PropValue) -> DbResult<()>;

    /// Property quadruples for one object (`depth` 0) or a directory's
    /// immediate children (`depth` 1). `prop` 0xFFFFFFFF selects every
    /// supported property.
    fn get_prop_list(
        &mut self,
        handle: ObjectHandle,
        format: u32,
        prop: u32,
        group: u32,
        depth: u32,
    ) -> DbResult<Vec<(ObjectHandle, u16, PropValue)>>;

    /// Populate the ObjectInfo dataset.
    fn get_object_info(&self, handle: ObjectHandle) -> DbResult<ObjectInfo>;

    /// `(path, size, format)` for the streaming operations.
    fn get_file_path(&self, handle: ObjectHandle) -> DbResult<(PathBuf, u64, u16)>;

    /// Remove `handle` and every transitive descendant record.
    fn delete(&mut self, handle: ObjectHandle) -> DbResult<()>;

    /// Reparent the record. Metadata only; no disk move.
    fn move_object(&mut self, handle: ObjectHandle, new_parent: ObjectHandle) -> DbResult<()>;

    /// Object references: the object's children, by convention.
    fn references(&mut self, handle: ObjectHandle) -> DbResult<Vec<ObjectHandle>>;

    /// A session opened; lifecycle notifications flow into `events` until
    /// [`Database::session_ended`].
    fn session_started(&mut self, events: Weak<dyn EventSink>);

    /// The session closed; stop notifying.
    fn session_ended(&mut self);
}
