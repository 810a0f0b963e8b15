//! Filesystem-backed object database
//!
//! Storage-rooted lazy scanning over a handle → record map. A directory's
//! children are enumerated on the first listing that needs them; later
//! queries answer from the map without touching the disk again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::UNIX_EPOCH;

use crate::protocol::consts::{
    format, property, response, storage as storage_consts, ASSOCIATION_TYPE_GENERIC_FOLDER,
    INVALID_OBJECT_HANDLE, PARENT_ROOT,
};
use crate::protocol::datetime::format_date_time;

use super::record::{guess_format, ObjectRecord};
use super::{Database, DbResult, EventSink, ObjectHandle, ObjectInfo, PropValue, StorageId};

/// Properties emitted for the "all properties" selector, in dataset order
const ALL_PROPERTIES: [u16; 14] = [
    property::PERSISTENT_UID,
    property::STORAGE_ID,
    property::PARENT_OBJECT,
    property::OBJECT_FORMAT,
    property::OBJECT_SIZE,
    property::OBJECT_FILE_NAME,
    property::DISPLAY_NAME,
    property::ASSOCIATION_TYPE,
    property::ASSOCIATION_DESC,
    property::PROTECTION_STATUS,
    property::DATE_CREATED,
    property::DATE_MODIFIED,
    property::HIDDEN,
    property::NON_CONSUMABLE,
];

/// Wildcard selector for every property
const ALL_PROPERTIES_CODE: u32 = 0xFFFF_FFFF;

fn mtime_of(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn clamp_u32(size: u64) -> u32 {
    size.min(u32::MAX as u64) as u32
}

/// Handle → record map with lazy directory scanning
pub struct ObjectDb {
    /// Next handle to assign; handles are never reused
    next_handle: u32,

    /// All known objects, keyed by handle
    objects: BTreeMap<ObjectHandle, ObjectRecord>,

    /// Where lifecycle notifications go while a session is open
    events: Option<Weak<dyn EventSink>>,
}

impl ObjectDb {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            objects: BTreeMap::new(),
            events: None,
        }
    }

    /// Next handle that will be assigned (monotone, for diagnostics)
    pub fn next_handle(&self) -> u32 {
        self.next_handle
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn notify_added(&self, handle: ObjectHandle) {
        if let Some(sink) = self.events.as_ref().and_then(Weak::upgrade) {
            sink.object_added(handle);
        }
    }

    /// Record one directory entry. IO trouble on a single entry skips it.
    fn insert_entry(&mut self, path: &Path, parent: ObjectHandle, storage: StorageId) {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), e);
                return;
            }
        };

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let record = if meta.is_dir() {
            ObjectRecord {
                storage_id: storage,
                parent,
                format: format::ASSOCIATION,
                size: 0,
                display_name,
                path: path.to_path_buf(),
                modified: mtime_of(&meta),
                scanned: false,
            }
        } else {
            ObjectRecord {
                storage_id: storage,
                parent,
                format: guess_format(path),
                size: meta.len(),
                display_name,
                path: path.to_path_buf(),
                modified: mtime_of(&meta),
                scanned: false,
            }
        };

        let handle = self.next_handle;
        self.next_handle += 1;

        tracing::debug!("adding {} as handle {}", path.display(), handle);
        self.objects.insert(handle, record);
        self.notify_added(handle);
    }

    /// Enumerate a directory's entries into the database and mark the
    /// parent record scanned. Entries are visited in name order so handle
    /// assignment is deterministic.
    fn scan_directory(&mut self, dir: &Path, parent: ObjectHandle, storage: StorageId) {
        let reader = match fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!("read_dir({}) failed: {}", dir.display(), e);
                return;
            }
        };

        let mut entries: Vec<PathBuf> = reader
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in &entries {
            self.insert_entry(path, parent, storage);
        }

        if let Some(record) = self.objects.get_mut(&parent) {
            record.scanned = true;
        }
    }

    /// Record lookup with the protocol-level handle guards applied.
    fn record(&self, handle: ObjectHandle) -> DbResult<&ObjectRecord> {
        if handle == INVALID_OBJECT_HANDLE || handle == PARENT_ROOT {
            return Err(response::INVALID_OBJECT_HANDLE);
        }
        self.objects
            .get(&handle)
            .ok_or(response::INVALID_OBJECT_HANDLE)
    }

    fn record_mut(&mut self, handle: ObjectHandle) -> DbResult<&mut ObjectRecord> {
        if handle == INVALID_OBJECT_HANDLE || handle == PARENT_ROOT {
            return Err(response::INVALID_OBJECT_HANDLE);
        }
        self.objects
            .get_mut(&handle)
            .ok_or(response::INVALID_OBJECT_HANDLE)
    }

    /// One property of one record.
    fn prop_value(&self, handle: ObjectHandle, record: &ObjectRecord, prop: u16) -> DbResult<PropValue> {
        let is_folder = record.format == format::ASSOCIATION;
        let value = match prop {
            property::STORAGE_ID => PropValue::U32(record.storage_id),
            property::PARENT_OBJECT => PropValue::U32(record.parent),
            property::OBJECT_FORMAT => PropValue::U16(record.format),
            property::OBJECT_SIZE => PropValue::U32(clamp_u32(record.size)),
            property::OBJECT_FILE_NAME => PropValue::Text(record.display_name.clone()),
            property::DISPLAY_NAME => PropValue::Text(record.display_name.clone()),
            property::PERSISTENT_UID => PropValue::U128(handle as u128),
            property::ASSOCIATION_TYPE => {
                PropValue::U16(if is_folder { ASSOCIATION_TYPE_GENERIC_FOLDER } else { 0 })
            }
            property::ASSOCIATION_DESC => PropValue::U32(0),
            property::PROTECTION_STATUS => PropValue::U16(0),
            property::DATE_CREATED => PropValue::Text(format_date_time(0)),
            property::DATE_MODIFIED => PropValue::Text(format_date_time(record.modified)),
            property::HIDDEN => PropValue::U16(0),
            property::NON_CONSUMABLE => PropValue::U16(if is_folder { 0 } else { 1 }),
            _ => return Err(response::GENERAL_ERROR),
        };
        Ok(value)
    }

    /// Scan `parent` if it is an unscanned folder record.
    fn scan_if_needed(&mut self, parent: ObjectHandle) {
        let pending = match self.objects.get(&parent) {
            Some(r) if r.format == format::ASSOCIATION && !r.scanned => {
                Some((r.path.clone(), r.storage_id))
            }
            _ => None,
        };
        if let Some((path, storage)) = pending {
            self.scan_directory(&path, parent, storage);
        }
    }

    fn matching_handles(
        &self,
        storage: StorageId,
        object_format: u16,
        parent: ObjectHandle,
    ) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .filter(|(_, r)| storage == PARENT_ROOT || r.storage_id == storage)
            .filter(|(_, r)| r.parent == parent)
            .filter(|(_, r)| object_format == 0 || r.format == object_format)
            .map(|(h, _)| *h)
            .collect()
    }
}

impl Default for ObjectDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for ObjectDb {
    fn is_valid(&self, handle: ObjectHandle) -> bool {
        handle >= 1 && handle < self.next_handle
    }

    fn add_storage_path(&mut self, path: &Path, display_name: &str, storage: StorageId, hidden: bool) {
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => meta,
            Ok(_) => {
                tracing::warn!("{} is not a directory", path.display());
                return;
            }
            Err(e) => {
                tracing::warn!("{} does not exist: {}", path.display(), e);
                return;
            }
        };

        let display_name = if display_name.is_empty() {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            display_name.to_string()
        };

        tracing::info!(
            "ingesting {} as storage {:#010x} ({})",
            path.display(),
            storage,
            display_name
        );

        // A hidden root is parked outside the listable tree; its children
        // surface directly at the storage's top level.
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(
            handle,
            ObjectRecord {
                storage_id: storage,
                parent: if hidden { PARENT_ROOT } else { 0 },
                format: format::ASSOCIATION,
                size: 0,
                display_name,
                path: path.to_path_buf(),
                modified: mtime_of(&meta),
                scanned: false,
            },
        );

        self.scan_directory(path, if hidden { 0 } else { handle }, storage);
    }

    fn remove_storage(&mut self, storage: StorageId) {
        let doomed: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, r)| r.storage_id == storage)
            .map(|(h, _)| *h)
            .collect();
        tracing::debug!("removing {} records of storage {:#010x}", doomed.len(), storage);
        for handle in doomed {
            self.objects.remove(&handle);
        }
    }

    fn begin_send(
        &mut self,
        path: &Path,
        object_format: u16,
        parent: ObjectHandle,
        storage: StorageId,
        size: u64,
        modified: i64,
    ) -> Option<ObjectHandle> {
        if storage == storage_consts::FIXED_RAM && parent == 0 {
            return None;
        }

        let handle = self.next_handle;
        self.next_handle += 1;

        tracing::debug!(
            "reserving handle {} for {} (format {:#06x})",
            handle,
            path.display(),
            object_format
        );

        self.objects.insert(
            handle,
            ObjectRecord {
                storage_id: storage,
                parent,
                format: object_format,
                size,
                display_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.to_path_buf(),
                modified,
                scanned: false,
            },
        );

        Some(handle)
    }

    fn end_send(&mut self, handle: ObjectHandle, object_format: u16, succeeded: bool) {
        if !succeeded {
            self.objects.remove(&handle);
            return;
        }
        if object_format == format::ASSOCIATION {
            return;
        }
        // Resync the on-disk size; this may be the commit of an edit.
        if let Some(record) = self.objects.get_mut(&handle) {
            match fs::metadata(&record.path) {
                Ok(meta) => record.size = meta.len(),
                Err(e) => {
                    tracing::error!("restat of {} failed: {}", record.path.display(), e)
                }
            }
        }
    }

    fn list(&mut self, storage: StorageId, object_format: u16, parent: ObjectHandle) -> Vec<ObjectHandle> {
        let parent = if parent == PARENT_ROOT { 0 } else { parent };
        if parent != 0 {
            self.scan_if_needed(parent);
        }
        self.matching_handles(storage, object_format, parent)
    }

    fn count(&mut self, storage: StorageId, object_format: u16, parent: ObjectHandle) -> usize {
        self.list(storage, object_format, parent).len()
    }

    fn get_prop(&self, handle: ObjectHandle, prop: u16) -> DbResult<PropValue> {
        let record = self.record(handle)?;
        self.prop_value(handle, record, prop)
    }

    fn set_prop(&mut self, handle: ObjectHandle, prop: u16, value: PropValue) -> DbResult<()> {
        match (prop, value) {
            (property::OBJECT_FILE_NAME, PropValue::Text(new_name)) => {
                let record = self.record(handle)?;
                let old_path = record.path.clone();
                let new_path = old_path
                    .parent()
                    .map(|dir| dir.join(&new_name))
                    .ok_or(response::GENERAL_ERROR)?;

                if let Err(e) = fs::rename(&old_path, &new_path) {
                    tracing::error!(
                        "rename {} -> {} failed: {}",
                        old_path.display(),
                        new_path.display(),
                        e
                    );
                    return Err(response::DEVICE_BUSY);
                }

                let record = self.record_mut(handle)?;
                record.display_name = new_name;
                record.path = new_path;
                Ok(())
            }
            (property::PARENT_OBJECT, PropValue::U32(new_parent)) => {
                self.record_mut(handle)?.parent = new_parent;
                Ok(())
            }
            (property::OBJECT_FILE_NAME, _) | (property::PARENT_OBJECT, _) => {
                Err(response::GENERAL_ERROR)
            }
            _ => Err(response::OPERATION_NOT_SUPPORTED),
        }
    }

    fn get_prop_list(
        &mut self,
        handle: ObjectHandle,
        _format: u32,
        prop: u32,
        group: u32,
        depth: u32,
    ) -> DbResult<Vec<(ObjectHandle, u16, PropValue)>> {
        if prop == 0 && group == 0 {
            return Err(response::PARAMETER_NOT_SUPPORTED);
        }
        if group != 0 {
            return Err(response::SPECIFICATION_BY_GROUP_UNSUPPORTED);
        }
        if depth > 1 {
            return Err(response::SPECIFICATION_BY_DEPTH_UNSUPPORTED);
        }

        let handles: Vec<ObjectHandle> = if depth == 0 {
            // A single-object query needs a real record; handle 0 is only
            // meaningful for a depth search.
            self.record(handle)?;
            vec![handle]
        } else {
            if handle != 0 {
                self.scan_if_needed(handle);
            }
            self.objects
                .iter()
                .filter(|(_, r)| r.parent == handle)
                .map(|(h, _)| *h)
                .collect()
        };

        let mut rows = Vec::new();
        for h in handles {
            let record = self.record(h)?;
            if prop == ALL_PROPERTIES_CODE {
                for code in ALL_PROPERTIES {
                    rows.push((h, code, self.prop_value(h, record, code)?));
                }
            } else {
                let code = prop as u16;
                let value = self
                    .prop_value(h, record, code)
                    .map_err(|_| response::OBJECT_PROP_NOT_SUPPORTED)?;
                rows.push((h, code, value));
            }
        }
        Ok(rows)
    }

    fn get_object_info(&self, handle: ObjectHandle) -> DbResult<ObjectInfo> {
        let record = self.record(handle)?;
        let is_folder = record.format == format::ASSOCIATION;
        Ok(ObjectInfo {
            storage_id: record.storage_id,
            format: record.format,
            protection_status: 0,
            compressed_size: clamp_u32(record.size),
            parent: record.parent,
            association_type: if is_folder { ASSOCIATION_TYPE_GENERIC_FOLDER } else { 0 },
            association_desc: 0,
            name: record.display_name.clone(),
            date_modified: record.modified,
        })
    }

    fn get_file_path(&self, handle: ObjectHandle) -> DbResult<(PathBuf, u64, u16)> {
        let record = self.record(handle)?;
        Ok((record.path.clone(), record.size, record.format))
    }

    fn delete(&mut self, handle: ObjectHandle) -> DbResult<()> {
        self.record(handle)?;
        self.objects.remove(&handle);

        // Walk the parent closure iteratively; collect before removing.
        let mut frontier = vec![handle];
        while let Some(parent) = frontier.pop() {
            let children: Vec<ObjectHandle> = self
                .objects
                .iter()
                .filter(|(_, r)| r.parent == parent)
                .map(|(h, _)| *h)
                .collect();
            for child in children {
                self.objects.remove(&child);
                frontier.push(child);
            }
        }
        Ok(())
    }

    fn move_object(&mut self, handle: ObjectHandle, new_parent: ObjectHandle) -> DbResult<()> {
        self.record_mut(handle)?.parent = new_parent;
        Ok(())
    }

    fn references(&mut self, handle: ObjectHandle) -> DbResult<Vec<ObjectHandle>> {
        let (storage, _) = match self.objects.get(&handle) {
            Some(record) => (record.storage_id, record.parent),
            None => return Ok(Vec::new()),
        };
        Ok(self.list(storage, 0, handle))
    }

    fn session_started(&mut self, events: Weak<dyn EventSink>) {
        self.events = Some(events);
    }

    fn session_ended(&mut self) {
        tracing::debug!("objects in db at session end: {}", self.objects.len());
        self.events = None;
    }
}
