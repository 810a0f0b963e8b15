//! Operation handlers
//!
//! One handler per MTP operation. Handlers are methods over the locked
//! engine state: they read request parameters and the Data-in buffer,
//! call into the database and storages, fill the Data-out buffer and
//! response parameters, and return the response code. Infrastructure
//! failures bubble out as errors; the loop maps them to `GENERAL_ERROR`
//! or, for a host-side cancel, elides the response.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Weak};

use crate::database::{Database, EventSink, PropValue};
use crate::error::Result;
use crate::protocol::consts::{
    device_prop, format, op, operation_name, property, response, data_type, PARENT_ROOT,
    STANDARD_VERSION,
};
use crate::protocol::datetime::parse_date_time;
use crate::protocol::{DataPacket, RequestPacket};
use crate::transport::Transport;

use super::io::{delete_path, receive_file, send_file};
use super::{EditSession, EventQueue, SendState, ServerState, Session};

/// Announced size meaning "length unknown, stream until short packet"
const SIZE_UNKNOWN: u64 = 0xFFFF_FFFF;

/// SendObject/SendPartialObject read the Data header plus any initial
/// payload bytes in one small packet before streaming the rest to disk.
const INITIAL_READ_SIZE: usize = 512;

// =============================================================================
// Capability Tables (announced by GetDeviceInfo)
// =============================================================================

pub(crate) const SUPPORTED_OPERATIONS: &[u16] = &[
    op::GET_DEVICE_INFO,
    op::OPEN_SESSION,
    op::CLOSE_SESSION,
    op::GET_STORAGE_IDS,
    op::GET_STORAGE_INFO,
    op::GET_NUM_OBJECTS,
    op::GET_OBJECT_HANDLES,
    op::GET_OBJECT_INFO,
    op::GET_OBJECT,
    op::GET_THUMB,
    op::DELETE_OBJECT,
    op::SEND_OBJECT_INFO,
    op::SEND_OBJECT,
    op::GET_DEVICE_PROP_DESC,
    op::GET_DEVICE_PROP_VALUE,
    op::SET_DEVICE_PROP_VALUE,
    op::RESET_DEVICE_PROP_VALUE,
    op::MOVE_OBJECT,
    op::GET_PARTIAL_OBJECT,
    op::GET_OBJECT_PROPS_SUPPORTED,
    op::GET_OBJECT_PROP_DESC,
    op::GET_OBJECT_PROP_VALUE,
    op::SET_OBJECT_PROP_VALUE,
    op::GET_OBJECT_PROP_LIST,
    op::GET_OBJECT_REFERENCES,
    op::SET_OBJECT_REFERENCES,
    // Android extension for direct file IO
    op::GET_PARTIAL_OBJECT_64,
    op::SEND_PARTIAL_OBJECT,
    op::TRUNCATE_OBJECT,
    op::BEGIN_EDIT_OBJECT,
    op::END_EDIT_OBJECT,
];

pub(crate) const SUPPORTED_EVENTS: &[u16] = &[
    crate::protocol::consts::event::OBJECT_ADDED,
    crate::protocol::consts::event::OBJECT_REMOVED,
    crate::protocol::consts::event::STORE_ADDED,
    crate::protocol::consts::event::STORE_REMOVED,
    crate::protocol::consts::event::OBJECT_INFO_CHANGED,
    crate::protocol::consts::event::OBJECT_PROP_CHANGED,
];

const SUPPORTED_DEVICE_PROPERTIES: &[u16] = &[
    device_prop::DEVICE_FRIENDLY_NAME,
    device_prop::SYNCHRONIZATION_PARTNER,
];

const CAPTURE_FORMATS: &[u16] = &[format::ASSOCIATION, format::PNG];

const PLAYBACK_FORMATS: &[u16] = &[
    // Generic files
    format::UNDEFINED,
    format::ASSOCIATION,
    format::TEXT,
    format::HTML,
    // Images
    format::DEFINED,
    format::EXIF_JPEG,
    format::TIFF_EP,
    format::BMP,
    format::GIF,
    format::JFIF,
    format::PNG,
    format::TIFF,
    format::TIFF_IT,
    format::JP2,
    format::JPX,
    // Audio
    format::OGG,
    format::MP3,
    format::WAV,
    format::WMA,
    format::AAC,
    format::FLAC,
    // Albums and playlists
    format::ABSTRACT_AUDIO_ALBUM,
    format::ABSTRACT_AV_PLAYLIST,
];

pub(crate) const SUPPORTED_OBJECT_PROPERTIES: &[u16] = &[
    property::STORAGE_ID,
    property::PARENT_OBJECT,
    property::OBJECT_FORMAT,
    property::OBJECT_SIZE,
    property::OBJECT_FILE_NAME,
    property::DISPLAY_NAME,
    property::PERSISTENT_UID,
    property::ASSOCIATION_TYPE,
    property::ASSOCIATION_DESC,
    property::PROTECTION_STATUS,
    property::DATE_CREATED,
    property::DATE_MODIFIED,
    property::HIDDEN,
    property::NON_CONSUMABLE,
];

/// Wire type and writability of an object property, per the dataset we
/// announce. `None` for properties we do not support.
fn object_prop_desc(prop: u16) -> Option<(u16, bool)> {
    let desc = match prop {
        property::STORAGE_ID => (data_type::UINT32, false),
        property::PARENT_OBJECT => (data_type::UINT32, true),
        property::OBJECT_FORMAT => (data_type::UINT16, false),
        property::OBJECT_SIZE => (data_type::UINT32, false),
        property::OBJECT_FILE_NAME => (data_type::STR, true),
        property::DISPLAY_NAME => (data_type::STR, false),
        property::PERSISTENT_UID => (data_type::UINT128, false),
        property::ASSOCIATION_TYPE => (data_type::UINT16, false),
        property::ASSOCIATION_DESC => (data_type::UINT32, false),
        property::PROTECTION_STATUS => (data_type::UINT16, false),
        property::DATE_CREATED => (data_type::STR, false),
        property::DATE_MODIFIED => (data_type::STR, false),
        property::HIDDEN => (data_type::UINT16, false),
        property::NON_CONSUMABLE => (data_type::UINT16, false),
        _ => return None,
    };
    Some(desc)
}

fn put_value(data: &mut DataPacket, value: &PropValue) {
    match value {
        PropValue::U16(v) => data.put_u16(*v),
        PropValue::U32(v) => data.put_u32(*v),
        PropValue::U64(v) => data.put_u64(*v),
        PropValue::U128(v) => data.put_u128(*v),
        PropValue::Text(s) => data.put_string(s),
    }
}

impl<D: Database> ServerState<D> {
    /// Decode the request and run the matching handler.
    pub(super) fn dispatch<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        request: &RequestPacket,
        events: &Arc<EventQueue>,
    ) -> Result<u16> {
        let operation = request.operation();

        // A SendObjectInfo reservation only survives until the next
        // operation; anything but SendObject invalidates it. The reserved
        // record stays behind for cleanup.
        if !matches!(self.send_state, SendState::Idle) && operation != op::SEND_OBJECT {
            tracing::error!("expected SendObject after SendObjectInfo");
            self.send_state = SendState::Idle;
        }

        match operation {
            op::GET_DEVICE_INFO => self.do_get_device_info(),
            op::OPEN_SESSION => self.do_open_session(request, events),
            op::CLOSE_SESSION => self.do_close_session(),
            op::GET_STORAGE_IDS => self.do_get_storage_ids(),
            op::GET_STORAGE_INFO => self.do_get_storage_info(request),
            op::GET_OBJECT_PROPS_SUPPORTED => self.do_get_object_props_supported(),
            op::GET_OBJECT_HANDLES => self.do_get_object_handles(request),
            op::GET_NUM_OBJECTS => self.do_get_num_objects(request),
            op::GET_OBJECT_REFERENCES => self.do_get_object_references(request),
            op::SET_OBJECT_REFERENCES => self.do_set_object_references(),
            op::GET_OBJECT_PROP_VALUE => self.do_get_object_prop_value(request),
            op::SET_OBJECT_PROP_VALUE => self.do_set_object_prop_value(request),
            op::GET_DEVICE_PROP_VALUE => self.do_get_device_prop_value(request),
            op::SET_DEVICE_PROP_VALUE => Ok(response::DEVICE_PROP_NOT_SUPPORTED),
            op::RESET_DEVICE_PROP_VALUE => Ok(response::DEVICE_PROP_NOT_SUPPORTED),
            op::GET_OBJECT_PROP_LIST => self.do_get_object_prop_list(request),
            op::GET_OBJECT_INFO => self.do_get_object_info(request),
            op::GET_OBJECT => self.do_get_object(transport, request),
            op::GET_THUMB => self.do_get_thumb(transport, request),
            op::GET_PARTIAL_OBJECT | op::GET_PARTIAL_OBJECT_64 => {
                self.do_get_partial_object(transport, request)
            }
            op::SEND_OBJECT_INFO => self.do_send_object_info(request),
            op::SEND_OBJECT => self.do_send_object(transport),
            op::DELETE_OBJECT => self.do_delete_object(request),
            op::MOVE_OBJECT => self.do_move_object(request),
            op::GET_OBJECT_PROP_DESC => self.do_get_object_prop_desc(request),
            op::GET_DEVICE_PROP_DESC => self.do_get_device_prop_desc(request),
            op::SEND_PARTIAL_OBJECT => self.do_send_partial_object(transport, request),
            op::TRUNCATE_OBJECT => self.do_truncate_object(request),
            op::BEGIN_EDIT_OBJECT => self.do_begin_edit_object(request),
            op::END_EDIT_OBJECT => self.do_end_edit_object(request),
            _ => {
                tracing::error!("unsupported operation {}", operation_name(operation));
                Ok(response::OPERATION_NOT_SUPPORTED)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Device & session
    // -------------------------------------------------------------------------

    fn do_get_device_info(&mut self) -> Result<u16> {
        let ptp = self.config.ptp;

        self.data.put_u16(STANDARD_VERSION);
        // MTP vendor extension id; PTP mode advertises none
        self.data.put_u32(if ptp { 0 } else { 6 });
        self.data.put_u16(STANDARD_VERSION);
        if ptp {
            self.data.put_empty_string();
        } else {
            self.data.put_string("microsoft.com: 1.0; android.com: 1.0;");
        }
        self.data.put_u16(0); // functional mode
        self.data.put_u16_array(SUPPORTED_OPERATIONS);
        self.data.put_u16_array(SUPPORTED_EVENTS);
        self.data.put_u16_array(SUPPORTED_DEVICE_PROPERTIES);
        self.data.put_u16_array(CAPTURE_FORMATS);
        self.data.put_u16_array(PLAYBACK_FORMATS);
        self.data.put_string(&self.config.manufacturer);
        self.data.put_string(&self.config.model);
        self.data.put_string(&self.config.device_version);
        self.data.put_string(&self.config.serial_number);

        Ok(response::OK)
    }

    fn do_open_session(
        &mut self,
        request: &RequestPacket,
        events: &Arc<EventQueue>,
    ) -> Result<u16> {
        if let Some(session) = &self.session {
            self.response.set_parameter(1, session.id);
            return Ok(response::SESSION_ALREADY_OPEN);
        }

        self.session = Some(Session {
            id: request.parameter(1),
        });
        let sink: Weak<EventQueue> = Arc::downgrade(events);
        let sink: Weak<dyn EventSink> = sink;
        self.database.session_started(sink);
        Ok(response::OK)
    }

    fn do_close_session(&mut self) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        self.commit_all_edits();
        self.session = None;
        self.database.session_ended();
        Ok(response::OK)
    }

    // -------------------------------------------------------------------------
    // Storages
    // -------------------------------------------------------------------------

    fn do_get_storage_ids(&mut self) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        let ids: Vec<u32> = self.storages.iter().map(|s| s.id()).collect();
        self.data.put_u32_array(&ids);
        Ok(response::OK)
    }

    fn do_get_storage_info(&mut self, request: &RequestPacket) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        let (storage_type, fs_type, access, capacity, free, description) =
            match self.storage(request.parameter(1)) {
                Some(s) => (
                    s.storage_type(),
                    s.filesystem_type(),
                    s.access_capability(),
                    s.max_capacity(),
                    s.free_space(),
                    s.description().to_string(),
                ),
                None => return Ok(response::INVALID_STORAGE_ID),
            };

        self.data.put_u16(storage_type);
        self.data.put_u16(fs_type);
        self.data.put_u16(access);
        self.data.put_u64(capacity);
        self.data.put_u64(free);
        self.data.put_u32(1024 * 1024 * 1024); // free space in objects
        self.data.put_string(&description);
        self.data.put_empty_string(); // volume identifier
        Ok(response::OK)
    }

    // -------------------------------------------------------------------------
    // Enumeration
    // -------------------------------------------------------------------------

    fn do_get_object_props_supported(&mut self) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        self.data.put_u16_array(SUPPORTED_OBJECT_PROPERTIES);
        Ok(response::OK)
    }

    fn do_get_object_handles(&mut self, request: &RequestPacket) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        let storage_id = request.parameter(1); // 0xFFFFFFFF for all storages
        let object_format = request.parameter(2); // 0 for all formats
        let parent = request.parameter(3); // 0xFFFFFFFF for the storage root

        if !self.has_storage(storage_id) {
            return Ok(response::INVALID_STORAGE_ID);
        }

        let handles = self
            .database
            .list(storage_id, object_format as u16, parent);
        self.data.put_u32_array(&handles);
        Ok(response::OK)
    }

    fn do_get_num_objects(&mut self, request: &RequestPacket) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        let storage_id = request.parameter(1);
        let object_format = request.parameter(2);
        let parent = request.parameter(3);

        if !self.has_storage(storage_id) {
            return Ok(response::INVALID_STORAGE_ID);
        }

        let count = self.database.count(storage_id, object_format as u16, parent);
        self.response.set_parameter(1, count as u32);
        Ok(response::OK)
    }

    fn do_get_object_references(&mut self, request: &RequestPacket) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        if !self.database.is_valid(handle) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }

        match self.database.references(handle) {
            Ok(refs) => {
                self.data.put_u32_array(&refs);
                Ok(response::OK)
            }
            Err(code) => Ok(code),
        }
    }

    fn do_set_object_references(&mut self) -> Result<u16> {
        if self.session.is_none() {
            return Ok(response::SESSION_NOT_OPEN);
        }
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        // References are not persisted; accept and discard the list.
        let _references = self.data.get_u32_array()?;
        Ok(response::OK)
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    fn do_get_object_prop_value(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let prop = request.parameter(2) as u16;

        match self.database.get_prop(handle, prop) {
            Ok(value) => {
                put_value(&mut self.data, &value);
                Ok(response::OK)
            }
            Err(code) => Ok(code),
        }
    }

    fn do_set_object_prop_value(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let prop = request.parameter(2) as u16;

        let value = match prop {
            property::OBJECT_FILE_NAME => PropValue::Text(self.data.get_string()?),
            property::PARENT_OBJECT => PropValue::U32(self.data.get_u32()?),
            _ => return Ok(response::OPERATION_NOT_SUPPORTED),
        };

        match self.database.set_prop(handle, prop, value) {
            Ok(()) => Ok(response::OK),
            Err(code) => Ok(code),
        }
    }

    fn do_get_device_prop_value(&mut self, request: &RequestPacket) -> Result<u16> {
        match request.parameter(1) as u16 {
            device_prop::DEVICE_FRIENDLY_NAME | device_prop::SYNCHRONIZATION_PARTNER => {
                self.data.put_empty_string();
                Ok(response::OK)
            }
            _ => Ok(response::OPERATION_NOT_SUPPORTED),
        }
    }

    fn do_get_object_prop_list(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let object_format = request.parameter(2);
        let prop = request.parameter(3);
        let group = request.parameter(4);
        let depth = request.parameter(5);

        let rows = match self
            .database
            .get_prop_list(handle, object_format, prop, group, depth)
        {
            Ok(rows) => rows,
            Err(code) => return Ok(code),
        };

        // ObjectPropList dataset: element count, then
        // (handle, property code, data type, value) per element.
        self.data.put_u32(rows.len() as u32);
        for (row_handle, code, value) in &rows {
            self.data.put_u32(*row_handle);
            self.data.put_u16(*code);
            self.data.put_u16(value.data_type());
            put_value(&mut self.data, value);
        }
        Ok(response::OK)
    }

    fn do_get_object_prop_desc(&mut self, request: &RequestPacket) -> Result<u16> {
        let prop = request.parameter(1) as u16;
        let (wire_type, writable) = match object_prop_desc(prop) {
            Some(desc) => desc,
            None => return Ok(response::OBJECT_PROP_NOT_SUPPORTED),
        };

        self.data.put_u16(prop);
        self.data.put_u16(wire_type);
        self.data.put_u8(writable as u8);
        match wire_type {
            data_type::UINT16 => self.data.put_u16(0),
            data_type::UINT32 => self.data.put_u32(0),
            data_type::UINT128 => self.data.put_u128(0),
            _ => self.data.put_empty_string(),
        }
        self.data.put_u32(0); // group code
        self.data.put_u8(0); // form flag
        Ok(response::OK)
    }

    fn do_get_device_prop_desc(&mut self, request: &RequestPacket) -> Result<u16> {
        let prop = request.parameter(1) as u16;
        match prop {
            device_prop::DEVICE_FRIENDLY_NAME | device_prop::SYNCHRONIZATION_PARTNER => {
                self.data.put_u16(prop);
                self.data.put_u16(data_type::STR);
                self.data.put_u8(0); // read-only
                self.data.put_empty_string(); // factory default
                self.data.put_empty_string(); // current value
                self.data.put_u8(0); // form flag
                Ok(response::OK)
            }
            _ => Ok(response::DEVICE_PROP_NOT_SUPPORTED),
        }
    }

    // -------------------------------------------------------------------------
    // Object info
    // -------------------------------------------------------------------------

    fn do_get_object_info(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let info = match self.database.get_object_info(handle) {
            Ok(info) => info,
            Err(code) => return Ok(code),
        };

        // An open edit makes the database size stale.
        let size = match self.edit_index(handle) {
            Some(index) => self.edits[index].size.min(u32::MAX as u64) as u32,
            None => info.compressed_size,
        };

        self.data.put_u32(info.storage_id);
        self.data.put_u16(info.format);
        self.data.put_u16(info.protection_status);
        self.data.put_u32(size);
        self.data.put_u16(0); // thumb format
        self.data.put_u32(0); // thumb compressed size
        self.data.put_u32(0); // thumb pix width
        self.data.put_u32(0); // thumb pix height
        self.data.put_u32(0); // image pix width
        self.data.put_u32(0); // image pix height
        self.data.put_u32(0); // image bit depth
        self.data.put_u32(info.parent);
        self.data.put_u16(info.association_type);
        self.data.put_u32(info.association_desc);
        self.data.put_u32(0); // sequence number
        self.data.put_string(&info.name);
        self.data.put_empty_string(); // date created
        self.data
            .put_string(&crate::protocol::datetime::format_date_time(
                info.date_modified,
            ));
        self.data.put_empty_string(); // keywords
        Ok(response::OK)
    }

    // -------------------------------------------------------------------------
    // Reads (streamed)
    // -------------------------------------------------------------------------

    fn do_get_object<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        request: &RequestPacket,
    ) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let (path, size, _) = match self.database.get_file_path(handle) {
            Ok(found) => found,
            Err(code) => return Ok(code),
        };

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("open {} failed: {}", path.display(), e);
                return Ok(response::GENERAL_ERROR);
            }
        };

        send_file(
            transport,
            &mut file,
            0,
            size,
            request.operation(),
            request.transaction_id(),
        )?;
        Ok(response::OK)
    }

    fn do_get_partial_object<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        request: &RequestPacket,
    ) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let (offset, length) = if request.operation() == op::GET_PARTIAL_OBJECT_64 {
            // Android extension: 64-bit offset split across two parameters
            let offset =
                request.parameter(2) as u64 | ((request.parameter(3) as u64) << 32);
            (offset, request.parameter(4))
        } else {
            (request.parameter(2) as u64, request.parameter(3))
        };

        let (path, _, _) = match self.database.get_file_path(handle) {
            Ok(found) => found,
            Err(code) => return Ok(code),
        };

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("open {} failed: {}", path.display(), e);
                return Ok(response::GENERAL_ERROR);
            }
        };

        let sent = send_file(
            transport,
            &mut file,
            offset,
            length as u64,
            request.operation(),
            request.transaction_id(),
        )?;
        self.response.set_parameter(1, sent as u32);
        Ok(response::OK)
    }

    fn do_get_thumb<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        request: &RequestPacket,
    ) -> Result<u16> {
        // Thumbnails are stubbed: an empty Data payload satisfies hosts
        // that insist on asking.
        self.data.reset();
        self.data
            .write(transport, request.operation(), request.transaction_id())?;
        self.data.reset();
        Ok(response::OK)
    }

    // -------------------------------------------------------------------------
    // Writes (streamed)
    // -------------------------------------------------------------------------

    fn do_send_object_info(&mut self, request: &RequestPacket) -> Result<u16> {
        let storage_id = request.parameter(1);
        let (storage_root, free_space, max_file_size) = match self.storage(storage_id) {
            Some(s) => (s.path().to_path_buf(), s.free_space(), s.max_file_size()),
            None => return Ok(response::INVALID_STORAGE_ID),
        };

        let mut parent = request.parameter(2);
        let parent_path = if parent == PARENT_ROOT {
            parent = 0;
            storage_root
        } else {
            let (path, _, parent_format) = match self.database.get_file_path(parent) {
                Ok(found) => found,
                Err(code) => return Ok(code),
            };
            if parent_format != format::ASSOCIATION {
                return Ok(response::INVALID_PARENT_OBJECT);
            }
            path
        };

        // Read every ObjectInfo field; only a few matter here.
        self.data.get_u32()?; // storage id
        let object_format = self.data.get_u16()?;
        self.data.get_u16()?; // protection status
        let announced_size = self.data.get_u32()? as u64;
        self.data.get_u16()?; // thumb format
        self.data.get_u32()?; // thumb compressed size
        self.data.get_u32()?; // thumb pix width
        self.data.get_u32()?; // thumb pix height
        self.data.get_u32()?; // image pix width
        self.data.get_u32()?; // image pix height
        self.data.get_u32()?; // image bit depth
        self.data.get_u32()?; // parent
        self.data.get_u16()?; // association type
        self.data.get_u32()?; // association desc
        self.data.get_u32()?; // sequence number
        let name = self.data.get_string()?;
        let _created = self.data.get_string()?;
        let modified_text = self.data.get_string()?;
        // keywords follow, unread

        let modified = parse_date_time(&modified_text).unwrap_or(0);
        let target = parent_path.join(&name);

        if announced_size > free_space {
            return Ok(response::STORAGE_FULL);
        }
        if max_file_size != 0 {
            // An announced 0xFFFFFFFF only promises "at least this much",
            // which already exceeds any bounded storage.
            if announced_size > max_file_size || announced_size == SIZE_UNKNOWN {
                return Ok(response::OBJECT_TOO_LARGE);
            }
        }

        tracing::debug!(
            "SendObjectInfo {} parent {} storage {:#010x}",
            target.display(),
            parent,
            storage_id
        );

        let handle = match self.database.begin_send(
            &target,
            object_format,
            parent,
            storage_id,
            announced_size,
            modified,
        ) {
            Some(handle) => handle,
            None => return Ok(response::GENERAL_ERROR),
        };

        if object_format == format::ASSOCIATION {
            match fs::create_dir(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    tracing::error!("mkdir {} failed: {}", target.display(), e);
                    return Ok(response::GENERAL_ERROR);
                }
            }
            // No SendObject follows for folders; commit immediately.
            self.database
                .end_send(handle, format::ASSOCIATION, true);
        } else {
            self.send_state = SendState::PendingInfo {
                handle,
                path: target,
                format: object_format,
                size: announced_size,
            };
        }

        self.response.set_parameter(1, storage_id);
        self.response.set_parameter(2, parent);
        self.response.set_parameter(3, handle);
        Ok(response::OK)
    }

    fn do_send_object<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::GENERAL_ERROR);
        }

        let (handle, path, object_format, announced_size) =
            match std::mem::replace(&mut self.send_state, SendState::Idle) {
                SendState::PendingInfo {
                    handle,
                    path,
                    format,
                    size,
                } => (handle, path, format, size),
                SendState::Idle => {
                    tracing::error!("expected SendObjectInfo before SendObject");
                    return Ok(response::NO_VALID_OBJECT_INFO);
                }
            };

        let code = self.receive_object_body(transport, &path, announced_size);
        // Never echo the received header back as Data-out.
        self.data.reset();

        let succeeded = matches!(code, Ok(response::OK));
        self.database.end_send(handle, object_format, succeeded);
        code
    }

    /// Pull the Data container for SendObject into `path`. Returns the
    /// response code; the partial file is unlinked on any failure.
    fn receive_object_body<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        path: &Path,
        announced_size: u64,
    ) -> Result<u16> {
        let received = match self.data.read_limited(transport, INITIAL_READ_SIZE) {
            Ok(received) => received,
            Err(e) if e.is_cancelled() => return Ok(response::TRANSACTION_CANCELLED),
            Err(e) => {
                tracing::error!("SendObject header read failed: {}", e);
                return Ok(response::GENERAL_ERROR);
            }
        };
        let initial = self.data.payload().to_vec();

        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("create {} failed: {}", path.display(), e);
                return Ok(response::GENERAL_ERROR);
            }
        };

        let stream = |file: &mut File| -> Result<()> {
            file.write_all(&initial)?;
            if announced_size == SIZE_UNKNOWN {
                // Length unknown: a full initial packet means more is
                // coming until the host sends a short one.
                if received == INITIAL_READ_SIZE {
                    receive_file(transport, file, None)?;
                }
            } else {
                let remaining = announced_size.saturating_sub(initial.len() as u64);
                if remaining > 0 {
                    receive_file(transport, file, Some(remaining))?;
                }
            }
            Ok(())
        };

        match stream(&mut file) {
            Ok(()) => Ok(response::OK),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(path);
                if e.is_cancelled() {
                    Ok(response::TRANSACTION_CANCELLED)
                } else {
                    tracing::error!("receiving {} failed: {}", path.display(), e);
                    Ok(response::GENERAL_ERROR)
                }
            }
        }
    }

    fn do_send_partial_object<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        request: &RequestPacket,
    ) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let offset = request.parameter(2) as u64 | ((request.parameter(3) as u64) << 32);
        let length = request.parameter(4);

        let index = match self.edit_index(handle) {
            Some(index) => index,
            None => {
                tracing::error!("object {} not open for edit", handle);
                return Ok(response::GENERAL_ERROR);
            }
        };

        // Writes must land at or before the current end of file.
        if offset > self.edits[index].size {
            tracing::debug!(
                "write past end of object: offset {} size {}",
                offset,
                self.edits[index].size
            );
            return Ok(response::GENERAL_ERROR);
        }

        tracing::debug!(
            "receiving partial {} at offset {} length {}",
            self.edits[index].path.display(),
            offset,
            length
        );

        self.response.set_parameter(1, 0);
        match self.data.read_limited(transport, INITIAL_READ_SIZE) {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => return Ok(response::TRANSACTION_CANCELLED),
            Err(e) => {
                tracing::error!("SendPartialObject header read failed: {}", e);
                return Ok(response::GENERAL_ERROR);
            }
        }
        let initial = self.data.payload().to_vec();
        // The received bytes must never echo back as Data-out.
        self.data.reset();

        let edit = &mut self.edits[index];
        let stream = |file: &mut File| -> Result<()> {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&initial)?;
            let remaining = (length as u64).saturating_sub(initial.len() as u64);
            if remaining > 0 {
                receive_file(transport, file, Some(remaining))?;
            }
            Ok(())
        };

        match stream(&mut edit.file) {
            Ok(()) => {
                edit.size = edit.size.max(offset + length as u64);
                self.response.set_parameter(1, length);
                Ok(response::OK)
            }
            Err(e) if e.is_cancelled() => Ok(response::TRANSACTION_CANCELLED),
            Err(e) => {
                tracing::error!("partial write to object {} failed: {}", handle, e);
                Ok(response::GENERAL_ERROR)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Delete / move
    // -------------------------------------------------------------------------

    fn do_delete_object(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        // parameter 2 (format filter) is accepted but not applied

        let (path, _, _) = match self.database.get_file_path(handle) {
            Ok(found) => found,
            Err(code) => return Ok(code),
        };

        match self.database.delete(handle) {
            Ok(()) => {
                tracing::debug!("deleting {}", path.display());
                // Only touch the disk once the records are gone.
                delete_path(&path);
                Ok(response::OK)
            }
            Err(code) => Ok(code),
        }
    }

    fn do_move_object(&mut self, request: &RequestPacket) -> Result<u16> {
        if !self.has_storage(0) {
            return Ok(response::INVALID_OBJECT_HANDLE);
        }
        let handle = request.parameter(1);
        let new_parent = request.parameter(3);

        // Metadata-only move: the record is reparented, the file stays put.
        if let Err(code) = self.database.get_file_path(handle) {
            return Ok(code);
        }
        match self.database.move_object(handle, new_parent) {
            Ok(()) => Ok(response::OK),
            Err(code) => Ok(code),
        }
    }

    // -------------------------------------------------------------------------
    // Edit sessions
    // -------------------------------------------------------------------------

    fn do_truncate_object(&mut self, request: &RequestPacket) -> Result<u16> {
        let handle = request.parameter(1);
        let offset = request.parameter(2) as u64 | ((request.parameter(3) as u64) << 32);

        let index = match self.edit_index(handle) {
            Some(index) => index,
            None => {
                tracing::error!("object {} not open for edit", handle);
                return Ok(response::GENERAL_ERROR);
            }
        };

        let edit = &mut self.edits[index];
        match edit.file.set_len(offset) {
            Ok(()) => {
                edit.size = offset;
                Ok(response::OK)
            }
            Err(e) => {
                tracing::error!("truncate of object {} failed: {}", handle, e);
                Ok(response::GENERAL_ERROR)
            }
        }
    }

    fn do_begin_edit_object(&mut self, request: &RequestPacket) -> Result<u16> {
        let handle = request.parameter(1);
        if self.edit_index(handle).is_some() {
            tracing::error!("object {} already open for edit", handle);
            return Ok(response::GENERAL_ERROR);
        }

        let (path, size, object_format) = match self.database.get_file_path(handle) {
            Ok(found) => found,
            Err(code) => return Ok(code),
        };

        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("open {} for edit failed: {}", path.display(), e);
                return Ok(response::GENERAL_ERROR);
            }
        };

        self.edits.push(EditSession {
            handle,
            path,
            size,
            format: object_format,
            file,
        });
        Ok(response::OK)
    }

    fn do_end_edit_object(&mut self, request: &RequestPacket) -> Result<u16> {
        let handle = request.parameter(1);
        let index = match self.edit_index(handle) {
            Some(index) => index,
            None => {
                tracing::error!("object {} not open for edit", handle);
                return Ok(response::GENERAL_ERROR);
            }
        };

        let edit = self.edits.remove(index);
        self.database.end_send(edit.handle, edit.format, true);
        Ok(response::OK)
    }
}
