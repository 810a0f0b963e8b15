//! MTP code tables
//!
//! Numeric codes for the MTP 1.1 subset this responder speaks, plus the
//! Android direct-file-IO extension operations. Codes cross the wire as
//! raw little-endian integers, so they are plain constants rather than
//! enums: unknown values coming from the host must stay representable.

/// Fixed container header: length (u32) + type (u16) + code (u16) + transaction id (u32)
pub const CONTAINER_HEADER_SIZE: usize = 12;

// Byte offsets of the header fields within a container
pub const CONTAINER_LENGTH_OFFSET: usize = 0;
pub const CONTAINER_TYPE_OFFSET: usize = 4;
pub const CONTAINER_CODE_OFFSET: usize = 6;
pub const CONTAINER_TRANSACTION_ID_OFFSET: usize = 8;

pub const CONTAINER_TYPE_COMMAND: u16 = 1;
pub const CONTAINER_TYPE_DATA: u16 = 2;
pub const CONTAINER_TYPE_RESPONSE: u16 = 3;
pub const CONTAINER_TYPE_EVENT: u16 = 4;

/// MTP standard version reported by GetDeviceInfo (1.00, in centiversions)
pub const STANDARD_VERSION: u16 = 100;

/// Parent parameter alias for "root of the storage"
pub const PARENT_ROOT: u32 = 0xFFFF_FFFF;

/// Handle value that never names an object
pub const INVALID_OBJECT_HANDLE: u32 = 0;

/// Bulk-transfer chunk size used for file streaming and the data buffer
pub const BULK_BUFFER_SIZE: usize = 16 * 1024;

/// Command/response/event containers fit in a single small packet
pub const COMMAND_BUFFER_SIZE: usize = 512;

// =============================================================================
// Operation Codes
// =============================================================================

pub mod op {
    pub const GET_DEVICE_INFO: u16 = 0x1001;
    pub const OPEN_SESSION: u16 = 0x1002;
    pub const CLOSE_SESSION: u16 = 0x1003;
    pub const GET_STORAGE_IDS: u16 = 0x1004;
    pub const GET_STORAGE_INFO: u16 = 0x1005;
    pub const GET_NUM_OBJECTS: u16 = 0x1006;
    pub const GET_OBJECT_HANDLES: u16 = 0x1007;
    pub const GET_OBJECT_INFO: u16 = 0x1008;
    pub const GET_OBJECT: u16 = 0x1009;
    pub const GET_THUMB: u16 = 0x100A;
    pub const DELETE_OBJECT: u16 = 0x100B;
    pub const SEND_OBJECT_INFO: u16 = 0x100C;
    pub const SEND_OBJECT: u16 = 0x100D;
    pub const GET_DEVICE_PROP_DESC: u16 = 0x1014;
    pub const GET_DEVICE_PROP_VALUE: u16 = 0x1015;
    pub const SET_DEVICE_PROP_VALUE: u16 = 0x1016;
    pub const RESET_DEVICE_PROP_VALUE: u16 = 0x1017;
    pub const MOVE_OBJECT: u16 = 0x1019;
    pub const GET_PARTIAL_OBJECT: u16 = 0x101B;
    pub const GET_OBJECT_PROPS_SUPPORTED: u16 = 0x9801;
    pub const GET_OBJECT_PROP_DESC: u16 = 0x9802;
    pub const GET_OBJECT_PROP_VALUE: u16 = 0x9803;
    pub const SET_OBJECT_PROP_VALUE: u16 = 0x9804;
    pub const GET_OBJECT_PROP_LIST: u16 = 0x9805;
    pub const GET_OBJECT_REFERENCES: u16 = 0x9810;
    pub const SET_OBJECT_REFERENCES: u16 = 0x9811;

    // Android extension for direct file IO
    pub const GET_PARTIAL_OBJECT_64: u16 = 0x95C1;
    pub const SEND_PARTIAL_OBJECT: u16 = 0x95C2;
    pub const TRUNCATE_OBJECT: u16 = 0x95C3;
    pub const BEGIN_EDIT_OBJECT: u16 = 0x95C4;
    pub const END_EDIT_OBJECT: u16 = 0x95C5;
}

// =============================================================================
// Response Codes
// =============================================================================

pub mod response {
    pub const OK: u16 = 0x2001;
    pub const GENERAL_ERROR: u16 = 0x2002;
    pub const SESSION_NOT_OPEN: u16 = 0x2003;
    pub const OPERATION_NOT_SUPPORTED: u16 = 0x2005;
    pub const PARAMETER_NOT_SUPPORTED: u16 = 0x2006;
    pub const INCOMPLETE_TRANSFER: u16 = 0x2007;
    pub const INVALID_STORAGE_ID: u16 = 0x2008;
    pub const INVALID_OBJECT_HANDLE: u16 = 0x2009;
    pub const DEVICE_PROP_NOT_SUPPORTED: u16 = 0x200A;
    pub const STORAGE_FULL: u16 = 0x200C;
    pub const OBJECT_TOO_LARGE: u16 = 0x200D;
    pub const NO_VALID_OBJECT_INFO: u16 = 0x2015;
    pub const DEVICE_BUSY: u16 = 0x2019;
    pub const INVALID_PARENT_OBJECT: u16 = 0x201A;
    pub const SESSION_ALREADY_OPEN: u16 = 0x201E;
    pub const TRANSACTION_CANCELLED: u16 = 0x201F;
    pub const OBJECT_PROP_NOT_SUPPORTED: u16 = 0xA80A;
    pub const SPECIFICATION_BY_GROUP_UNSUPPORTED: u16 = 0xA80D;
    pub const SPECIFICATION_BY_DEPTH_UNSUPPORTED: u16 = 0xA80E;
}

// =============================================================================
// Event Codes
// =============================================================================

pub mod event {
    pub const OBJECT_ADDED: u16 = 0x4002;
    pub const OBJECT_REMOVED: u16 = 0x4003;
    pub const STORE_ADDED: u16 = 0x4004;
    pub const STORE_REMOVED: u16 = 0x4005;
    pub const OBJECT_INFO_CHANGED: u16 = 0x4007;
    pub const OBJECT_PROP_CHANGED: u16 = 0xC801;
}

// =============================================================================
// Object Format Codes
// =============================================================================

pub mod format {
    pub const UNDEFINED: u16 = 0x3000;
    /// Folder
    pub const ASSOCIATION: u16 = 0x3001;
    pub const TEXT: u16 = 0x3004;
    pub const HTML: u16 = 0x3005;
    pub const WAV: u16 = 0x3008;
    pub const MP3: u16 = 0x3009;

    /// Generic image
    pub const DEFINED: u16 = 0x3800;
    pub const EXIF_JPEG: u16 = 0x3801;
    pub const TIFF_EP: u16 = 0x3802;
    pub const BMP: u16 = 0x3804;
    pub const GIF: u16 = 0x3807;
    pub const JFIF: u16 = 0x3808;
    pub const PNG: u16 = 0x380B;
    pub const TIFF: u16 = 0x380D;
    pub const TIFF_IT: u16 = 0x380E;
    pub const JP2: u16 = 0x380F;
    pub const JPX: u16 = 0x3810;

    pub const WMA: u16 = 0xB901;
    pub const OGG: u16 = 0xB902;
    pub const AAC: u16 = 0xB903;
    pub const FLAC: u16 = 0xB906;

    pub const ABSTRACT_AUDIO_ALBUM: u16 = 0xBA03;
    pub const ABSTRACT_AV_PLAYLIST: u16 = 0xBA05;
}

// =============================================================================
// Object Property Codes
// =============================================================================

pub mod property {
    pub const STORAGE_ID: u16 = 0xDC01;
    pub const OBJECT_FORMAT: u16 = 0xDC02;
    pub const PROTECTION_STATUS: u16 = 0xDC03;
    pub const OBJECT_SIZE: u16 = 0xDC04;
    pub const ASSOCIATION_TYPE: u16 = 0xDC05;
    pub const ASSOCIATION_DESC: u16 = 0xDC06;
    pub const OBJECT_FILE_NAME: u16 = 0xDC07;
    pub const DATE_CREATED: u16 = 0xDC08;
    pub const DATE_MODIFIED: u16 = 0xDC09;
    pub const PARENT_OBJECT: u16 = 0xDC0B;
    pub const HIDDEN: u16 = 0xDC0D;
    pub const PERSISTENT_UID: u16 = 0xDC41;
    pub const NON_CONSUMABLE: u16 = 0xDC4F;
    pub const DISPLAY_NAME: u16 = 0xDCE1;
}

// =============================================================================
// Device Property Codes
// =============================================================================

pub mod device_prop {
    pub const SYNCHRONIZATION_PARTNER: u16 = 0xD401;
    pub const DEVICE_FRIENDLY_NAME: u16 = 0xD402;
}

// =============================================================================
// Dataset Type Codes
// =============================================================================

pub mod data_type {
    pub const UNDEFINED: u16 = 0x0000;
    pub const INT8: u16 = 0x0001;
    pub const UINT8: u16 = 0x0002;
    pub const INT16: u16 = 0x0003;
    pub const UINT16: u16 = 0x0004;
    pub const INT32: u16 = 0x0005;
    pub const UINT32: u16 = 0x0006;
    pub const INT64: u16 = 0x0007;
    pub const UINT64: u16 = 0x0008;
    pub const INT128: u16 = 0x0009;
    pub const UINT128: u16 = 0x000A;
    pub const STR: u16 = 0xFFFF;
}

// =============================================================================
// Storage Codes
// =============================================================================

pub mod storage {
    // Storage type field of the StorageInfo dataset
    pub const TYPE_FIXED_ROM: u16 = 0x0001;
    pub const TYPE_REMOVABLE_ROM: u16 = 0x0002;
    pub const TYPE_FIXED_RAM: u16 = 0x0003;
    pub const TYPE_REMOVABLE_RAM: u16 = 0x0004;

    /// Filesystem type: generic hierarchical
    pub const FILESYSTEM_GENERIC_HIERARCHICAL: u16 = 0x0002;

    /// Access capability: read-write
    pub const ACCESS_READ_WRITE: u16 = 0x0000;

    /// Storage id a SendObjectInfo may not target at the root level
    pub const FIXED_RAM: u32 = 0x0003;

    /// Conventional id for the first registered storage
    pub const FIRST_STORAGE_ID: u32 = 0x0001_0001;
}

/// Association type for plain folders
pub const ASSOCIATION_TYPE_GENERIC_FOLDER: u16 = 0x0001;

/// Debug name for an operation code
pub fn operation_name(code: u16) -> &'static str {
    match code {
        op::GET_DEVICE_INFO => "GetDeviceInfo",
        op::OPEN_SESSION => "OpenSession",
        op::CLOSE_SESSION => "CloseSession",
        op::GET_STORAGE_IDS => "GetStorageIDs",
        op::GET_STORAGE_INFO => "GetStorageInfo",
        op::GET_NUM_OBJECTS => "GetNumObjects",
        op::GET_OBJECT_HANDLES => "GetObjectHandles",
        op::GET_OBJECT_INFO => "GetObjectInfo",
        op::GET_OBJECT => "GetObject",
        op::GET_THUMB => "GetThumb",
        op::DELETE_OBJECT => "DeleteObject",
        op::SEND_OBJECT_INFO => "SendObjectInfo",
        op::SEND_OBJECT => "SendObject",
        op::GET_DEVICE_PROP_DESC => "GetDevicePropDesc",
        op::GET_DEVICE_PROP_VALUE => "GetDevicePropValue",
        op::SET_DEVICE_PROP_VALUE => "SetDevicePropValue",
        op::RESET_DEVICE_PROP_VALUE => "ResetDevicePropValue",
        op::MOVE_OBJECT => "MoveObject",
        op::GET_PARTIAL_OBJECT => "GetPartialObject",
        op::GET_OBJECT_PROPS_SUPPORTED => "GetObjectPropsSupported",
        op::GET_OBJECT_PROP_DESC => "GetObjectPropDesc",
        op::GET_OBJECT_PROP_VALUE => "GetObjectPropValue",
        op::SET_OBJECT_PROP_VALUE => "SetObjectPropValue",
        op::GET_OBJECT_PROP_LIST => "GetObjectPropList",
        op::GET_OBJECT_REFERENCES => "GetObjectReferences",
        op::SET_OBJECT_REFERENCES => "SetObjectReferences",
        op::GET_PARTIAL_OBJECT_64 => "GetPartialObject64",
        op::SEND_PARTIAL_OBJECT => "SendPartialObject",
        op::TRUNCATE_OBJECT => "TruncateObject",
        op::BEGIN_EDIT_OBJECT => "BeginEditObject",
        op::END_EDIT_OBJECT => "EndEditObject",
        _ => "UnknownOperation",
    }
}

/// Debug name for a response code
pub fn response_name(code: u16) -> &'static str {
    match code {
        response::OK => "OK",
        response::GENERAL_ERROR => "GeneralError",
        response::SESSION_NOT_OPEN => "SessionNotOpen",
        response::OPERATION_NOT_SUPPORTED => "OperationNotSupported",
        response::PARAMETER_NOT_SUPPORTED => "ParameterNotSupported",
        response::INCOMPLETE_TRANSFER => "IncompleteTransfer",
        response::INVALID_STORAGE_ID => "InvalidStorageID",
        response::INVALID_OBJECT_HANDLE => "InvalidObjectHandle",
        response::DEVICE_PROP_NOT_SUPPORTED => "DevicePropNotSupported",
        response::STORAGE_FULL => "StorageFull",
        response::OBJECT_TOO_LARGE => "ObjectTooLarge",
        response::NO_VALID_OBJECT_INFO => "NoValidObjectInfo",
        response::DEVICE_BUSY => "DeviceBusy",
        response::INVALID_PARENT_OBJECT => "InvalidParentObject",
        response::SESSION_ALREADY_OPEN => "SessionAlreadyOpen",
        response::TRANSACTION_CANCELLED => "TransactionCancelled",
        response::OBJECT_PROP_NOT_SUPPORTED => "ObjectPropNotSupported",
        response::SPECIFICATION_BY_GROUP_UNSUPPORTED => "SpecificationByGroupUnsupported",
        response::SPECIFICATION_BY_DEPTH_UNSUPPORTED => "SpecificationByDepthUnsupported",
        _ => "UnknownResponse",
    }
}
