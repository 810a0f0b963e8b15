//! Container packets
//!
//! One reusable packet object per container role, mirroring the four MTP
//! container types. `RequestPacket`, `ResponsePacket` and `EventPacket`
//! carry at most a header plus five `u32` parameters and fit in a small
//! fixed buffer; `DataPacket` owns the growable data buffer and the typed
//! field codec.
//!
//! All integers are little-endian. The header layout is fixed:
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬────────────────┬─────────────┐
//! │ length(u32)│ type(u16)│ code(u16)│ tx_id(u32)     │ payload ... │
//! └────────────┴──────────┴──────────┴────────────────┴─────────────┘
//! ```
//!
//! Emitters fill the payload first and backfill `length` and the fixed
//! header fields immediately before the transport write.

use crate::error::{MtpError, Result};
use crate::transport::Transport;

use super::consts::{
    BULK_BUFFER_SIZE, COMMAND_BUFFER_SIZE, CONTAINER_CODE_OFFSET, CONTAINER_HEADER_SIZE,
    CONTAINER_LENGTH_OFFSET, CONTAINER_TRANSACTION_ID_OFFSET, CONTAINER_TYPE_DATA,
    CONTAINER_TYPE_EVENT, CONTAINER_TYPE_OFFSET, CONTAINER_TYPE_RESPONSE,
};

/// Longest encodable string: a u8 unit count must also cover the NUL
const MAX_STRING_UNITS: usize = 254;

// =============================================================================
// Little-endian field helpers
// =============================================================================

fn get_u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn get_u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn put_u16_at(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32_at(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Write the fixed header fields with an explicit length. The streaming
/// paths use this to announce a payload larger than the chunk buffer.
pub(crate) fn write_container_header(
    buf: &mut [u8],
    length: u32,
    kind: u16,
    code: u16,
    transaction_id: u32,
) {
    put_u32_at(buf, CONTAINER_LENGTH_OFFSET, length);
    put_u16_at(buf, CONTAINER_TYPE_OFFSET, kind);
    put_u16_at(buf, CONTAINER_CODE_OFFSET, code);
    put_u32_at(buf, CONTAINER_TRANSACTION_ID_OFFSET, transaction_id);
}

/// Stamp the header of a fully buffered outgoing container.
pub(crate) fn stamp_header(buf: &mut [u8], kind: u16, code: u16, transaction_id: u32) {
    let length = buf.len() as u32;
    write_container_header(buf, length, kind, code, transaction_id);
}

// =============================================================================
// Request Packet
// =============================================================================

/// Incoming Command container
///
/// Parameters are decoded lazily: a slot past the received length reads
/// as zero, which is how the shortened containers of unset parameters
/// are interpreted.
pub struct RequestPacket {
    buffer: [u8; COMMAND_BUFFER_SIZE],
    size: usize,
}

impl RequestPacket {
    pub fn new() -> Self {
        Self {
            buffer: [0; COMMAND_BUFFER_SIZE],
            size: 0,
        }
    }

    /// Read the next command container from the transport.
    pub fn read<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        let n = transport.read(&mut self.buffer)?;
        if n < CONTAINER_HEADER_SIZE {
            self.size = 0;
            return Err(MtpError::TruncatedContainer {
                got: n,
                needed: CONTAINER_HEADER_SIZE,
            });
        }
        self.size = n;
        Ok(())
    }

    pub fn operation(&self) -> u16 {
        get_u16_at(&self.buffer, CONTAINER_CODE_OFFSET)
    }

    pub fn transaction_id(&self) -> u32 {
        get_u32_at(&self.buffer, CONTAINER_TRANSACTION_ID_OFFSET)
    }

    /// Parameter slot 1..=5; zero when the host omitted it.
    pub fn parameter(&self, index: usize) -> u32 {
        debug_assert!((1..=5).contains(&index));
        let offset = CONTAINER_HEADER_SIZE + (index - 1) * 4;
        if offset + 4 <= self.size {
            get_u32_at(&self.buffer, offset)
        } else {
            0
        }
    }
}

impl Default for RequestPacket {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Data Packet
// =============================================================================

/// Data container buffer with the typed field codec
///
/// The buffer always holds the 12 header bytes followed by the payload.
/// `offset` is the read cursor for decoding a received container; writes
/// append at the end. The buffer starts at the bulk chunk size and grows
/// for the rare datasets that exceed it (large property tables).
pub struct DataPacket {
    buffer: Vec<u8>,
    offset: usize,
}

impl DataPacket {
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(BULK_BUFFER_SIZE);
        buffer.resize(CONTAINER_HEADER_SIZE, 0);
        Self {
            buffer,
            offset: CONTAINER_HEADER_SIZE,
        }
    }

    /// Drop any payload and rewind the read cursor.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffer.resize(CONTAINER_HEADER_SIZE, 0);
        self.offset = CONTAINER_HEADER_SIZE;
    }

    /// Whether an operation handler produced payload to send.
    pub fn has_payload(&self) -> bool {
        self.buffer.len() > CONTAINER_HEADER_SIZE
    }

    /// Payload bytes past the header.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[CONTAINER_HEADER_SIZE..]
    }

    /// Total container length including the header.
    pub fn container_len(&self) -> usize {
        self.buffer.len()
    }

    /// Read a full data container (up to one bulk buffer) from the transport.
    pub fn read<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<usize> {
        self.read_limited(transport, BULK_BUFFER_SIZE)
    }

    /// Read at most `limit` bytes of a data container. The file-receive
    /// paths use a small limit so the payload tail can stream straight to
    /// disk instead of through this buffer.
    pub fn read_limited<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        limit: usize,
    ) -> Result<usize> {
        self.buffer.clear();
        self.buffer.resize(limit, 0);
        let n = match transport.read(&mut self.buffer) {
            Ok(n) => n,
            Err(e) => {
                self.reset();
                return Err(e.into());
            }
        };
        if n < CONTAINER_HEADER_SIZE {
            self.reset();
            return Err(MtpError::TruncatedContainer {
                got: n,
                needed: CONTAINER_HEADER_SIZE,
            });
        }
        self.buffer.truncate(n);
        self.offset = CONTAINER_HEADER_SIZE;
        Ok(n)
    }

    /// Stamp the header and send the container on the bulk-IN pipe.
    pub fn write<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        operation: u16,
        transaction_id: u32,
    ) -> Result<()> {
        stamp_header(&mut self.buffer, CONTAINER_TYPE_DATA, operation, transaction_id);
        transport.write(&self.buffer)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Typed decode
    // -------------------------------------------------------------------------

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(MtpError::Codec(format!(
                "decode past end of payload: need {} bytes at offset {}, have {}",
                len,
                self.offset,
                self.buffer.len()
            )));
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn get_u128(&mut self) -> Result<u128> {
        let b = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(b);
        Ok(u128::from_le_bytes(raw))
    }

    /// Length-prefixed UTF-16 string cell.
    pub fn get_string(&mut self) -> Result<String> {
        let count = self.get_u8()? as usize;
        if count == 0 {
            return Ok(String::new());
        }
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(self.get_u16()?);
        }
        // count includes the trailing NUL
        if units.last() == Some(&0) {
            units.pop();
        }
        Ok(String::from_utf16_lossy(&units))
    }

    pub fn get_u32_array(&mut self) -> Result<Vec<u32>> {
        let count = self.get_u32()? as usize;
        let mut values = Vec::with_capacity(count.min(BULK_BUFFER_SIZE / 4));
        for _ in 0..count {
            values.push(self.get_u32()?);
        }
        Ok(values)
    }

    // -------------------------------------------------------------------------
    // Typed encode
    // -------------------------------------------------------------------------

    pub fn put_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u128(&mut self, value: u128) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed UTF-16 string cell; the empty string is a single
    /// zero count byte with no units and no terminator.
    pub fn put_string(&mut self, value: &str) {
        let units: Vec<u16> = value.encode_utf16().take(MAX_STRING_UNITS).collect();
        if units.is_empty() {
            self.put_u8(0);
            return;
        }
        self.put_u8((units.len() + 1) as u8);
        for unit in &units {
            self.put_u16(*unit);
        }
        self.put_u16(0);
    }

    pub fn put_empty_string(&mut self) {
        self.put_u8(0);
    }

    pub fn put_u16_array(&mut self, values: &[u16]) {
        self.put_u32(values.len() as u32);
        for value in values {
            self.put_u16(*value);
        }
    }

    pub fn put_u32_array(&mut self, values: &[u32]) {
        self.put_u32(values.len() as u32);
        for value in values {
            self.put_u32(*value);
        }
    }

    pub fn put_empty_array(&mut self) {
        self.put_u32(0);
    }
}

impl Default for DataPacket {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Response Packet
// =============================================================================

/// Outgoing Response container: code plus up to five parameters.
/// Trailing unset parameters are omitted and the length shortens.
pub struct ResponsePacket {
    code: u16,
    params: [Option<u32>; 5],
}

impl ResponsePacket {
    pub fn new() -> Self {
        Self {
            code: 0,
            params: [None; 5],
        }
    }

    pub fn reset(&mut self) {
        self.code = 0;
        self.params = [None; 5];
    }

    pub fn set_code(&mut self, code: u16) {
        self.code = code;
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// Parameter slot 1..=5.
    pub fn set_parameter(&mut self, index: usize, value: u32) {
        debug_assert!((1..=5).contains(&index));
        self.params[index - 1] = Some(value);
    }

    pub fn write<T: Transport + ?Sized>(&self, transport: &T, transaction_id: u32) -> Result<()> {
        let count = self
            .params
            .iter()
            .rposition(|p| p.is_some())
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut buf = vec![0u8; CONTAINER_HEADER_SIZE + count * 4];
        for (i, param) in self.params.iter().take(count).enumerate() {
            put_u32_at(&mut buf, CONTAINER_HEADER_SIZE + i * 4, param.unwrap_or(0));
        }
        stamp_header(&mut buf, CONTAINER_TYPE_RESPONSE, self.code, transaction_id);
        transport.write(&buf)?;
        Ok(())
    }
}

impl Default for ResponsePacket {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Event Packet
// =============================================================================

/// Outgoing Event container on the interrupt pipe.
/// Events always carry three parameter slots, zero-filled.
pub struct EventPacket;

impl EventPacket {
    pub fn write<T: Transport + ?Sized>(
        transport: &T,
        code: u16,
        transaction_id: u32,
        params: [u32; 3],
    ) -> Result<()> {
        let mut buf = vec![0u8; CONTAINER_HEADER_SIZE + 12];
        for (i, param) in params.iter().enumerate() {
            put_u32_at(&mut buf, CONTAINER_HEADER_SIZE + i * 4, *param);
        }
        stamp_header(&mut buf, CONTAINER_TYPE_EVENT, code, transaction_id);
        transport.send_event(&buf)?;
        Ok(())
    }
}
