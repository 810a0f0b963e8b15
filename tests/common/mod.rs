//! Shared test fixtures
//!
//! A scripted in-memory transport plus container builders/parsers for
//! driving the responder end to end without a USB stack.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mtpd::{Transport, TransportError};

// =============================================================================
// Scripted Transport
// =============================================================================

struct Inner {
    incoming: Mutex<VecDeque<Vec<u8>>>,
    outgoing: Mutex<Vec<u8>>,
    events: Mutex<Vec<Vec<u8>>>,
    hold_open: AtomicBool,
    finished: AtomicBool,
}

/// Transport fed from a prepared script of host packets.
///
/// Reads pop script chunks (splitting when the engine asks for less than
/// a chunk holds); an exhausted script reports a disconnect so the
/// request loop exits, unless `hold_open` keeps the link idle for tests
/// that interact with the server from another thread.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                incoming: Mutex::new(script.into()),
                outgoing: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
                hold_open: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Keep the link idle (timeouts, not disconnect) once the script runs dry.
    pub fn hold_open(&self) {
        self.inner.hold_open.store(true, Ordering::Relaxed);
    }

    /// Let the next idle read report a disconnect.
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::Relaxed);
    }

    /// Everything written to the bulk-IN pipe so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.outgoing.lock().clone()
    }

    /// Every interrupt event container sent so far.
    pub fn events(&self) -> Vec<Vec<u8>> {
        self.inner.events.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut incoming = self.inner.incoming.lock();
        match incoming.pop_front() {
            Some(chunk) => {
                if chunk.len() > buf.len() {
                    buf.copy_from_slice(&chunk[..buf.len()]);
                    incoming.push_front(chunk[buf.len()..].to_vec());
                    Ok(buf.len())
                } else {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
            None => {
                if self.inner.hold_open.load(Ordering::Relaxed)
                    && !self.inner.finished.load(Ordering::Relaxed)
                {
                    drop(incoming);
                    std::thread::sleep(Duration::from_millis(5));
                    Err(TransportError::TimedOut)
                } else {
                    Err(TransportError::Disconnected)
                }
            }
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.inner.outgoing.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn send_event(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.inner.events.lock().push(buf.to_vec());
        Ok(buf.len())
    }
}

// =============================================================================
// Container Builders
// =============================================================================

pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Length-prefixed UTF-16 string cell, as the codec encodes it.
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    if units.is_empty() {
        buf.push(0);
        return;
    }
    buf.push((units.len() + 1) as u8);
    for unit in units {
        put_u16(buf, unit);
    }
    put_u16(buf, 0);
}

fn container(kind: u16, code: u16, transaction_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + payload.len());
    put_u32(&mut buf, (12 + payload.len()) as u32);
    put_u16(&mut buf, kind);
    put_u16(&mut buf, code);
    put_u32(&mut buf, transaction_id);
    buf.extend_from_slice(payload);
    buf
}

/// Build a Command container.
pub fn command(code: u16, transaction_id: u32, params: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    for param in params {
        put_u32(&mut payload, *param);
    }
    container(1, code, transaction_id, &payload)
}

/// Build a Data container.
pub fn data(code: u16, transaction_id: u32, payload: &[u8]) -> Vec<u8> {
    container(2, code, transaction_id, payload)
}

/// An ObjectInfo dataset payload with the fields SendObjectInfo reads.
pub fn object_info_payload(format: u16, size: u32, name: &str, modified: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    put_u32(&mut payload, 0); // storage id
    put_u16(&mut payload, format);
    put_u16(&mut payload, 0); // protection status
    put_u32(&mut payload, size);
    put_u16(&mut payload, 0); // thumb format
    put_u32(&mut payload, 0); // thumb compressed size
    put_u32(&mut payload, 0); // thumb pix width
    put_u32(&mut payload, 0); // thumb pix height
    put_u32(&mut payload, 0); // image pix width
    put_u32(&mut payload, 0); // image pix height
    put_u32(&mut payload, 0); // image bit depth
    put_u32(&mut payload, 0); // parent
    put_u16(&mut payload, 0); // association type
    put_u32(&mut payload, 0); // association desc
    put_u32(&mut payload, 0); // sequence number
    put_string(&mut payload, name);
    put_string(&mut payload, ""); // date created
    put_string(&mut payload, modified);
    payload
}

// =============================================================================
// Container Parsing
// =============================================================================

/// A parsed container off the bulk-IN byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub kind: u16,
    pub code: u16,
    pub transaction_id: u32,
    pub payload: Vec<u8>,
}

impl Container {
    /// Parameter slot 1..=5, zero when omitted.
    pub fn parameter(&self, index: usize) -> u32 {
        let offset = (index - 1) * 4;
        if offset + 4 <= self.payload.len() {
            u32::from_le_bytes(self.payload[offset..offset + 4].try_into().unwrap())
        } else {
            0
        }
    }
}

/// Split a captured byte stream back into containers. Streamed Data
/// payloads are contiguous after their header, so framing by the length
/// field reassembles them.
pub fn parse_containers(bytes: &[u8]) -> Vec<Container> {
    let mut containers = Vec::new();
    let mut offset = 0;
    while offset + 12 <= bytes.len() {
        let length = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let kind = u16::from_le_bytes(bytes[offset + 4..offset + 6].try_into().unwrap());
        let code = u16::from_le_bytes(bytes[offset + 6..offset + 8].try_into().unwrap());
        let transaction_id =
            u32::from_le_bytes(bytes[offset + 8..offset + 12].try_into().unwrap());
        assert!(length >= 12, "container length below header size");
        assert!(offset + length <= bytes.len(), "truncated container in stream");
        containers.push(Container {
            kind,
            code,
            transaction_id,
            payload: bytes[offset + 12..offset + length].to_vec(),
        });
        offset += length;
    }
    assert_eq!(offset, bytes.len(), "trailing bytes after last container");
    containers
}
