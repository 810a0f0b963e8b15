//! Bulk file streaming
//!
//! The file-transfer operations move payload bytes directly between the
//! transport and the filesystem in bulk-sized chunks; only the 12-byte
//! container header passes through the codec. `send_file` emits a single
//! synthesized Data header followed by the file bytes; `receive_file`
//! drains the host's Data payload into an open file.

use std::fs;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::protocol::consts::{BULK_BUFFER_SIZE, CONTAINER_HEADER_SIZE, CONTAINER_TYPE_DATA};
use crate::protocol::write_container_header;
use crate::transport::{Transport, TransportError};

/// Stream `length` bytes of `file` starting at `offset` as one Data
/// container. The length is clamped against the on-disk size: an offset
/// at or past the end sends an empty payload. Returns the byte count
/// actually sent.
pub fn send_file<T: Transport + ?Sized>(
    transport: &T,
    file: &mut File,
    offset: u64,
    length: u64,
    operation: u16,
    transaction_id: u32,
) -> Result<u64> {
    let disk_size = file.metadata()?.len();
    let actual = if offset >= disk_size {
        0
    } else {
        length.min(disk_size - offset)
    };

    file.seek(SeekFrom::Start(offset))?;

    let mut buf = vec![0u8; BULK_BUFFER_SIZE];
    write_container_header(
        &mut buf,
        (CONTAINER_HEADER_SIZE as u64 + actual) as u32,
        CONTAINER_TYPE_DATA,
        operation,
        transaction_id,
    );

    // First chunk carries the header; later chunks are raw payload.
    let mut chunk_used = CONTAINER_HEADER_SIZE;
    let mut remaining = actual;
    loop {
        let space = buf.len() - chunk_used;
        let take = remaining.min(space as u64) as usize;
        if take > 0 {
            file.read_exact(&mut buf[chunk_used..chunk_used + take])?;
        }
        transport.write(&buf[..chunk_used + take])?;
        remaining -= take as u64;
        if remaining == 0 {
            break;
        }
        chunk_used = 0;
    }

    Ok(actual)
}

/// Drain a Data payload from the transport into `file` at its current
/// position. With `length` set, reads exactly that many bytes; with
/// `None`, reads until a short packet ends the transfer. Returns the
/// byte count received.
pub fn receive_file<T: Transport + ?Sized>(
    transport: &T,
    file: &mut File,
    length: Option<u64>,
) -> Result<u64> {
    let mut buf = vec![0u8; BULK_BUFFER_SIZE];
    let mut total: u64 = 0;

    match length {
        Some(expected) => {
            while total < expected {
                let want = buf.len().min((expected - total) as usize);
                let n = transport.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(TransportError::Disconnected.into());
                }
                file.write_all(&buf[..n])?;
                total += n as u64;
            }
        }
        None => loop {
            let n = transport.read(&mut buf)?;
            file.write_all(&buf[..n])?;
            total += n as u64;
            if n < buf.len() {
                break;
            }
        },
    }

    Ok(total)
}

/// Remove a path and, for directories, everything under it. Walks with an
/// explicit stack; children are removed before their parents. Failures
/// are logged and skipped: the database rows are already gone and the
/// host cannot reach the leftovers.
pub fn delete_path(path: &Path) {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::error!("stat of {} failed: {}", path.display(), e);
            return;
        }
    };

    if !meta.is_dir() {
        if let Err(e) = fs::remove_file(path) {
            tracing::error!("unlink {} failed: {}", path.display(), e);
        }
        return;
    }

    let mut stack: Vec<PathBuf> = vec![path.to_path_buf()];
    let mut dirs: Vec<PathBuf> = Vec::new();

    while let Some(current) = stack.pop() {
        let is_dir = fs::symlink_metadata(&current)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            if let Err(e) = fs::remove_file(&current) {
                tracing::error!("unlink {} failed: {}", current.display(), e);
            }
            continue;
        }

        dirs.push(current.clone());
        match fs::read_dir(&current) {
            Ok(reader) => {
                for entry in reader.flatten() {
                    stack.push(entry.path());
                }
            }
            Err(e) => tracing::error!("read_dir {} failed: {}", current.display(), e),
        }
    }

    // Stack order visits parents before children, so reverse removal
    // empties directories before rmdir reaches them.
    for dir in dirs.iter().rev() {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::error!("rmdir {} failed: {}", dir.display(), e);
        }
    }
}
