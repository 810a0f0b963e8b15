//! Server Module
//!
//! The transaction engine: reads a Command container, optionally reads a
//! Data container, dispatches to an operation handler, writes Data-out,
//! writes the Response.
//!
//! ## Responsibilities
//! - Serialize transactions; one in flight at a time
//! - Track session, pending-send, and edit-object state
//! - Keep event emission from interleaving a response write
//!
//! ## Concurrency
//! All mutable state sits behind a `parking_lot::Mutex`. The request read
//! is the single long-wait point and happens outside the lock; storage
//! add/remove from other threads take the lock and therefore cannot clash
//! with a transaction in progress. `stop()` flips an atomic flag the loop
//! polls between transactions.

mod events;
mod handlers;
mod io;

pub use events::{EventQueue, PendingEvent};

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::database::Database;
use crate::protocol::consts::{event, op, operation_name, response, response_name, PARENT_ROOT};
use crate::protocol::{DataPacket, EventPacket, RequestPacket, ResponsePacket};
use crate::storage::MtpStorage;
use crate::transport::{Transport, TransportError};

/// An open MTP session
struct Session {
    id: u32,
}

/// SendObjectInfo → SendObject handoff
enum SendState {
    Idle,
    PendingInfo {
        handle: u32,
        path: PathBuf,
        format: u16,
        /// Announced size; 0xFFFFFFFF means "stream until short packet"
        size: u64,
    },
}

/// A file held open for partial writes and truncation.
/// Dropping the session closes the descriptor on every exit path.
struct EditSession {
    handle: u32,
    path: PathBuf,
    size: u64,
    format: u16,
    file: File,
}

/// Everything the handlers touch, guarded by the engine mutex
struct ServerState<D: Database> {
    config: Config,
    database: D,
    storages: Vec<MtpStorage>,
    session: Option<Session>,
    send_state: SendState,
    edits: Vec<EditSession>,
    data: DataPacket,
    response: ResponsePacket,
    /// Transaction id of the most recent request; events reuse it
    last_transaction_id: u32,
}

/// The MTP responder engine
pub struct MtpServer<D: Database, T: Transport> {
    transport: Arc<T>,
    state: Mutex<ServerState<D>>,
    running: AtomicBool,
    events: Arc<EventQueue>,
}

impl<D: Database, T: Transport> MtpServer<D, T> {
    pub fn new(config: Config, database: D, transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            state: Mutex::new(ServerState {
                config,
                database,
                storages: Vec::new(),
                session: None,
                send_state: SendState::Idle,
                edits: Vec::new(),
                data: DataPacket::new(),
                response: ResponsePacket::new(),
                last_transaction_id: 0,
            }),
            running: AtomicBool::new(false),
            events: Arc::new(EventQueue::new()),
        }
    }

    /// Signal the request loop to exit after the current transaction.
    pub fn stop(&self) {
        tracing::info!("stop requested");
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Register a storage: record the descriptor, ingest its mount path
    /// into the database, and announce it to the host.
    pub fn add_storage(&self, storage: MtpStorage, hidden: bool) {
        let mut state = self.state.lock();
        state.database.add_storage_path(
            storage.path(),
            storage.description(),
            storage.id(),
            hidden,
        );
        let id = storage.id();
        state.storages.push(storage);
        state.send_event(&*self.transport, event::STORE_ADDED, [id, 0, 0]);
        self.flush_events(&mut state);
    }

    /// Deregister a storage and purge its records.
    pub fn remove_storage(&self, storage_id: u32) {
        let mut state = self.state.lock();
        if let Some(index) = state.storages.iter().position(|s| s.id() == storage_id) {
            state.storages.remove(index);
            state.database.remove_storage(storage_id);
            state.send_event(&*self.transport, event::STORE_REMOVED, [storage_id, 0, 0]);
        }
    }

    /// Run the request loop until [`MtpServer::stop`] or the transport
    /// disconnects. On exit all open edits are committed and the session,
    /// if any, is ended.
    pub fn run(&self) {
        tracing::info!("MTP responder running");
        self.running.store(true, Ordering::Relaxed);

        let mut request = RequestPacket::new();

        while self.running.load(Ordering::Relaxed) {
            match request.read(&*self.transport) {
                Ok(()) => {}
                Err(e) if matches!(
                    e,
                    crate::error::MtpError::Transport(TransportError::Disconnected)
                ) =>
                {
                    tracing::info!("transport disconnected");
                    break;
                }
                Err(e) => {
                    tracing::trace!("request read: {}", e);
                    continue;
                }
            }

            let operation = request.operation();
            let transaction_id = request.transaction_id();
            tracing::debug!(
                "{} (tx {})",
                operation_name(operation),
                transaction_id
            );

            let mut state = self.state.lock();
            state.last_transaction_id = transaction_id;

            // Operations that carry a host → device Data phase
            let data_in = matches!(
                operation,
                op::SEND_OBJECT_INFO
                    | op::SET_OBJECT_REFERENCES
                    | op::SET_OBJECT_PROP_VALUE
                    | op::SET_DEVICE_PROP_VALUE
            );
            if data_in {
                if let Err(e) = state.data.read(&*self.transport) {
                    tracing::debug!("data read failed: {}", e);
                    continue;
                }
            } else {
                state.data.reset();
            }

            state.response.reset();
            let outcome = state.dispatch(&*self.transport, &request, &self.events);
            self.flush_events(&mut state);

            let code = match outcome {
                Ok(code) => code,
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("{} cancelled by host", operation_name(operation));
                    continue;
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", operation_name(operation), e);
                    response::GENERAL_ERROR
                }
            };
            if code == response::TRANSACTION_CANCELLED {
                tracing::debug!("skipping response");
                continue;
            }

            if !data_in && state.data.has_payload() {
                if let Err(e) = state.data.write(&*self.transport, operation, transaction_id) {
                    tracing::debug!("data write failed: {}", e);
                    continue;
                }
            }

            state.response.set_code(code);
            tracing::debug!("responding {}", response_name(code));
            if let Err(e) = state.response.write(&*self.transport, transaction_id) {
                tracing::debug!("response write failed: {}", e);
            }
        }

        // Commit any open edits and end the session before the transport
        // reference goes away.
        let mut state = self.state.lock();
        state.commit_all_edits();
        if state.session.take().is_some() {
            state.database.session_ended();
        }
        self.running.store(false, Ordering::Relaxed);
        tracing::info!("MTP responder stopped");
    }

    /// Write queued database events to the interrupt pipe.
    fn flush_events(&self, state: &mut ServerState<D>) {
        for pending in self.events.drain() {
            state.send_event(&*self.transport, pending.code, [pending.param, 0, 0]);
        }
    }
}

impl<D: Database> ServerState<D> {
    /// Resolve a storage id; 0 aliases the first registered storage.
    fn storage(&self, id: u32) -> Option<&MtpStorage> {
        if id == 0 {
            self.storages.first()
        } else {
            self.storages.iter().find(|s| s.id() == id)
        }
    }

    /// `0` and `0xFFFFFFFF` ask whether any storage is registered.
    fn has_storage(&self, id: u32) -> bool {
        if id == 0 || id == PARENT_ROOT {
            !self.storages.is_empty()
        } else {
            self.storage(id).is_some()
        }
    }

    fn edit_index(&self, handle: u32) -> Option<usize> {
        self.edits.iter().position(|e| e.handle == handle)
    }

    /// Commit every open edit back into the database (restats sizes)
    /// and close the descriptors.
    fn commit_all_edits(&mut self) {
        let edits: Vec<EditSession> = self.edits.drain(..).collect();
        for edit in edits {
            self.database.end_send(edit.handle, edit.format, true);
        }
    }

    /// Emit one event if a session is open. Events reuse the transaction
    /// id of the most recent request.
    fn send_event<T: Transport + ?Sized>(&self, transport: &T, code: u16, params: [u32; 3]) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = EventPacket::write(transport, code, self.last_transaction_id, params) {
            tracing::debug!("event write failed: {}", e);
        }
    }
}
