//! # mtpd
//!
//! An MTP (Media Transfer Protocol) responder that exposes a host
//! filesystem subtree to a connected host as a browsable object store,
//! with:
//! - Little-endian container codec for the four MTP container types
//! - Per-object metadata database with lazy directory scanning
//! - Serialized transaction engine over a pluggable byte transport
//! - In-progress send and edit-object session tracking
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Transport                              │
//! │            (USB bulk/interrupt pipes, or TCP)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Transaction Engine                          │
//! │       Request → Data-in → handler → Data-out → Response      │
//! └───────┬──────────────────┬──────────────────┬───────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!  ┌─────────────┐   ┌───────────────┐   ┌─────────────┐
//!  │ Wire Codec  │   │   Object DB   │   │  Storages   │
//!  │ (packets)   │   │ (lazy scans)  │   │ (capacity)  │
//!  └─────────────┘   └───────┬───────┘   └─────────────┘
//!                            │
//!                            ▼
//!                    ┌───────────────┐
//!                    │  Filesystem   │
//!                    └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod transport;
pub mod storage;
pub mod database;
pub mod server;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use database::{Database, ObjectDb};
pub use error::{MtpError, Result};
pub use server::MtpServer;
pub use storage::MtpStorage;
pub use transport::{TcpTransport, Transport, TransportError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mtpd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
