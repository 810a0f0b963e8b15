//! Protocol Module
//!
//! The MTP container codec and code tables.
//!
//! ## Container Format
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬─────────────┬─────────────┐
//! │ length(u32)│ type(u16)│ code(u16)│ tx_id (u32) │ payload ... │
//! └────────────┴──────────┴──────────┴─────────────┴─────────────┘
//! ```
//!
//! ### Container Types
//! - 1: Command  - operation code + up to five u32 parameters
//! - 2: Data     - typed payload produced/consumed by the operation
//! - 3: Response - response code + up to five u32 parameters
//! - 4: Event    - event code + three u32 parameters (interrupt pipe)
//!
//! ### Field Encodings
//! - Integers: little-endian, widths 8/16/32/64/128 bits
//! - Strings: u8 count of UTF-16 code units including the trailing NUL,
//!   then `count` u16 units; the empty string is a single 0x00 byte
//! - Arrays: u32 element count, then the elements

pub mod consts;
pub mod datetime;
mod packet;

pub use packet::{DataPacket, EventPacket, RequestPacket, ResponsePacket};
pub(crate) use packet::write_container_header;
