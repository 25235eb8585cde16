//! The framed packet protocol spoken between the host and the peer.
//!
//! Every frame on the wire looks like
//! `[SYNC][TYPE][LENGTH][SEQ][PAYLOAD..][CRC_LO][CRC_HI]`, with the CRC
//! covering everything from TYPE to the end of the payload.

/// Start-of-frame marker.
pub const SYNC_BYTE: u8 = 0xaa;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = 64;

/// Type, length, and sequence bytes.
pub const HEADER_LEN: usize = 3;

/// Little-endian CRC trailer.
pub const CRC_LEN: usize = 2;

/// Size of the decoder's scratch buffer. The sync byte is not stored.
pub const FRAME_BUFFER_LEN: usize = HEADER_LEN + MAX_PAYLOAD + CRC_LEN;

/// Largest encoded frame, sync byte included.
pub const MAX_FRAME_LEN: usize = 1 + FRAME_BUFFER_LEN;

pub const BAUD_RATE: u32 = 921_600;

pub mod crc;

mod frame;
pub use frame::*;

pub mod messages;
pub use messages::{Message, MessageParse, MessageSerialize, MessageType};

pub mod serialize;
pub use serialize::Serializer;
