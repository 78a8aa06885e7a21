//! Shared wire-protocol definitions for keypulse.
//!
//! The display protocol is deliberately tiny: the server pushes one fixed
//! 8-byte stats packet per cycle and the client answers with a single
//! acknowledgement byte whose value carries no meaning. This crate provides
//! the packet type, its encoding, and the transport codec the daemon frames
//! connections with.

pub mod protocol;
pub mod transport;

pub use protocol::{DEFAULT_PORT, PACKET_LEN, StatsPacket};
pub use transport::{Ack, StatsCodec};
