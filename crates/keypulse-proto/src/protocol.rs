//! The fixed-size stats packet pushed to display clients.
//!
//! Packet format:
//!
//! ```text
//! +------------------+------------------+
//! |  4 bytes         |  4 bytes         |
//! |  cpu (f32 LE)    |  mem (f32 LE)    |
//! +------------------+------------------+
//! ```
//!
//! Both fields are utilization fractions in `[0.0, 1.0]`. There is no length
//! prefix and no version field; the layout is fixed by the display firmware.

use serde::{Deserialize, Serialize};

/// Size of an encoded stats packet in bytes.
pub const PACKET_LEN: usize = 8;

/// Default TCP port display clients connect to.
pub const DEFAULT_PORT: u16 = 1648;

/// One telemetry reading as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsPacket {
    /// Host CPU utilization, `0.0..=1.0`.
    pub cpu_fraction: f32,
    /// Host resident-memory utilization, `0.0..=1.0`.
    pub mem_fraction: f32,
}

impl StatsPacket {
    #[must_use]
    pub fn new(cpu_fraction: f32, mem_fraction: f32) -> Self {
        Self {
            cpu_fraction,
            mem_fraction,
        }
    }

    /// Encode for transmission. Pure and deterministic; always
    /// [`PACKET_LEN`] bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[..4].copy_from_slice(&self.cpu_fraction.to_le_bytes());
        buf[4..].copy_from_slice(&self.mem_fraction.to_le_bytes());
        buf
    }

    /// Decode a packet received off the wire.
    ///
    /// The server never reads packets back; this is the reference decoder
    /// for client implementations and test harnesses.
    #[must_use]
    pub fn decode(buf: &[u8; PACKET_LEN]) -> Self {
        Self {
            cpu_fraction: f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            mem_fraction: f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}
