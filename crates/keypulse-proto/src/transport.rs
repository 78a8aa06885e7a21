//! Codec for the packet-out / ack-in connection stream.
//!
//! Outgoing items are [`StatsPacket`]s, one packet per TCP write. Incoming
//! bytes are acknowledgements: every byte a client sends is one [`Ack`].
//! The ack value is not interpreted anywhere (only its presence within the
//! read window matters), but the raw byte is kept for verbose logging.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{PACKET_LEN, StatsPacket};

/// One acknowledgement byte received from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// The byte as received. Presence matters; the value does not.
    pub raw: u8,
}

/// Codec framing [`StatsPacket`]s out and [`Ack`]s in.
#[derive(Debug, Default)]
pub struct StatsCodec;

impl StatsCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<StatsPacket> for StatsCodec {
    type Error = io::Error;

    fn encode(&mut self, item: StatsPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(PACKET_LEN);
        dst.put_slice(&item.encode());
        Ok(())
    }
}

impl Decoder for StatsCodec {
    type Item = Ack;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(Ack { raw: src.get_u8() }))
    }
}
