//! Frame layer (C4): pulls `[u24 length][u8 sequence][payload]` packets out
//! of a [`ReadBuffer`], concatenating the 0xFFFFFF-boundary multi-segment
//! case into a single logical payload.

use crate::buffer::ReadBuffer;
use crate::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

const MAX_SEGMENT: u32 = 0xFF_FFFF;

/// Zero-copy view of the 4-byte packet header: 3-byte little-endian
/// length followed by the 1-byte sequence id.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
struct PacketHeader {
    length: [u8; 3],
    sequence_id: u8,
}

impl PacketHeader {
    fn ref_from_prefix(data: &[u8]) -> Option<&Self> {
        if data.len() < 4 {
            return None;
        }
        Self::ref_from_bytes(&data[..4]).ok()
    }

    fn length(&self) -> u32 {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0])
    }
}

pub enum FramePoll {
    /// Not enough bytes buffered yet for a complete frame; wait for more.
    Pending,
    /// A complete (possibly multi-segment) packet is ready. Its bytes have
    /// already been consumed from the buffer. `sequence_id` isn't
    /// consulted by this core's own handshake dispatch, which only ever
    /// writes the next sequence number back; an upper layer dispatching
    /// further command/response packets needs it.
    Frame {
        #[allow(dead_code)]
        sequence_id: u8,
        payload: Vec<u8>,
    },
}

/// Tracks the sequence-id expected on the next incoming packet within one
/// command/response exchange (spec.md §4.4 invariant).
pub struct FrameReader {
    expected_seq: u8,
}

impl FrameReader {
    pub fn new() -> Self {
        Self { expected_seq: 0 }
    }

    /// Reset sequence tracking at the start of a new command/response
    /// exchange. Unused by this core, which only runs one exchange (the
    /// handshake) per connection; kept for an upper layer that issues
    /// further commands after `Status::Idle`.
    #[allow(dead_code)]
    pub fn reset_sequence(&mut self) {
        self.expected_seq = 0;
    }

    /// The sequence-id the caller's next write should use — one past the
    /// last packet seen in either direction — and bumps the counter so
    /// the packet this core reads next is checked against the right
    /// sequence-id. Sequence numbering is per-exchange, not per-reader:
    /// the server's next reply is one past the packet the client just
    /// sent, not one past the last packet this reader *read*.
    pub fn take_write_sequence(&mut self) -> u8 {
        let seq = self.expected_seq;
        self.expected_seq = self.expected_seq.wrapping_add(1);
        seq
    }

    /// The sequence-id expected on the next incoming packet, without
    /// consuming it the way [`Self::take_write_sequence`] does.
    #[cfg(test)]
    pub fn expected_sequence(&self) -> u8 {
        self.expected_seq
    }

    pub fn poll(&mut self, buf: &mut ReadBuffer) -> Result<FramePoll> {
        let mut payload = Vec::new();
        let mut first_sequence_id = None;

        loop {
            let unread = buf.unread();
            if unread.len() < 4 {
                return Ok(FramePoll::Pending);
            }

            let header = PacketHeader::ref_from_prefix(unread).ok_or(Error::InvalidPacket)?;
            let length = header.length();
            let sequence_id = header.sequence_id;
            let total = 4 + length as usize;
            if unread.len() < total {
                return Ok(FramePoll::Pending);
            }

            if sequence_id != self.expected_seq {
                return Err(Error::OutOfSequence {
                    expected: self.expected_seq,
                    actual: sequence_id,
                });
            }
            self.expected_seq = self.expected_seq.wrapping_add(1);

            payload.extend_from_slice(&unread[4..total]);
            let advanced = buf.advance_read(total);
            debug_assert!(advanced, "frame layer read within the bounds it just checked");
            let sequence_id = *first_sequence_id.get_or_insert(sequence_id);

            if length < MAX_SEGMENT {
                return Ok(FramePoll::Frame { sequence_id, payload });
            }
            // length == 0xFFFFFF: more segments follow, loop for the next header.
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
