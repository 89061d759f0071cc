use bytes::Buf;

use crate::protocol::codes::{OPCODE_DATA, OPCODE_PING};

/// every valid datagram of this protocol is exactly this long
pub const FRAME_LEN: usize = 2;

/// The two-byte wire frame: `{opcode, payload}`. Stateless encode / decode, the
///  only failure mode being a datagram of the wrong length.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: u8,
}

impl Frame {
    /// a liveness probe carrying a caller-chosen correlation tag
    pub fn ping(tag: u8) -> Frame {
        Frame { opcode: OPCODE_PING, payload: tag }
    }

    /// the reply to a probe - echoes the tag with the data opcode
    pub fn pong(tag: u8) -> Frame {
        Frame { opcode: OPCODE_DATA, payload: tag }
    }

    /// a data / control frame carrying an application code
    pub fn data(code: u8) -> Frame {
        Frame { opcode: OPCODE_DATA, payload: code }
    }

    pub fn is_ping(&self) -> bool {
        self.opcode == OPCODE_PING
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        [self.opcode, self.payload]
    }

    /// `None` for any datagram that is not exactly [`FRAME_LEN`] bytes - including
    ///  the empty datagram, which the protocol treats as invalid
    pub fn decode(raw: &[u8]) -> Option<Frame> {
        if raw.len() != FRAME_LEN {
            return None;
        }
        let mut buf = raw;
        Some(Frame {
            opcode: buf.get_u8(),
            payload: buf.get_u8(),
        })
    }
}
