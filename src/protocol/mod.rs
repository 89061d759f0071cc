mod codes;
mod frame;

pub use codes::{ProtocolCode, OPCODE_DATA, OPCODE_PING};
pub use frame::{Frame, FRAME_LEN};
