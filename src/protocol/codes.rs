use num_enum::{IntoPrimitive, TryFromPrimitive};

/// opcode of a data / control frame: the payload is an application code for the
///  receiver's handler
pub const OPCODE_DATA: u8 = 0;
/// opcode of a liveness probe: the payload is a tag to be echoed back as `{0, tag}`
pub const OPCODE_PING: u8 = 1;

/// The protocol codes shared by both roles. They travel in the payload byte of a
///  frame - there is a single definition so that client and registrar can never
///  disagree on the magic numbers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProtocolCode {
    /// the tag of a pure liveness probe (also the probe opcode, a quirk inherited
    ///  from the wire format)
    Ping = 1,
    /// registration request / acknowledgement during the handshake
    Register = 2,
    /// voluntary session close. Declared for completeness - eviction is driven by
    ///  the heartbeat, so nothing in this crate sends it.
    Deregister = 3,
    Activate = 4,
    Deactivate = 5,
}
