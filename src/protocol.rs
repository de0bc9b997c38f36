//! The slice of the X3G device protocol the translator needs to see: packet
//! header offsets, the command ids it reacts to, and the decoded reply
//! fields handed back by the packet codec.
//!
//! Framing, CRC and retries live in the external codec behind the
//! [`PortHandler`] trait; the translator only inspects the first bytes of
//! an outgoing packet and the decoded payload of the reply.

use crate::error::BridgeError;

/// First byte of every framed packet.
pub const FRAME_START: u8 = 0xD5;
/// Offset of the device command id in a framed packet.
pub const COMMAND_OFFSET: usize = 2;
/// Offset of the target tool id, where the command carries one.
pub const EXTRUDER_ID_OFFSET: usize = 3;
/// Offset of the sub-query id of a tool query.
pub const QUERY_COMMAND_OFFSET: usize = 4;

/// Device command ids the translator reacts to.
pub mod command {
    pub const CLEAR_BUFFER: u8 = 3;
    pub const ABORT: u8 = 7;
    pub const TOOL_QUERY: u8 = 10;
    pub const IS_READY: u8 = 11;
    pub const CAPTURE_TO_FILE: u8 = 14;
    pub const END_CAPTURE: u8 = 15;
    pub const PLAYBACK_CAPTURE: u8 = 16;
    pub const RESET: u8 = 17;
    pub const GET_NEXT_FILENAME: u8 = 18;
    pub const GET_EXTENDED_POSITION: u8 = 21;
    pub const GET_MOTHERBOARD_STATUS: u8 = 23;
    pub const GET_BUILD_STATS: u8 = 24;
    pub const GET_ADVANCED_VERSION: u8 = 27;
    pub const HOME_AXES_MIN: u8 = 131;
    pub const HOME_AXES_MAX: u8 = 132;
    pub const DELAY: u8 = 133;
    pub const WAIT_FOR_TOOL: u8 = 135;
    pub const WAIT_FOR_PLATFORM: u8 = 141;
    pub const RECALL_HOME_POSITION: u8 = 144;
    pub const PAUSE_FOR_BUTTON: u8 = 148;
    pub const DISPLAY_MESSAGE: u8 = 149;
}

/// Sub-query ids of [`command::TOOL_QUERY`].
pub mod tool_query {
    pub const GET_TEMP: u8 = 2;
    pub const IS_TOOL_READY: u8 = 22;
    pub const GET_PLATFORM_TEMP: u8 = 30;
    pub const GET_TOOL_TARGET: u8 = 32;
    pub const GET_PLATFORM_TARGET: u8 = 33;
    pub const IS_PLATFORM_READY: u8 = 35;
}

/// Firmware variant tags reported by command 27.
pub const VARIANT_MAKERBOT: u8 = 0x01;
pub const VARIANT_SAILFISH: u8 = 0x80;

/// Commands with the top bit set enter the device action buffer and may be
/// rejected with buffer-full; everything else is an immediate query.
pub fn is_queueable(command: u8) -> bool {
    command & 0x80 != 0
}

/// Minimal frame for an argument-less query the translator issues itself.
pub fn encode_query(command: u8) -> [u8; 4] {
    [FRAME_START, 1, command, 0]
}

/// State of the build as reported by command 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    None,
    Running,
    FinishedNormally,
    Paused,
    Canceled,
    Cancelling,
}

impl BuildState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BuildState::None),
            1 => Some(BuildState::Running),
            2 => Some(BuildState::FinishedNormally),
            3 => Some(BuildState::Paused),
            4 => Some(BuildState::Canceled),
            5 => Some(BuildState::Cancelling),
            _ => None,
        }
    }
}

/// Motherboard status bitfield from command 23.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MotherboardStatus(pub u8);

impl MotherboardStatus {
    pub const BUILD_CANCELLING: u8 = 0x20;
    pub const HEAT_SHUTDOWN: u8 = 0x40;
    pub const POWER_ERROR: u8 = 0x80;

    pub fn is_clear(self) -> bool {
        self.0 == 0
    }

    pub fn build_cancelling(self) -> bool {
        self.0 & Self::BUILD_CANCELLING != 0
    }

    pub fn heat_shutdown(self) -> bool {
        self.0 & Self::HEAT_SHUTDOWN != 0
    }

    pub fn power_error(self) -> bool {
        self.0 & Self::POWER_ERROR != 0
    }
}

/// Decoded fields of a successful device reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// Plain acknowledgement with no payload.
    Ack,
    /// Temperature in degrees C (current or target, by query).
    Temperature(u16),
    /// Readiness answer of an is-ready style query.
    Ready(bool),
    /// SD subsystem status code.
    SdStatus(u8),
    /// One entry of the SD listing; an empty name ends the listing.
    SdFilename { status: u8, name: String },
    /// Extended position in raw steps.
    Position { x: i32, y: i32, z: i32, a: i32, b: i32 },
    Motherboard(MotherboardStatus),
    BuildStats { state: BuildState, line_number: u32 },
    Firmware { variant: u8, version: u16 },
}

/// The packet codec peer: frames a packet, performs the serial round trip
/// with CRC and retries, and decodes the reply.
pub trait PortHandler {
    fn roundtrip(&mut self, packet: &[u8]) -> Result<ReplyPayload, BridgeError>;
}
