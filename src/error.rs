//! Error taxonomy for the bridge: OS and transport faults on one side,
//! device-reported packet status codes on the other.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("OS error trying to access X3G port: {0}")]
    Os(#[from] std::io::Error),
    #[error("bridge error: {0}")]
    Logic(String),
    #[error("serial communication error on X3G port: {0}")]
    Serial(SerialFault),
    #[error("timeout on X3G port")]
    SerialTimeout,
    #[error("unsupported baud rate '{0}'")]
    BadBaud(u32),
    #[error("device packet error: {0}")]
    Device(DeviceCode),
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        BridgeError::Os(err.into())
    }
}

/// Transport-level faults raised by the packet codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerialFault {
    #[error("write failed")]
    Write,
    #[error("read failed")]
    Read,
    #[error("framing error")]
    Frame,
    #[error("CRC mismatch")]
    Crc,
}

impl SerialFault {
    /// Numeric code surfaced to the host in the serial error line.
    pub fn code(self) -> i32 {
        match self {
            SerialFault::Write => -2,
            SerialFault::Read => -3,
            SerialFault::Frame => -4,
            SerialFault::Crc => -5,
        }
    }
}

/// Non-success response codes of the device protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceCode {
    #[error("generic packet error")]
    Generic,
    #[error("action buffer full")]
    BufferFull,
    #[error("packet CRC mismatch")]
    BadCrc,
    #[error("query packet too big")]
    QueryTooBig,
    #[error("command not supported or recognized")]
    Unsupported,
    #[error("downstream timeout")]
    DownstreamTimeout,
    #[error("tool lock timeout")]
    ToolLockTimeout,
    #[error("build cancelled")]
    BuildCancelled,
    #[error("busy printing from SD")]
    SdPrinting,
    #[error("overheat condition")]
    Overheat,
    #[error("packet timeout")]
    PacketTimeout,
    #[error("unknown response code {0:#04x}")]
    Unknown(u8),
}

impl DeviceCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x80 => DeviceCode::Generic,
            0x82 => DeviceCode::BufferFull,
            0x83 => DeviceCode::BadCrc,
            0x84 => DeviceCode::QueryTooBig,
            0x85 => DeviceCode::Unsupported,
            0x87 => DeviceCode::DownstreamTimeout,
            0x88 => DeviceCode::ToolLockTimeout,
            0x89 => DeviceCode::BuildCancelled,
            0x8A => DeviceCode::SdPrinting,
            0x8B => DeviceCode::Overheat,
            0x8C => DeviceCode::PacketTimeout,
            other => DeviceCode::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DeviceCode::Generic => 0x80,
            DeviceCode::BufferFull => 0x82,
            DeviceCode::BadCrc => 0x83,
            DeviceCode::QueryTooBig => 0x84,
            DeviceCode::Unsupported => 0x85,
            DeviceCode::DownstreamTimeout => 0x87,
            DeviceCode::ToolLockTimeout => 0x88,
            DeviceCode::BuildCancelled => 0x89,
            DeviceCode::SdPrinting => 0x8A,
            DeviceCode::Overheat => 0x8B,
            DeviceCode::PacketTimeout => 0x8C,
            DeviceCode::Unknown(code) => code,
        }
    }
}
