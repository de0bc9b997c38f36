//! Session state and lifecycle: everything the translator and dispatcher
//! share for one bridge connection, threaded explicitly instead of living
//! in a process-wide static.

use std::fmt::Write;
use std::time::{Duration, SystemTime};

use crate::error::BridgeError;
use crate::machine::{MachineProfile, ProfileError};
use crate::protocol::PortHandler;
use crate::strtab::StringTable;
use crate::time::{TimeSource, WallClock};
use crate::translation::TranslationBuffer;
use crate::wait::{WaitReason, WaitState};

/// Program state of the gcode stream being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgramState {
    Ready,
    Running,
    Ended,
}

/// Scalar state bits distinct from the wait flags.
#[derive(Debug, Default, Clone)]
pub struct SessionFlags {
    /// We owe the host an `ok` as soon as anything else is printed, or at
    /// finalize.
    pub ok_pending: bool,
    /// Device raised a cancel; host acknowledgement deferred until
    /// `@clear_cancel`.
    pub cancel_pending: bool,
    /// Mid-emission of a multi-line file listing.
    pub listing_files: bool,
    /// Next time the device reports idle, query the position and record
    /// unknown axes.
    pub get_pos_when_ready: bool,
    /// A cancel wiped an active wait; remembered for bookkeeping.
    pub wait_cleared_by_cancel: bool,
    pub macros_enabled: bool,
    /// Emulation quirk: fan control always targets the valve output.
    pub fan_always_valve: bool,
}

/// Axis position cache in millimeters.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
}

/// Bits of `Session::position_known`.
pub mod axis {
    pub const X: u8 = 1 << 0;
    pub const Y: u8 = 1 << 1;
    pub const Z: u8 = 1 << 2;
    pub const A: u8 = 1 << 3;
    pub const B: u8 = 1 << 4;
}

/// The host command the external parser is currently emitting packets for.
#[derive(Debug, Default, Clone)]
pub struct HostCommand {
    /// Active M-code, when the line had one.
    pub mcode: Option<u32>,
    /// String argument of the command (e.g. a capture filename).
    pub argument: Option<String>,
}

/// One bridge connection's worth of state.
///
/// Owns the response buffer, the wait set, the SD filename cache and the
/// device port; the external command parser borrows it for the duration of
/// a line.
pub struct Session {
    pub translation: TranslationBuffer,
    pub wait: WaitState,
    pub flags: SessionFlags,
    pub files: StringTable,
    pub machine: MachineProfile,
    pub host: HostCommand,
    /// Filename the host asked to select with M23.
    pub selected_file: Option<String>,
    pub program_state: ProgramState,
    pub current_extruder: u8,
    pub current: Axes,
    pub position_known: u8,
    /// Sub-step extrusion remainders, zeroed when a build is cancelled.
    pub excess_a: f64,
    pub excess_b: f64,
    pub(crate) deadline: Option<SystemTime>,
    pub(crate) clock: Box<dyn TimeSource>,
    pub(crate) port: Option<Box<dyn PortHandler>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            translation: TranslationBuffer::new(),
            wait: WaitState::new(),
            flags: SessionFlags {
                fan_always_valve: true,
                ..SessionFlags::default()
            },
            files: StringTable::new(),
            machine: MachineProfile::default(),
            host: HostCommand::default(),
            selected_file: None,
            program_state: ProgramState::Ready,
            current_extruder: 0,
            current: Axes::default(),
            position_known: 0,
            excess_a: 0.0,
            excess_b: 0.0,
            deadline: None,
            clock: Box::new(WallClock),
            port: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.wait.any()
    }

    pub fn waiting(&self) -> u32 {
        self.wait.waiting()
    }

    pub fn sd_start_deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    pub fn set_time_source(&mut self, clock: Box<dyn TimeSource>) {
        self.clock = clock;
    }

    /// Attach the device port and emit the connect banner. `baud` 0 maps to
    /// 115200; an unsupported rate is rejected before the port is touched.
    /// Returns the effective baud rate.
    pub fn connect(&mut self, port: Box<dyn PortHandler>, baud: u32) -> Result<u32, BridgeError> {
        let baud = validate_baud(baud)?;
        self.port = Some(port);
        self.translation.clear();
        let _ = write!(self.translation, "start\n");
        tracing::info!(baud, "bridge connected");
        Ok(baud)
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Release the port and restore the canonical idle state, including the
    /// default machine profile.
    pub fn cleanup(&mut self) {
        self.port = None;
        self.files.clear();
        self.wait.clear_all();
        self.flags = SessionFlags {
            fan_always_valve: true,
            ..SessionFlags::default()
        };
        self.deadline = None;
        self.selected_file = None;
        self.host = HostCommand::default();
        self.translation.clear();
        self.machine = MachineProfile::default();
        tracing::debug!("session cleaned up");
    }

    /// Reset to a canonical idle state after a device-initiated cancel: the
    /// action buffer still has to drain, everything else starts over.
    pub fn clear_state_for_cancel(&mut self) {
        self.program_state = ProgramState::Ready;
        self.position_known = 0;
        self.excess_a = 0.0;
        self.excess_b = 0.0;
        if self.wait.any() {
            self.flags.wait_cleared_by_cancel = true;
            tracing::debug!("cancel cleared an active wait");
        }
        self.wait.clear_all();
        self.wait.set(WaitReason::EmptyQueue);
        self.flags.get_pos_when_ready = false;
    }

    /// Switch to a built-in machine profile by id.
    pub fn set_machine(&mut self, id: &str) -> Result<(), ProfileError> {
        match MachineProfile::named(id) {
            Some(profile) => {
                self.machine = profile;
                Ok(())
            }
            None => Err(ProfileError::UnknownMachine(id.to_string())),
        }
    }

    /// Result callback for the external parser: internal pseudo-commands
    /// and `// echo: ` lines.
    pub fn emit_result(&mut self, message: &str) {
        if message == "@clear_cancel" {
            if !self.flags.cancel_pending && self.program_state == ProgramState::Running {
                // cancel gcode raced ahead of the device's cancel event
                tracing::debug!("@clear_cancel before the cancel event; waiting for the abort");
                self.wait.set(WaitReason::CancelSync);
            } else {
                self.flags.cancel_pending = false;
                self.wait.set(WaitReason::EmptyQueue);
            }
            return;
        }
        if self.flags.ok_pending {
            self.flags.ok_pending = false;
            let _ = write!(self.translation, "ok");
        }
        if !self.translation.is_empty() && !self.translation.ends_with_newline() {
            let _ = writeln!(self.translation);
        }
        let _ = write!(self.translation, "// echo: {message}");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a requested baud rate onto the supported set; 0 selects the default
/// of 115200.
pub fn validate_baud(baud: u32) -> Result<u32, BridgeError> {
    let baud = if baud == 0 { 115_200 } else { baud };
    match baud {
        4_800 | 9_600 | 19_200 | 38_400 | 57_600 | 115_200 => Ok(baud),
        #[cfg(target_os = "macos")]
        14_400 | 28_800 => Ok(baud),
        _ => {
            tracing::warn!(baud, "unsupported baud rate");
            Err(BridgeError::BadBaud(baud))
        }
    }
}

/// Open the downstream serial port at a validated baud rate.
pub fn open_serial_port(
    path: &str,
    baud: u32,
) -> Result<Box<dyn serialport::SerialPort>, BridgeError> {
    let baud = validate_baud(baud)?;
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(500))
        .open()?;
    tracing::info!(path, baud, "opened X3G serial port");
    Ok(port)
}
