//! Drives one host line end to end: hand it to the command parser, patch up
//! program state, fall back to an implicit temperature poll while waiting,
//! render error codes as host text, and close the response with `ok` when
//! the line (or the error) cleared the wait.

use std::fmt::Write;

use crate::error::{BridgeError, DeviceCode};
use crate::session::{ProgramState, Session};
use crate::wait::WaitReason;

/// The external gcode-to-packet converter. For each host line it updates
/// `session.host`, encodes zero or more device packets and feeds each one
/// to [`Session::translate`].
pub trait CommandParser {
    fn convert_line(&mut self, session: &mut Session, line: &str) -> Result<(), BridgeError>;
}

/// Owns the session and the parser; one `dispatch` call per host line.
pub struct Dispatcher<P> {
    session: Session,
    parser: P,
}

impl<P: CommandParser> Dispatcher<P> {
    pub fn new(session: Session, parser: P) -> Self {
        Self { session, parser }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Run one host line. The translation buffer holds the full response
    /// afterwards; the returned status mirrors what was rendered into it.
    pub fn dispatch(&mut self, line: &str) -> Result<(), BridgeError> {
        let waiting_before = self.session.is_waiting();
        tracing::debug!(line, waiting = waiting_before, "dispatching host line");

        let rval = self.parser.convert_line(&mut self.session, line);

        if self.session.flags.ok_pending {
            self.session.flags.ok_pending = false;
            let _ = write!(self.session.translation, "ok");
        } else if waiting_before && !self.session.is_waiting() {
            let _ = write!(self.session.translation, "\nok");
        }

        self.finalize(rval)
    }

    /// Close out the response: implicit M105 while waiting, error text,
    /// trailing `ok` when this call cleared the wait.
    fn finalize(&mut self, mut rval: Result<(), BridgeError>) -> Result<(), BridgeError> {
        let waiting_before = self.session.is_waiting();

        if self.session.program_state > ProgramState::Running {
            self.session.program_state = ProgramState::Ready;
        }
        self.session.flags.macros_enabled = true;

        // waiting with nothing to show: give back current temps instead of
        // silence
        if rval.is_ok() && self.session.is_waiting() && self.session.translation.is_empty() {
            tracing::debug!("issuing implicit M105 poll");
            rval = self.parser.convert_line(&mut self.session, "M105");
        }

        let rval = self.apply_status(rval);

        if waiting_before && !self.session.is_waiting() {
            tracing::debug!("wait cleared; appending ok");
            if !self.session.translation.is_empty() && !self.session.translation.ends_with_newline()
            {
                let _ = writeln!(self.session.translation);
            }
            let _ = write!(self.session.translation, "ok");
        } else if self.session.translation.ends_with_newline() {
            self.session.translation.strip_trailing_newline();
        }

        rval
    }

    /// Map a non-success status onto the host-visible text.
    fn apply_status(&mut self, rval: Result<(), BridgeError>) -> Result<(), BridgeError> {
        let err = match rval {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        tracing::debug!(%err, "rendering error status");

        let session = &mut self.session;
        match &err {
            BridgeError::Os(_) => {
                session.translation.clear();
                let _ = write!(session.translation, "Error: OS error trying to access X3G port");
            }
            BridgeError::Logic(_) => {
                session.translation.clear();
                let _ = write!(session.translation, "Error: GPX error");
            }
            BridgeError::Serial(fault) => {
                session.translation.clear();
                let _ = write!(
                    session.translation,
                    "Error: Serial communication error on X3G port. code = {}",
                    fault.code()
                );
            }
            BridgeError::SerialTimeout => {
                session.translation.clear();
                let _ = write!(session.translation, "Error: Timeout on X3G port");
            }
            BridgeError::BadBaud(baud) => {
                session.translation.clear();
                let _ = write!(session.translation, "Error: Unsupported baud rate '{baud}'");
            }
            BridgeError::Device(code) => match code {
                DeviceCode::Generic => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: X3G generic packet error");
                }
                DeviceCode::BufferFull => {
                    // recoverable: the caller retries once the buffer drains
                    session.wait.set(WaitReason::Buffer);
                    if !session.translation.is_empty() && !session.translation.ends_with_newline() {
                        let _ = writeln!(session.translation);
                    }
                    let _ = write!(session.translation, "Status: Buffer full");
                }
                DeviceCode::BadCrc => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: X3G checksum mismatch");
                }
                DeviceCode::QueryTooBig => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: X3G query packet too big");
                }
                DeviceCode::Unsupported => {
                    session.translation.clear();
                    let _ = write!(
                        session.translation,
                        "Error: X3G command not supported or recognized"
                    );
                }
                DeviceCode::DownstreamTimeout => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: X3G timeout downstream");
                }
                DeviceCode::ToolLockTimeout => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: X3G timeout for tool lock");
                }
                DeviceCode::BuildCancelled => {
                    if session.wait.contains(WaitReason::BotCancel) {
                        // we told the bot to abort and this confirms it did
                        session.wait.clear(WaitReason::BotCancel);
                        tracing::debug!("device confirmed our abort");
                        return Ok(());
                    }
                    tracing::info!("device initiated a build cancel");
                    session.flags.cancel_pending = true;
                    session.clear_state_for_cancel();
                    if !session.translation.is_empty() && !session.translation.ends_with_newline() {
                        let _ = writeln!(session.translation);
                    }
                    let _ = write!(session.translation, "Build cancelled");
                }
                DeviceCode::SdPrinting => {
                    session.translation.clear();
                    let _ = write!(session.translation, "SD printing");
                }
                DeviceCode::Overheat => {
                    session.translation.clear();
                    let _ = write!(
                        session.translation,
                        "Error: RC_BOT_OVERHEAT Printer reports overheat condition"
                    );
                }
                DeviceCode::PacketTimeout => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: timeout");
                }
                DeviceCode::Unknown(code) => {
                    session.translation.clear();
                    let _ = write!(session.translation, "Error: Unknown error code: {code}");
                }
            },
        }

        Err(err)
    }
}
