//! Bidirectional protocol bridge that presents a binary-packet X3G printer
//! as a RepRap-style text-protocol printer.
//!
//! Host software writes newline-delimited gcode to the upstream pty; each
//! line is converted (by an external parser) into zero or more device
//! packets, and every device reply runs through the response translator,
//! which maintains the wait-state engine and synthesizes the text the host
//! expects — `ok` acknowledgements, temperature reports, SD listings,
//! build status, and cancel/backpressure recovery.
//!
//! The gcode parser and the packet codec live behind the [`CommandParser`]
//! and [`PortHandler`] traits; this crate owns everything between them.

pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod machine;
pub mod protocol;
pub mod session;
pub mod strtab;
pub mod time;
pub mod translation;
mod translator;
pub mod wait;

pub use dispatcher::{CommandParser, Dispatcher};
pub use error::{BridgeError, DeviceCode, SerialFault};
pub use machine::MachineProfile;
pub use protocol::{PortHandler, ReplyPayload};
pub use session::{ProgramState, Session};
pub use strtab::StringTable;
pub use translation::TranslationBuffer;
pub use wait::{WaitReason, WaitState};
