//! Shared fixtures: a scripted device port, a mock clock, and a miniature
//! command parser standing in for the external gcode-to-packet converter.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use x3g_bridge::dispatcher::{CommandParser, Dispatcher};
use x3g_bridge::error::BridgeError;
use x3g_bridge::protocol::{command, tool_query, PortHandler, ReplyPayload, FRAME_START};
use x3g_bridge::session::{HostCommand, Session};
use x3g_bridge::time::TimeSource;
use x3g_bridge::wait::WaitReason;

/// Queueable commands the mini parser emits that the translator treats
/// generically.
pub const QUEUE_TOOL_ACTION: u8 = 136;
pub const QUEUE_EXTENDED_POINT: u8 = 142;

pub fn query_packet(cmd: u8) -> Vec<u8> {
    vec![FRAME_START, 1, cmd, 0]
}

pub fn tool_packet(cmd: u8, tool: u8) -> Vec<u8> {
    vec![FRAME_START, 2, cmd, tool]
}

pub fn tool_query_packet(sub: u8, tool: u8) -> Vec<u8> {
    vec![FRAME_START, 3, command::TOOL_QUERY, tool, sub]
}

/// Device port that replays a scripted sequence of replies and records
/// every packet it was handed.
pub struct ScriptedPort {
    pub script: Rc<RefCell<VecDeque<Result<ReplyPayload, BridgeError>>>>,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl PortHandler for ScriptedPort {
    fn roundtrip(&mut self, packet: &[u8]) -> Result<ReplyPayload, BridgeError> {
        self.sent.borrow_mut().push(packet.to_vec());
        self.script
            .borrow_mut()
            .pop_front()
            .expect("device script exhausted")
    }
}

#[derive(Debug, Clone)]
pub struct MockClock(pub Rc<Cell<SystemTime>>);

impl TimeSource for MockClock {
    fn now(&self) -> SystemTime {
        self.0.get()
    }
}

/// Just enough of the gcode converter to drive the translator the way the
/// real one does: set the host context, emit packets, feed replies through
/// `Session::translate`.
pub struct MiniParser;

impl MiniParser {
    fn poll_temperatures(&mut self, session: &mut Session) -> Result<(), BridgeError> {
        let tools = session.machine.extruder_count.clamp(1, 2) as u8;
        for tool in 0..tools {
            session.translate(&tool_query_packet(tool_query::GET_TEMP, tool))?;
            session.translate(&tool_query_packet(tool_query::GET_TOOL_TARGET, tool))?;
        }
        session.translate(&tool_query_packet(tool_query::GET_PLATFORM_TEMP, 0))?;
        session.translate(&tool_query_packet(tool_query::GET_PLATFORM_TARGET, 0))?;
        if session.wait.contains(WaitReason::EmptyQueue) {
            session.translate(&query_packet(command::IS_READY))?;
        }
        if session.wait.contains(WaitReason::ExtruderA) {
            session.translate(&tool_query_packet(tool_query::IS_TOOL_READY, 0))?;
        }
        if session.wait.contains(WaitReason::ExtruderB) {
            session.translate(&tool_query_packet(tool_query::IS_TOOL_READY, 1))?;
        }
        if session.wait.contains(WaitReason::Platform) {
            session.translate(&tool_query_packet(tool_query::IS_PLATFORM_READY, 0))?;
        }
        Ok(())
    }
}

fn tool_argument(rest: &str) -> u8 {
    rest.split_whitespace()
        .find_map(|word| word.strip_prefix('T'))
        .and_then(|t| t.parse().ok())
        .unwrap_or(0)
}

impl CommandParser for MiniParser {
    fn convert_line(&mut self, session: &mut Session, line: &str) -> Result<(), BridgeError> {
        let line = line.trim();
        session.host = HostCommand::default();

        if line.is_empty() || line.starts_with(';') || line.starts_with('(') {
            return Ok(());
        }
        if line == "@clear_cancel" {
            session.emit_result("@clear_cancel");
            return Ok(());
        }
        if line == "@poll_build" {
            return session.translate(&query_packet(command::GET_BUILD_STATS));
        }
        if line == "@poll_board" {
            return session.translate(&query_packet(command::GET_MOTHERBOARD_STATUS));
        }

        let word = line.split_whitespace().next().unwrap_or("");
        let rest = line[word.len()..].trim();
        match word {
            "M105" => {
                session.host.mcode = Some(105);
                self.poll_temperatures(session)
            }
            "M109" => {
                session.host.mcode = Some(109);
                let tool = tool_argument(rest);
                session.translate(&tool_packet(QUEUE_TOOL_ACTION, tool))?;
                session.translate(&tool_packet(command::WAIT_FOR_TOOL, tool))
            }
            "M190" => {
                session.host.mcode = Some(190);
                session.translate(&tool_packet(QUEUE_TOOL_ACTION, 0))?;
                session.translate(&tool_packet(command::WAIT_FOR_PLATFORM, 0))
            }
            "M112" => {
                session.host.mcode = Some(112);
                session.translate(&query_packet(command::ABORT))
            }
            "M114" => {
                session.host.mcode = Some(114);
                session.translate(&query_packet(command::GET_EXTENDED_POSITION))
            }
            "M115" => {
                session.host.mcode = Some(115);
                session.translate(&query_packet(command::GET_ADVANCED_VERSION))
            }
            "M27" => {
                session.host.mcode = Some(27);
                session.translate(&query_packet(command::GET_BUILD_STATS))
            }
            "M20" => {
                session.host.mcode = Some(20);
                session.translate(&query_packet(command::GET_NEXT_FILENAME))?;
                for _ in 0..64 {
                    if !session.flags.listing_files {
                        break;
                    }
                    session.translate(&query_packet(command::GET_NEXT_FILENAME))?;
                }
                Ok(())
            }
            "M21" => {
                session.host.mcode = Some(21);
                session.translate(&query_packet(command::GET_NEXT_FILENAME))
            }
            "M23" => {
                session.host.mcode = Some(23);
                session.selected_file = Some(rest.to_string());
                session.translate(&[])
            }
            "M24" => {
                session.host.mcode = Some(24);
                session.translate(&query_packet(command::PLAYBACK_CAPTURE))
            }
            "M28" => {
                session.host.mcode = Some(28);
                session.host.argument = Some(rest.to_string());
                session.translate(&query_packet(command::CAPTURE_TO_FILE))
            }
            "M29" => {
                session.host.mcode = Some(29);
                session.translate(&query_packet(command::END_CAPTURE))
            }
            "M70" => {
                session.host.mcode = Some(70);
                session.translate(&tool_packet(command::DISPLAY_MESSAGE, 0))
            }
            "M71" => {
                session.host.mcode = Some(71);
                session.translate(&tool_packet(command::PAUSE_FOR_BUTTON, 0))
            }
            "G0" | "G1" => session.translate(&query_packet(QUEUE_EXTENDED_POINT)),
            "G4" => session.translate(&query_packet(command::DELAY)),
            "G28" => session.translate(&query_packet(command::HOME_AXES_MIN)),
            "T0" => {
                session.current_extruder = 0;
                Ok(())
            }
            "T1" => {
                session.current_extruder = 1;
                Ok(())
            }
            // settings-only commands produce no packets
            _ => Ok(()),
        }
    }
}

/// A dispatcher wired to the scripted port and mock clock, driven the same
/// way the daemon drives it: one `line()` call per host line.
pub struct Harness {
    pub dispatcher: Dispatcher<MiniParser>,
    pub script: Rc<RefCell<VecDeque<Result<ReplyPayload, BridgeError>>>>,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub clock: Rc<Cell<SystemTime>>,
}

impl Harness {
    pub fn new() -> Self {
        let script = Rc::new(RefCell::new(VecDeque::new()));
        let sent = Rc::new(RefCell::new(Vec::new()));
        let clock = Rc::new(Cell::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000),
        ));

        let mut session = Session::new();
        session.set_time_source(Box::new(MockClock(clock.clone())));
        session
            .connect(
                Box::new(ScriptedPort {
                    script: script.clone(),
                    sent: sent.clone(),
                }),
                0,
            )
            .expect("connect");
        session.translation.clear();

        Self {
            dispatcher: Dispatcher::new(session, MiniParser),
            script,
            sent,
            clock,
        }
    }

    pub fn session(&self) -> &Session {
        self.dispatcher.session()
    }

    pub fn session_mut(&mut self) -> &mut Session {
        self.dispatcher.session_mut()
    }

    pub fn push(&self, reply: ReplyPayload) {
        self.script.borrow_mut().push_back(Ok(reply));
    }

    pub fn push_err(&self, err: BridgeError) {
        self.script.borrow_mut().push_back(Err(err));
    }

    pub fn advance(&self, secs: u64) {
        self.clock.set(self.clock.get() + Duration::from_secs(secs));
    }

    pub fn rewind(&self, secs: u64) {
        self.clock.set(self.clock.get() - Duration::from_secs(secs));
    }

    /// Run one host line through the same prologue/epilogue the daemon
    /// uses, returning the translation and the dispatch status.
    pub fn line(&mut self, line: &str) -> (String, Result<(), BridgeError>) {
        {
            let session = self.dispatcher.session_mut();
            session.translation.clear();
            session.wait.clear(WaitReason::Buffer);
            session.flags.ok_pending = !session.is_waiting();
        }
        let status = self.dispatcher.dispatch(line);
        let session = self.dispatcher.session_mut();
        session.flags.ok_pending = false;
        (session.translation.as_str().to_string(), status)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
