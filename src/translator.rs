//! Response translation: consume one decoded device reply, update the wait
//! set, and append the host-protocol text the reply maps to.

use std::fmt::Write;
use std::time::Duration;

use crate::error::{BridgeError, DeviceCode};
use crate::protocol::{
    self, command, is_queueable, tool_query, BuildState, MotherboardStatus, ReplyPayload,
    COMMAND_OFFSET, EXTRUDER_ID_OFFSET, QUERY_COMMAND_OFFSET, VARIANT_MAKERBOT, VARIANT_SAILFISH,
};
use crate::session::{axis, Session};
use crate::wait::WaitReason;

/// A freshly-launched SD print gets this long to leave status NONE before
/// "Not SD printing" is reported.
const SD_START_GRACE: Duration = Duration::from_secs(3);
/// A deadline further out than this means the clock jumped; stop gating.
const CLOCK_JUMP_LIMIT: Duration = Duration::from_secs(4);

const MAKERBOT_FIRMWARE_URL: &str = "https://support.makerbot.com/learn/earlier-products/replicator-original/updating-firmware-for-the-makerbot-replicator-via-replicatorg_13302";
const SAILFISH_FIRMWARE_URL: &str = "http://www.sailfishfirmware.com";

impl Session {
    /// Translate one outgoing packet's device round trip into host text.
    ///
    /// An empty `packet` marks a host command with no device equivalent.
    /// Device status codes come back as `BridgeError::Device` for the
    /// dispatcher to render.
    pub fn translate(&mut self, packet: &[u8]) -> Result<(), BridgeError> {
        if self.flags.ok_pending {
            // ok means: ready for another command, not that everything worked
            self.flags.ok_pending = false;
            let _ = write!(self.translation, "ok");
        }

        if packet.is_empty() {
            self.translate_unmapped();
            return Ok(());
        }
        if packet.len() <= EXTRUDER_ID_OFFSET {
            return Err(BridgeError::Logic(format!(
                "short packet ({} bytes)",
                packet.len()
            )));
        }

        let command = packet[COMMAND_OFFSET];
        let tool = packet[EXTRUDER_ID_OFFSET];

        // residue headed for the cancel goes in the bit bucket
        if self.flags.cancel_pending && is_queueable(command) {
            tracing::debug!(command, "dropping queueable command while cancel pending");
            return Ok(());
        }

        let reply = match self.port.as_mut() {
            Some(port) => port.roundtrip(packet)?,
            None => return Err(BridgeError::Logic("no device port attached".to_string())),
        };

        // a queueable command made it into the action buffer
        if is_queueable(command) {
            self.wait.clear(WaitReason::Buffer);
        }

        self.apply_reply(command, tool, packet, reply)
    }

    /// Host commands that produce no packet; only M23 needs emulation here.
    fn translate_unmapped(&mut self) {
        if self.host.mcode != Some(23) {
            return;
        }
        let Some(name) = self.selected_file.take() else {
            return;
        };
        // hosts expect case-insensitive selection; answer with the exact
        // name the device reported
        let canonical = match self.files.find_nocase(&name) {
            Some(index) => self
                .files
                .get(index)
                .map(str::to_string)
                .unwrap_or(name),
            None => name,
        };
        let _ = write!(
            self.translation,
            "\nFile opened:{canonical} Size:0\nFile selected:{canonical}"
        );
        self.selected_file = Some(canonical);
    }

    fn apply_reply(
        &mut self,
        command: u8,
        tool: u8,
        packet: &[u8],
        reply: ReplyPayload,
    ) -> Result<(), BridgeError> {
        match command {
            command::CLEAR_BUFFER | command::ABORT | command::RESET => {
                self.wait.clear_all();
                self.wait.set(WaitReason::BotCancel);
            }

            command::TOOL_QUERY => {
                let sub = packet.get(QUERY_COMMAND_OFFSET).copied().unwrap_or(0);
                self.apply_tool_query(sub, tool, reply);
            }

            command::IS_READY => {
                if let ReplyPayload::Ready(ready) = reply {
                    tracing::debug!(ready, "is-ready poll");
                    if ready {
                        self.wait.clear(WaitReason::EmptyQueue);
                        self.wait.clear(WaitReason::Button);
                        if self.flags.get_pos_when_ready {
                            self.query_extended_position()?;
                            self.flags.get_pos_when_ready = false;
                        }
                    }
                }
            }

            command::CAPTURE_TO_FILE => {
                if let Some(arg) = self.host.argument.as_deref() {
                    let _ = write!(self.translation, "\nWriting to file: {arg}");
                }
            }

            command::END_CAPTURE => {
                let _ = write!(self.translation, "\nDone saving file");
            }

            command::PLAYBACK_CAPTURE => {
                let status = match reply {
                    ReplyPayload::SdStatus(status) => status,
                    _ => 0,
                };
                if status == 7 {
                    let _ = write!(self.translation, "\nError: Not SD printing file not found");
                } else {
                    // swallow any pending ok until the build shows RUNNING
                    self.translation.clear();
                    self.deadline = Some(self.clock.now() + SD_START_GRACE);
                    self.wait.set(WaitReason::Start);
                }
            }

            command::GET_NEXT_FILENAME => self.apply_filename_reply(reply),

            command::GET_EXTENDED_POSITION => {
                if let ReplyPayload::Position { x, y, z, a, b } = reply {
                    self.apply_position_reply(x, y, z, a, b);
                }
            }

            command::GET_MOTHERBOARD_STATUS => {
                if let ReplyPayload::Motherboard(status) = reply {
                    return self.apply_motherboard_status(status);
                }
            }

            command::GET_BUILD_STATS => {
                if let ReplyPayload::BuildStats { state, line_number } = reply {
                    self.apply_build_stats(state, line_number);
                }
            }

            command::GET_ADVANCED_VERSION => {
                if let ReplyPayload::Firmware { variant, version } = reply {
                    self.apply_version_reply(variant, version);
                }
            }

            command::WAIT_FOR_TOOL => {
                self.translation.clear();
                tracing::debug!(tool, "waiting for tool temperature");
                self.wait.set(WaitReason::EmptyQueue);
                if tool == 0 {
                    self.wait.set(WaitReason::ExtruderA);
                } else {
                    self.wait.set(WaitReason::ExtruderB);
                }
            }

            command::WAIT_FOR_PLATFORM => {
                self.translation.clear();
                tracing::debug!("waiting for platform temperature");
                self.wait.set(WaitReason::EmptyQueue);
                self.wait.set(WaitReason::Platform);
            }

            command::HOME_AXES_MIN | command::HOME_AXES_MAX | command::RECALL_HOME_POSITION => {
                tracing::debug!("homing; wait for the queue, then ask for the position");
                self.translation.clear();
                self.wait.set(WaitReason::EmptyQueue);
                self.flags.get_pos_when_ready = true;
            }

            command::DELAY => {
                self.translation.clear();
                self.wait.set(WaitReason::EmptyQueue);
            }

            command::PAUSE_FOR_BUTTON | command::DISPLAY_MESSAGE => {
                self.translation.clear();
                tracing::debug!("waiting for an LCD button press");
                self.wait.set(WaitReason::Button);
            }

            _ => {}
        }

        Ok(())
    }

    fn apply_tool_query(&mut self, sub: u8, tool: u8, reply: ReplyPayload) {
        match sub {
            tool_query::GET_TEMP => {
                if let ReplyPayload::Temperature(temp) = reply {
                    let _ = write!(self.translation, " T");
                    if self.machine.extruder_count > 1 {
                        let _ = write!(self.translation, "{tool}");
                    }
                    let _ = write!(self.translation, ":{temp}");
                }
            }

            tool_query::IS_TOOL_READY => {
                if let ReplyPayload::Ready(ready) = reply {
                    let reason = if tool != 0 {
                        WaitReason::ExtruderB
                    } else {
                        WaitReason::ExtruderA
                    };
                    self.wait.assign(reason, !ready);
                }
            }

            tool_query::GET_PLATFORM_TEMP => {
                if let ReplyPayload::Temperature(temp) = reply {
                    let _ = write!(self.translation, " B:{temp}");
                }
            }

            tool_query::GET_TOOL_TARGET => {
                if let ReplyPayload::Temperature(target) = reply {
                    // the host turned the heater off mid-wait
                    if self.wait.any() && !self.wait.contains(WaitReason::EmptyQueue) && target == 0
                    {
                        let reason = if tool != 0 {
                            WaitReason::ExtruderB
                        } else {
                            WaitReason::ExtruderA
                        };
                        self.wait.clear(reason);
                    }
                    let _ = write!(self.translation, " /{target}");
                }
            }

            tool_query::GET_PLATFORM_TARGET => {
                if let ReplyPayload::Temperature(target) = reply {
                    if self.wait.any() && !self.wait.contains(WaitReason::EmptyQueue) && target == 0
                    {
                        self.wait.clear(WaitReason::Platform);
                    }
                    let _ = write!(self.translation, " /{target}");
                }
            }

            tool_query::IS_PLATFORM_READY => {
                if let ReplyPayload::Ready(ready) = reply {
                    self.wait.assign(WaitReason::Platform, !ready);
                }
            }

            _ => {}
        }
    }

    fn apply_filename_reply(&mut self, reply: ReplyPayload) {
        let ReplyPayload::SdFilename { status, name } = reply else {
            return;
        };

        if !self.flags.listing_files && self.host.mcode == Some(21) {
            // a single next-filename round trip emulates M21
            if status == 0 {
                let _ = write!(self.translation, "\nSD card ok");
            } else {
                let _ = write!(self.translation, "\nSD init fail");
            }
            return;
        }

        if !self.flags.listing_files {
            let _ = write!(self.translation, "\nBegin file list\n");
            self.flags.listing_files = true;
            self.files.clear();
        }
        if name.is_empty() {
            let _ = write!(self.translation, "End file list");
            self.flags.listing_files = false;
        } else {
            let _ = writeln!(self.translation, "{name}");
            self.files.add(&name);
        }
    }

    fn apply_position_reply(&mut self, x: i32, y: i32, z: i32, a: i32, b: i32) {
        let x_mm = f64::from(x) / self.machine.x.steps_per_mm;
        let y_mm = f64::from(y) / self.machine.y.steps_per_mm;
        let z_mm = f64::from(z) / self.machine.z.steps_per_mm;
        let a_mm = f64::from(a) / self.machine.a.steps_per_mm;
        let b_mm = f64::from(b) / self.machine.b.steps_per_mm;
        let e_mm = if self.current_extruder == 1 { b_mm } else { a_mm };

        let _ = write!(
            self.translation,
            " X:{x_mm:.2} Y:{y_mm:.2} Z:{z_mm:.2} E:{e_mm:.2}"
        );

        // squirrel away axes the incoming stream never set, in case it does
        // a G92 without them
        if self.flags.get_pos_when_ready {
            if self.position_known & axis::X == 0 {
                self.current.x = x_mm;
            }
            if self.position_known & axis::Y == 0 {
                self.current.y = y_mm;
            }
            if self.position_known & axis::Z == 0 {
                self.current.z = z_mm;
            }
            if self.position_known & axis::A == 0 {
                self.current.a = a_mm;
            }
            if self.position_known & axis::B == 0 {
                self.current.b = b_mm;
            }
        }
    }

    fn apply_motherboard_status(&mut self, status: MotherboardStatus) -> Result<(), BridgeError> {
        if status.is_clear() {
            self.wait.clear(WaitReason::Button);
        } else if status.build_cancelling() {
            return Err(BridgeError::Device(DeviceCode::BuildCancelled));
        } else if status.heat_shutdown() {
            self.translation.clear();
            let _ = write!(
                self.translation,
                "Error: Heaters were shutdown after 30 minutes of inactivity"
            );
            return Err(BridgeError::Device(DeviceCode::BuildCancelled));
        } else if status.power_error() {
            self.translation.clear();
            let _ = write!(self.translation, "Error: Error detected in system power");
            return Err(BridgeError::Device(DeviceCode::BuildCancelled));
        }
        Ok(())
    }

    fn apply_build_stats(&mut self, state: BuildState, line_number: u32) {
        if self.wait.contains(WaitReason::BotCancel)
            && !matches!(
                state,
                BuildState::Running | BuildState::Paused | BuildState::Cancelling
            )
        {
            self.wait.clear(WaitReason::BotCancel);
        }

        let m27 = self.host.mcode == Some(27);
        if self.wait.contains(WaitReason::Start) || m27 {
            if let Some(deadline) = self.deadline {
                if state != BuildState::Running {
                    let now = self.clock.now();
                    if now < deadline {
                        match deadline.duration_since(now) {
                            Ok(delta) if delta > CLOCK_JUMP_LIMIT => {
                                // clock discontinuity; stop gating and report
                                tracing::warn!("SD start deadline is in the far future; clearing");
                                self.deadline = None;
                                self.wait.clear(WaitReason::Start);
                            }
                            _ => return, // too early to report
                        }
                    }
                }
            }
            match state {
                BuildState::None => {
                    let _ = write!(self.translation, "\nNot SD printing\n");
                }
                BuildState::Running => {
                    self.deadline = None;
                    self.wait.clear(WaitReason::Start);
                    let _ = write!(
                        self.translation,
                        "\nSD printing byte on line {line_number}/0"
                    );
                }
                BuildState::Canceled => {
                    // a cancelled build reports both lines
                    let _ = write!(self.translation, "\nSD printing cancelled.\n");
                    self.wait.clear_all();
                    self.flags.get_pos_when_ready = false;
                    let _ = write!(self.translation, "\nDone printing file\n");
                }
                BuildState::FinishedNormally => {
                    let _ = write!(self.translation, "\nDone printing file\n");
                }
                BuildState::Paused => {
                    let _ = write!(
                        self.translation,
                        "\nSD printing paused at line {line_number}\n"
                    );
                }
                BuildState::Cancelling => {
                    let _ = write!(
                        self.translation,
                        "\nSD printing sleeping at line {line_number}\n"
                    );
                }
            }
        } else {
            // routine check, or clearing a wait state
            match state {
                BuildState::None | BuildState::Running => {
                    if self.wait.contains(WaitReason::Unpause) {
                        self.wait.set(WaitReason::EmptyQueue);
                    }
                    self.wait.clear(WaitReason::Unpause);
                }
                BuildState::Paused => {
                    if !self.wait.contains(WaitReason::Unpause) {
                        self.wait.set(WaitReason::Unpause);
                        let _ = write!(
                            self.translation,
                            "\n// echo: Waiting for unpause button on the LCD panel\n"
                        );
                    }
                }
                _ => {
                    self.wait.clear(WaitReason::Unpause);
                }
            }
        }
    }

    fn apply_version_reply(&mut self, variant: u8, version: u16) {
        let (name, url) = match variant {
            VARIANT_MAKERBOT => ("Makerbot", MAKERBOT_FIRMWARE_URL),
            VARIANT_SAILFISH => ("Sailfish", SAILFISH_FIRMWARE_URL),
            _ => ("Unknown", "Unknown"),
        };
        if self.host.mcode == Some(115) {
            // the protocol version is the text protocol we emulate, not the
            // packet protocol we speak downstream
            let _ = write!(
                self.translation,
                " PROTOCOL_VERSION:0.1 FIRMWARE_NAME:{} FIRMWARE_VERSION:{}.{} FIRMWARE_URL:{} MACHINE_TYPE:{} EXTRUDER_COUNT:{}\n",
                name,
                version / 100,
                version % 100,
                url,
                self.machine.type_name,
                self.machine.extruder_count
            );
        } else {
            let _ = write!(self.translation, " {} v{}.{}", name, version / 100, version % 100);
        }
    }

    fn query_extended_position(&mut self) -> Result<(), BridgeError> {
        let packet = protocol::encode_query(command::GET_EXTENDED_POSITION);
        self.translate(&packet)
    }
}
