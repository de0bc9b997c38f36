//! The wait-state set: one flag per thing the bridge is still waiting on
//! before it may acknowledge the host with `ok`.
//!
//! The aggregate `waiting()` counter is derived from the set, so "waiting"
//! and "some flag is raised" can never disagree.

/// One reason the bridge is withholding `ok` from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Device action buffer has not drained yet.
    EmptyQueue,
    /// Tool 0 has not reached its target temperature.
    ExtruderA,
    /// Tool 1 has not reached its target temperature.
    ExtruderB,
    /// Heated build plate has not reached its target temperature.
    Platform,
    /// An LCD button press has not happened yet.
    Button,
    /// A just-launched SD print has not reported RUNNING yet.
    Start,
    /// Device rejected the last queueable command with buffer-full.
    Buffer,
    /// We sent an abort and the device has not confirmed the cancel.
    BotCancel,
    /// SD print is paused; waiting for the unpause button.
    Unpause,
    /// Host cancel gcode arrived before the device's cancel event.
    CancelSync,
}

impl WaitReason {
    pub const ALL: [WaitReason; 10] = [
        WaitReason::EmptyQueue,
        WaitReason::ExtruderA,
        WaitReason::ExtruderB,
        WaitReason::Platform,
        WaitReason::Button,
        WaitReason::Start,
        WaitReason::Buffer,
        WaitReason::BotCancel,
        WaitReason::Unpause,
        WaitReason::CancelSync,
    ];

    fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Set of raised wait reasons.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WaitState {
    bits: u16,
}

impl WaitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, reason: WaitReason) {
        self.bits |= reason.bit();
    }

    pub fn clear(&mut self, reason: WaitReason) {
        self.bits &= !reason.bit();
    }

    /// Raise or drop `reason` depending on `on`.
    pub fn assign(&mut self, reason: WaitReason, on: bool) {
        if on {
            self.set(reason);
        } else {
            self.clear(reason);
        }
    }

    pub fn contains(&self, reason: WaitReason) -> bool {
        self.bits & reason.bit() != 0
    }

    pub fn any(&self) -> bool {
        self.bits != 0
    }

    /// Number of raised reasons; nonzero exactly when `any()`.
    pub fn waiting(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn clear_all(&mut self) {
        self.bits = 0;
    }
}
