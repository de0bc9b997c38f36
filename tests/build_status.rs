//! Build-status reporting: M27 responses, the SD-start grace period, and
//! the pause/unpause echo.

mod common;

use common::Harness;
use x3g_bridge::protocol::{BuildState, ReplyPayload};
use x3g_bridge::wait::WaitReason;

fn push_temps(harness: &Harness) {
    harness.push(ReplyPayload::Temperature(20));
    harness.push(ReplyPayload::Temperature(0));
    harness.push(ReplyPayload::Temperature(20));
    harness.push(ReplyPayload::Temperature(0));
}

fn stats(state: BuildState, line_number: u32) -> ReplyPayload {
    ReplyPayload::BuildStats { state, line_number }
}

/// Kick off an SD print so the 3-second grace deadline is armed.
fn start_sd_print(harness: &mut Harness) {
    harness.push(ReplyPayload::SdStatus(0));
    push_temps(harness);
    let (text, status) = harness.line("M24");
    assert!(status.is_ok());
    assert!(!text.contains("ok"));
    assert!(harness.session().wait.contains(WaitReason::Start));
    assert!(harness.session().sd_start_deadline().is_some());
}

#[test]
fn m24_with_a_missing_file_reports_not_found() {
    common::init_tracing();
    let mut harness = Harness::new();
    harness.push(ReplyPayload::SdStatus(7));

    let (text, _) = harness.line("M24");
    assert!(text.contains("Error: Not SD printing file not found"));
    assert!(!harness.session().wait.contains(WaitReason::Start));
}

#[test]
fn status_reports_are_suppressed_inside_the_grace_period() {
    let mut harness = Harness::new();
    start_sd_print(&mut harness);

    // the bot still says NONE right after launch; too early to report
    harness.push(stats(BuildState::None, 0));
    push_temps(&harness);
    let (text, _) = harness.line("M27");
    assert!(!text.contains("Not SD printing"));
    assert!(harness.session().wait.contains(WaitReason::Start));

    // after the grace period the truth comes out
    harness.advance(4);
    harness.push(stats(BuildState::None, 0));
    let (text, _) = harness.line("M27");
    assert!(text.contains("Not SD printing"));
    assert!(!text.contains("ok"));
}

#[test]
fn running_clears_the_grace_deadline_and_reports_progress() {
    let mut harness = Harness::new();
    start_sd_print(&mut harness);

    harness.push(stats(BuildState::Running, 42));
    let (text, _) = harness.line("M27");
    assert!(text.contains("SD printing byte on line 42/0"));
    assert!(text.ends_with("ok"));
    assert!(!harness.session().wait.contains(WaitReason::Start));
    assert!(harness.session().sd_start_deadline().is_none());
}

#[test]
fn a_clock_jump_stops_the_gating_and_reports() {
    let mut harness = Harness::new();
    start_sd_print(&mut harness);

    // wall clock stepped backwards; the deadline is suddenly far away
    harness.rewind(10);
    harness.push(stats(BuildState::None, 0));
    let (text, _) = harness.line("M27");
    assert!(text.contains("Not SD printing"));
    assert!(harness.session().sd_start_deadline().is_none());
    assert!(!harness.session().wait.contains(WaitReason::Start));
    assert!(text.trim_end().ends_with("ok"));
}

#[test]
fn m27_reports_by_build_state() {
    let mut harness = Harness::new();

    harness.push(stats(BuildState::Running, 1000));
    let (text, _) = harness.line("M27");
    assert!(text.contains("SD printing byte on line 1000/0"));

    harness.push(stats(BuildState::Paused, 77));
    let (text, _) = harness.line("M27");
    assert!(text.contains("SD printing paused at line 77"));

    harness.push(stats(BuildState::Cancelling, 78));
    let (text, _) = harness.line("M27");
    assert!(text.contains("SD printing sleeping at line 78"));

    harness.push(stats(BuildState::FinishedNormally, 0));
    let (text, _) = harness.line("M27");
    assert!(text.contains("Done printing file"));

    harness.push(stats(BuildState::None, 0));
    let (text, _) = harness.line("M27");
    assert!(text.contains("Not SD printing"));
}

#[test]
fn a_cancelled_build_reports_both_terminal_lines() {
    let mut harness = Harness::new();
    harness.session_mut().flags.get_pos_when_ready = true;

    harness.push(stats(BuildState::Canceled, 0));
    let (text, _) = harness.line("M27");
    let cancelled = text.find("SD printing cancelled.").unwrap();
    let done = text.find("Done printing file").unwrap();
    assert!(cancelled < done);
    assert!(!harness.session().flags.get_pos_when_ready);
    assert!(!harness.session().is_waiting());
}

#[test]
fn pause_raises_the_unpause_wait_and_echoes_once() {
    let mut harness = Harness::new();

    harness.push(stats(BuildState::Paused, 12));
    let (text, _) = harness.line("@poll_build");
    assert_eq!(
        text.matches("// echo: Waiting for unpause button on the LCD panel")
            .count(),
        1
    );
    assert!(harness.session().wait.contains(WaitReason::Unpause));

    // still paused: no repeat echo, just the implicit temperature poll
    harness.push(stats(BuildState::Paused, 12));
    push_temps(&harness);
    let (text, _) = harness.line("@poll_build");
    assert!(!text.contains("// echo:"));
    assert!(harness.session().wait.contains(WaitReason::Unpause));
}

#[test]
fn unpausing_drains_the_queue_before_acknowledging() {
    let mut harness = Harness::new();

    harness.push(stats(BuildState::Paused, 12));
    let _ = harness.line("@poll_build");

    // the button was pressed; the build runs again
    harness.push(stats(BuildState::Running, 13));
    push_temps(&harness);
    harness.push(ReplyPayload::Ready(true));
    let (text, _) = harness.line("@poll_build");
    assert!(!harness.session().wait.contains(WaitReason::Unpause));
    assert!(!harness.session().wait.contains(WaitReason::EmptyQueue));
    assert!(text.ends_with("ok"));
}

#[test]
fn other_states_clear_the_unpause_wait() {
    let mut harness = Harness::new();
    harness.session_mut().wait.set(WaitReason::Unpause);

    harness.push(stats(BuildState::FinishedNormally, 0));
    let (text, _) = harness.line("@poll_build");
    assert!(!harness.session().wait.contains(WaitReason::Unpause));
    assert!(text.trim().ends_with("ok"));
}

#[test]
fn build_stats_confirm_a_finished_abort() {
    let mut harness = Harness::new();

    // abort, then the implicit temperature poll
    harness.push(ReplyPayload::Ack);
    push_temps(&harness);
    let _ = harness.line("M112");
    assert!(harness.session().wait.contains(WaitReason::BotCancel));

    // a routine status check shows the build is gone; the wait lifts
    harness.push(stats(BuildState::None, 0));
    let (text, _) = harness.line("@poll_build");
    assert!(!harness.session().wait.contains(WaitReason::BotCancel));
    assert!(text.trim().ends_with("ok"));
}

#[test]
fn build_stats_keep_waiting_while_the_abort_is_in_flight() {
    let mut harness = Harness::new();

    harness.push(ReplyPayload::Ack);
    push_temps(&harness);
    let _ = harness.line("M112");

    harness.push(stats(BuildState::Cancelling, 5));
    push_temps(&harness);
    let (_, status) = harness.line("@poll_build");
    assert!(status.is_ok());
    assert!(harness.session().wait.contains(WaitReason::BotCancel));
}
