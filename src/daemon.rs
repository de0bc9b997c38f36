//! Host-facing pseudo-terminal endpoint: a pty pair created by spawning
//! `socat`, and the line loop that reads host commands from the upstream
//! end and writes translations back.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use std::fmt::Write;

use crate::dispatcher::{CommandParser, Dispatcher};
use crate::error::BridgeError;
use crate::wait::WaitReason;

/// Host lines longer than this are truncated and flagged as overflow.
pub const BUFFER_MAX: usize = 1024;

const LINK_POLL_INTERVAL: Duration = Duration::from_millis(50);
const LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// A linked pty pair; the helper process dies with this handle.
pub struct PtyPair {
    pub child: Child,
    /// Our end of the pair.
    pub upstream_path: PathBuf,
    /// The end handed to the host software.
    pub downstream_path: PathBuf,
}

impl Drop for PtyPair {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            tracing::debug!(%err, "pty helper already gone");
        }
        let _ = self.child.wait();
    }
}

/// Spawn `socat` to link two raw ptys at `daemon_port` and
/// `daemon_port + "_u"`, polling until both symlinks appear.
pub fn create_daemon_port(daemon_port: &str) -> Result<PtyPair, BridgeError> {
    let upstream = format!("{daemon_port}_u");
    let child = Command::new("socat")
        .arg("-d")
        .arg("-d")
        .arg(format!("pty,mode=777,raw,echo=0,link={upstream}"))
        .arg(format!("pty,mode=777,raw,echo=0,link={daemon_port}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let pair = PtyPair {
        child,
        upstream_path: PathBuf::from(&upstream),
        downstream_path: PathBuf::from(daemon_port),
    };
    wait_for_link(&pair.upstream_path, LINK_TIMEOUT)?;
    wait_for_link(&pair.downstream_path, LINK_TIMEOUT)?;
    tracing::info!(upstream = %upstream, downstream = daemon_port, "pty pair linked");
    Ok(pair)
}

/// Poll for a pty symlink instead of sleeping a fixed interval and hoping.
pub fn wait_for_link(path: &Path, timeout: Duration) -> Result<(), BridgeError> {
    let give_up = Instant::now() + timeout;
    while path.symlink_metadata().is_err() {
        if Instant::now() >= give_up {
            return Err(BridgeError::Logic(format!(
                "pty link {} did not appear within {:?}",
                path.display(),
                timeout
            )));
        }
        std::thread::sleep(LINK_POLL_INTERVAL);
    }
    Ok(())
}

/// Open the upstream pty for reading and writing.
pub fn open_upstream(path: &Path) -> Result<(File, File), BridgeError> {
    let reader = OpenOptions::new().read(true).open(path)?;
    let writer = OpenOptions::new().write(true).open(path)?;
    Ok((reader, writer))
}

/// Read bytes into `line` until a newline or the length limit. Returns
/// `false` once the stream is exhausted with nothing buffered.
fn read_line_bounded<R: Read>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<bool> {
    line.clear();
    let mut byte = [0u8; 1];
    while line.len() < BUFFER_MAX - 1 {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(!line.is_empty()),
            Ok(_) => {
                if byte[0] == b'\n' {
                    return Ok(true);
                }
                line.push(byte[0]);
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    // hit the limit without seeing a newline
    Ok(true)
}

/// The daemon line loop: greet the host, then translate one line at a time
/// until the upstream closes.
pub fn serve<R, W, P>(
    mut reader: R,
    mut writer: W,
    dispatcher: &mut Dispatcher<P>,
) -> Result<(), BridgeError>
where
    R: Read,
    W: IoWrite,
    P: CommandParser,
{
    writer.write_all(b"start\nok\n")?;

    let mut line = Vec::with_capacity(BUFFER_MAX);
    let mut overflow = false;
    let mut line_number: u32 = 0;

    loop {
        if !read_line_bounded(&mut reader, &mut line)? {
            tracing::info!("upstream closed");
            return Ok(());
        }
        line_number += 1;

        // swallow the remainder of an overflowed line
        if overflow {
            if line.len() != BUFFER_MAX - 1 {
                overflow = false;
            }
            continue;
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        tracing::debug!(line = %text, line_number, "read host line");

        {
            let session = dispatcher.session_mut();
            session.translation.clear();
            session.wait.clear(WaitReason::Buffer);
            session.flags.ok_pending = !session.is_waiting();
        }

        if line.len() == BUFFER_MAX - 1 {
            overflow = true;
            // run-on comments are expected to be cut short; anything else
            // deserves a warning
            if !text.contains(';') {
                let session = dispatcher.session_mut();
                let _ = writeln!(
                    session.translation,
                    "(line {line_number}) Buffer overflow: input exceeds {BUFFER_MAX} character limit, remaining characters in line will be ignored"
                );
            }
        }

        if let Err(err) = dispatcher.dispatch(&text) {
            tracing::debug!(%err, "line finished with an error status");
        }

        let session = dispatcher.session_mut();
        session.flags.ok_pending = false;
        let _ = writeln!(session.translation);
        writer.write_all(session.translation.as_str().as_bytes())?;
        writer.flush()?;
    }
}
