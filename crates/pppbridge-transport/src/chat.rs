//! Run a chatscript against the modem to bring the line up.
//!
//! The `chat(8)` program talks to the modem over stdin/stdout, so we hand it
//! duplicates of the serial fd and wait for it to exit. `chat` expects
//! blocking I/O; the port is flipped to blocking for the duration and back
//! to non-blocking afterwards regardless of the outcome.

use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{Result, TransportError};
use crate::serial::SerialPort;

pub const CHAT_PROGRAM: &str = "/usr/sbin/chat";

/// Run `chat -v -f <script>` with the port as its terminal.
pub fn run(port: &SerialPort, script: &Path) -> Result<()> {
    run_with_program(port, CHAT_PROGRAM, &["-v", "-f"], script)
}

fn run_with_program(
    port: &SerialPort,
    program: &str,
    args: &[&str],
    script: &Path,
) -> Result<()> {
    port.set_blocking(true)?;
    let outcome = spawn_and_wait(port, program, args, script);
    port.set_blocking(false)?;
    outcome
}

fn spawn_and_wait(port: &SerialPort, program: &str, args: &[&str], script: &Path) -> Result<()> {
    info!(script = %script.display(), "running chatscript");
    let status = Command::new(program)
        .args(args)
        .arg(script)
        .stdin(dup_stdio(port)?)
        .stdout(dup_stdio(port)?)
        .status()
        .map_err(|source| TransportError::ChatSpawn {
            program: program.to_string(),
            source,
        })?;
    if !status.success() {
        return Err(TransportError::ChatFailed { status });
    }
    info!("chatscript completed");
    Ok(())
}

/// Duplicate the port fd so the child can own (and close) its copy.
fn dup_stdio(port: &SerialPort) -> Result<Stdio> {
    let fd = unsafe { libc::dup(port.as_raw_fd()) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(unsafe { Stdio::from_raw_fd(fd) })
}
