//! Prompt process launcher.
//!
//! Starts the `agent-inquiry-prompt` binary detached from the server:
//! first in a new terminal window (platform-appropriate), then, as the one
//! documented fallback, as a direct child process. On unix every launch
//! gets its own process group so [`terminate`] can take down the terminal
//! and everything it started.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::LaunchStrategy;
use crate::{AppError, Result};

/// A launched prompt process.
#[derive(Debug)]
pub struct LaunchedProcess {
    /// Process handle.
    pub child: Child,
    /// OS process id (also the process-group id on unix).
    pub pid: Option<u32>,
    /// Strategy that succeeded.
    pub strategy: LaunchStrategy,
}

/// Launch the prompt binary with its encoded startup payload.
///
/// # Errors
///
/// Returns `AppError::Launch` when neither the preferred strategy nor the
/// direct-spawn fallback could start a process.
pub fn launch(program: &Path, payload: &str, preferred: LaunchStrategy) -> Result<LaunchedProcess> {
    if preferred == LaunchStrategy::Terminal {
        match terminal_command(program, payload) {
            Some(mut cmd) => match spawn(&mut cmd) {
                Ok(child) => return Ok(launched(child, LaunchStrategy::Terminal)),
                Err(err) => {
                    warn!(%err, program = %program.display(), "terminal launch failed; falling back to direct spawn");
                }
            },
            None => {
                debug!("no terminal launcher available on this host; using direct spawn");
            }
        }
    }

    let mut cmd = Command::new(program);
    cmd.arg(payload);
    spawn(&mut cmd)
        .map(|child| launched(child, LaunchStrategy::Direct))
        .map_err(|err| {
            AppError::Launch(format!(
                "failed to start prompt process {}: {err}",
                program.display()
            ))
        })
}

fn launched(child: Child, strategy: LaunchStrategy) -> LaunchedProcess {
    let pid = child.id();
    info!(pid = pid.unwrap_or(0), ?strategy, "prompt process launched");
    LaunchedProcess {
        child,
        pid,
        strategy,
    }
}

fn spawn(cmd: &mut Command) -> std::io::Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

/// Build the "open a new terminal window" command for this platform.
#[cfg(target_os = "macos")]
fn terminal_command(program: &Path, payload: &str) -> Option<Command> {
    let script = format!(
        "tell application \"Terminal\"\n activate\n do script \"'{}' '{}'\"\nend tell",
        program.display(),
        payload
    );
    let mut cmd = Command::new("osascript");
    cmd.arg("-e").arg(script);
    Some(cmd)
}

/// Build the "open a new terminal window" command for this platform.
#[cfg(all(unix, not(target_os = "macos")))]
fn terminal_command(program: &Path, payload: &str) -> Option<Command> {
    let has_display =
        std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some();
    if !has_display {
        return None;
    }
    let mut cmd = Command::new("x-terminal-emulator");
    cmd.arg("-e").arg(program).arg(payload);
    Some(cmd)
}

/// Build the "open a new terminal window" command for this platform.
#[cfg(windows)]
fn terminal_command(program: &Path, payload: &str) -> Option<Command> {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", "agent-inquiry"])
        .arg(program)
        .arg(payload);
    Some(cmd)
}

/// Build the "open a new terminal window" command for this platform.
#[cfg(not(any(unix, windows)))]
fn terminal_command(_program: &Path, _payload: &str) -> Option<Command> {
    None
}

/// Exit status of a directly spawned prompt that has already failed.
///
/// Terminal launchers exit as soon as the window opens, so their status
/// says nothing about the prompt and is never reported.
pub fn exit_failure(process: &mut LaunchedProcess) -> Option<ExitStatus> {
    if process.strategy != LaunchStrategy::Direct {
        return None;
    }
    match process.child.try_wait() {
        Ok(Some(status)) if !status.success() => Some(status),
        _ => None,
    }
}

/// Forcibly terminate a prompt process and, on unix, its process group.
///
/// Best effort: failures are logged and swallowed.
pub async fn terminate(process: &mut LaunchedProcess) {
    #[cfg(unix)]
    if let Some(pid) = process.pid {
        kill_process_group(pid);
    }

    if let Err(err) = process.child.kill().await {
        debug!(%err, pid = process.pid.unwrap_or(0), "prompt process kill failed (likely already exited)");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(%err, pid, "process group kill failed (likely already exited)");
    }
}
