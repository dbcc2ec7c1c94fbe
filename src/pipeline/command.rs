//! External tool invocation.
//!
//! Every command runs with an explicit working directory; nothing in the
//! pipeline changes the process-wide current directory.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Result of running an external command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success { stdout: String, stderr: String },
    Failed { code: Option<i32>, stderr: String },
    TimedOut { after: Duration },
    SpawnFailed { message: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text to record for a failed command: trimmed stderr when the tool
    /// printed any, otherwise a description of how it ended.
    pub fn failure_message(&self, program: &str) -> String {
        match self {
            Self::Success { .. } => String::new(),
            Self::Failed { code, stderr } => {
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    stderr.to_string()
                } else {
                    match code {
                        Some(code) => format!("{} exited with status {}", program, code),
                        None => format!("{} was terminated by a signal", program),
                    }
                }
            }
            Self::TimedOut { after } => format!("timeout after {}s", after.as_secs()),
            Self::SpawnFailed { message } => format!("failed to run {}: {}", program, message),
        }
    }
}

/// Run `program args...` in `cwd`, capturing stdout and stderr.
///
/// With `limit` set, the child and everything it started are killed once it
/// runs longer than that. On unix the child leads its own process group so
/// the kill reaches `make -j` compilers and `git` helpers too.
pub async fn run_captured(
    program: &str,
    args: &[String],
    cwd: &Path,
    limit: Option<Duration>,
) -> CommandOutcome {
    debug!(program, ?args, cwd = %cwd.display(), "running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutcome::SpawnFailed {
                message: e.to_string(),
            };
        }
    };

    let pid = child.id();
    let wait = child.wait_with_output();
    tokio::pin!(wait);

    let output = match limit {
        Some(limit) => match timeout(limit, &mut wait).await {
            Ok(result) => result,
            // The group goes first; dropping `wait` then kills the leader.
            Err(_) => {
                kill_process_group(program, pid);
                return CommandOutcome::TimedOut { after: limit };
            }
        },
        None => wait.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            return CommandOutcome::SpawnFailed {
                message: e.to_string(),
            };
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        CommandOutcome::Success { stdout, stderr }
    } else {
        CommandOutcome::Failed {
            code: output.status.code(),
            stderr,
        }
    }
}

#[cfg(unix)]
fn kill_process_group(program: &str, pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: killpg only sends a signal. The group id is the pid of a child
    // we spawned as group leader and have not reaped yet.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            program,
            pid,
            error = %std::io::Error::last_os_error(),
            "could not signal process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_program: &str, _pid: Option<u32>) {}
