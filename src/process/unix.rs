//! Unix process management with process groups
//!
//! Spawned children call `setsid()` before `exec()`, which makes each
//! child a session and process-group leader with no controlling terminal.
//! Termination signals are then delivered to the whole group via
//! `killpg`, reaching any descendants the child spawned (unless they left
//! the group themselves). SIGTERM is used for the graceful stage, SIGKILL
//! for the forceful one.

// Process group setup requires a raw libc::setsid() call in pre_exec
#![allow(unsafe_code)]

use crate::{Error, ProcessSpec, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, error};

use super::WAIT_FAILED_EXIT_CODE;

/// Spawn `spec` with its standard streams attached to the given pipe ends,
/// in a new session and process group
///
/// The three descriptors are the child-facing pipe endpoints; they are
/// consumed here and the parent's copies are closed once the spawn call
/// returns, leaving the child as their only owner.
///
/// ## Safety
///
/// `pre_exec` runs between `fork()` and `exec()`, so only
/// async-signal-safe calls are allowed there; `setsid()` is one.
pub(crate) fn spawn_in_group(
    spec: &ProcessSpec,
    stdin: OwnedFd,
    stdout: OwnedFd,
    stderr: OwnedFd,
) -> Result<Pid> {
    debug!("spawning process: {:?} {:?}", spec.program, spec.args);

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("failed to spawn {:?}: {}", spec.program, e);
        Error::ProcessSpawn(format!("{:?}: {}", spec.program, e))
    })?;

    let pid = Pid::from_raw(child.id() as i32);
    debug!("spawned process {} in new process group", pid);
    // The Child handle is dropped here; the exit status is collected with
    // waitpid so the wait never needs exclusive access to a handle.
    Ok(pid)
}

/// Block until `pid` terminates and normalize the result to one integer
///
/// - Normal exit: the process's own exit status (0..=255).
/// - Killed by a signal: the negated signal number (SIGKILL gives -9).
/// - The wait call itself failed: [`WAIT_FAILED_EXIT_CODE`].
pub(crate) fn wait_exit_code(pid: Pid) -> i32 {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, signal, _)) => return -(signal as i32),
            Ok(status) => {
                debug!("ignoring intermediate wait status for {}: {:?}", pid, status);
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                error!("waitpid({}) failed: {}", pid, e);
                return WAIT_FAILED_EXIT_CODE;
            }
        }
    }
}

/// Send SIGTERM to the process group led by `pid`
///
/// ESRCH (group already gone) and EPERM (ownership changed, which in
/// practice also means the child is gone) count as success.
pub(crate) fn signal_term_group(pid: Pid) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)
}

/// Send SIGKILL to the process group led by `pid`
pub(crate) fn signal_kill_group(pid: Pid) -> Result<()> {
    signal_group(pid, Signal::SIGKILL)
}

fn signal_group(pid: Pid, signal: Signal) -> Result<()> {
    debug!("sending {} to process group {}", signal, pid);
    match killpg(pid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) | Err(Errno::EPERM) => {
            debug!("process group {} already exited", pid);
            Ok(())
        }
        Err(e) => {
            error!("failed to send {} to process group {}: {}", signal, pid, e);
            Err(Error::Io(std::io::Error::from_raw_os_error(e as i32)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn null_in() -> OwnedFd {
        OwnedFd::from(File::open("/dev/null").unwrap())
    }

    fn null_out() -> OwnedFd {
        OwnedFd::from(File::options().write(true).open("/dev/null").unwrap())
    }

    fn spawn_quiet(spec: &ProcessSpec) -> Result<Pid> {
        spawn_in_group(spec, null_in(), null_out(), null_out())
    }

    #[test]
    fn test_spawn_and_wait_success() {
        let pid = spawn_quiet(&ProcessSpec::new("true", Vec::<String>::new())).unwrap();
        assert!(pid.as_raw() > 0);
        assert_eq!(wait_exit_code(pid), 0);
    }

    #[test]
    fn test_wait_reports_declared_exit_status() {
        let pid = spawn_quiet(&ProcessSpec::shell("exit 7")).unwrap();
        assert_eq!(wait_exit_code(pid), 7);
    }

    #[test]
    fn test_spawn_nonexistent_command() {
        let result = spawn_quiet(&ProcessSpec::new("nonexistent_command_12345", ["x"]));
        assert!(matches!(result, Err(Error::ProcessSpawn(_))));
    }

    #[test]
    fn test_killed_process_reports_negative_signal() {
        let pid = spawn_quiet(&ProcessSpec::new("sleep", ["30"])).unwrap();
        signal_kill_group(pid).unwrap();
        assert_eq!(wait_exit_code(pid), -(Signal::SIGKILL as i32));
    }

    #[test]
    fn test_term_then_wait() {
        let pid = spawn_quiet(&ProcessSpec::new("sleep", ["30"])).unwrap();
        signal_term_group(pid).unwrap();
        assert_eq!(wait_exit_code(pid), -(Signal::SIGTERM as i32));
    }

    #[test]
    fn test_signal_nonexistent_group_is_ok() {
        // ESRCH is treated as "already exited"
        assert!(signal_term_group(Pid::from_raw(999_999)).is_ok());
        assert!(signal_kill_group(Pid::from_raw(999_999)).is_ok());
    }

    #[test]
    fn test_wait_on_non_child_fails_with_sentinel() {
        assert_eq!(wait_exit_code(Pid::from_raw(999_999)), WAIT_FAILED_EXIT_CODE);
    }

    #[test]
    fn test_spawn_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::shell("touch here.txt").with_cwd(dir.path());
        let pid = spawn_quiet(&spec).unwrap();
        assert_eq!(wait_exit_code(pid), 0);
        assert!(dir.path().join("here.txt").exists());
    }
}
