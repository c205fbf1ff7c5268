//! Native process plumbing
//!
//! Platform-specific spawn, wait and termination glue lives in per-target
//! submodules; everything above this module speaks only in terms of
//! [`ProcessHandle`] and normalized exit codes.
//!
//! ## Platform support
//!
//! - **Unix**: full support. Children are made session/process-group
//!   leaders so termination reaches their descendants.
//! - **Windows**: not yet wired up. The intended shape is a
//!   `TerminateProcess`-based backend that enumerates live children via a
//!   `CreateToolhelp32Snapshot` point-in-time snapshot, selected here at
//!   build time like the Unix backend.

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
use nix::unistd::Pid;

use crate::pump::{ShutdownSignal, StreamPump};
use tracing::debug;

/// Sentinel exit code meaning the native wait itself failed
///
/// Deliberately out of band: real exit statuses are 0..=255 and
/// signal-terminated children are reported as small negative values.
pub const WAIT_FAILED_EXIT_CODE: i32 = i32::MIN;

/// Owner of one running child process and its two stream pumps
///
/// Created inside `start()` after a successful spawn and destroyed only
/// during join/kill teardown. Destruction raises the shutdown signal and
/// then joins both pump workers, so when it returns no sink invocation is
/// in flight and none can follow.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Pid,
    shutdown: ShutdownSignal,
    stdout_pump: StreamPump,
    stderr_pump: StreamPump,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: Pid,
        shutdown: ShutdownSignal,
        stdout_pump: StreamPump,
        stderr_pump: StreamPump,
    ) -> Self {
        Self {
            pid,
            shutdown,
            stdout_pump,
            stderr_pump,
        }
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        debug!("tearing down process handle for {}", self.pid);
        self.shutdown.raise();
        // stdout_pump / stderr_pump drop right after this body and block
        // until their worker threads have observed the signal (or EOF).
    }
}
