//! The `Subprocess` façade: single-owner process lifecycle handle

use crate::pipe::{create_pipe, StdinPipe};
use crate::process::{unix, ProcessHandle};
use crate::pump::{OutputSink, ShutdownSignal, StreamPump};
use crate::{Error, ProcessSpec, Result};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Grace window between the cooperative SIGTERM and the forceful SIGKILL
/// stages of [`Subprocess::kill`]
const KILL_GRACE: Duration = Duration::from_millis(50);

/// The single-ownership slot guarded by the façade's lock
///
/// The handle and the stdin pipe are installed and removed together, under
/// one lock acquisition; owning a handle is what "joinable" means.
#[derive(Debug, Default)]
struct Slot {
    handle: Option<ProcessHandle>,
    stdin: Option<StdinPipe>,
}

/// A movable, thread-safe handle owning at most one child process
///
/// All operations take `&self` and may be called from any thread; the
/// internal lock is held only for slot reads and swaps, never across the
/// blocking wait inside [`join`](Self::join), so `joinable()`,
/// `stdin_write()` and `kill()` stay responsive while another thread
/// joins. The type is deliberately not `Clone`: a process handle cannot be
/// duplicated, only moved.
///
/// The owner must `join()` or `kill()` a running process before dropping
/// the façade; dropping while joinable is a programming error.
///
/// ```no_run
/// use subproc::{ProcessSpec, Subprocess};
///
/// let process = Subprocess::new();
/// process.start(
///     &ProcessSpec::shell("echo hello"),
///     Box::new(|chunk: &[u8]| print!("{}", String::from_utf8_lossy(chunk))),
///     Box::new(|_: &[u8]| {}),
/// )?;
/// assert_eq!(process.join(), 0);
/// # Ok::<(), subproc::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Subprocess {
    slot: Mutex<Slot>,
}

impl Subprocess {
    /// Create a façade that owns no process
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the process described by `spec` and start pumping its output
    ///
    /// On success two background workers begin invoking the sinks
    /// concurrently with the caller, and the new handle is installed
    /// atomically. On failure nothing is installed and the façade stays
    /// reusable; pipes and pumps are created before the native spawn, so a
    /// failed spawn unwinds without ever having created a child.
    pub fn start(
        &self,
        spec: &ProcessSpec,
        stdout_sink: OutputSink,
        stderr_sink: OutputSink,
    ) -> Result<()> {
        if self.slot().handle.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let (stdin_rd, stdin_wr) = create_pipe()?;
        let (stdout_rd, stdout_wr) = create_pipe()?;
        let (stderr_rd, stderr_wr) = create_pipe()?;

        let shutdown = ShutdownSignal::new()?;
        let stdout_wake = shutdown.subscribe()?;
        let stderr_wake = shutdown.subscribe()?;

        let stdout_pump =
            StreamPump::spawn("stdout", stdout_rd, stdout_wake, spec.chunk_size, stdout_sink)?;
        let stderr_pump =
            match StreamPump::spawn("stderr", stderr_rd, stderr_wake, spec.chunk_size, stderr_sink)
            {
                Ok(pump) => pump,
                Err(e) => {
                    // Wake the already-running stdout worker before its
                    // pump drop joins it.
                    shutdown.raise();
                    drop(stdout_pump);
                    return Err(e);
                }
            };

        let pid = match unix::spawn_in_group(spec, stdin_rd, stdout_wr, stderr_wr) {
            Ok(pid) => pid,
            Err(e) => {
                shutdown.raise();
                drop(stdout_pump);
                drop(stderr_pump);
                return Err(e);
            }
        };

        let handle = ProcessHandle::new(pid, shutdown, stdout_pump, stderr_pump);

        let mut slot = self.slot();
        assert!(
            slot.handle.is_none(),
            "start() raced another start() on the same handle"
        );
        slot.handle = Some(handle);
        slot.stdin = Some(StdinPipe::new(stdin_wr));
        debug!("started process {}", pid);
        Ok(())
    }

    /// Whether a process is currently owned and awaiting join/kill
    ///
    /// Non-blocking snapshot; the answer can be stale by the time the
    /// caller acts on it unless callers are externally serialized.
    pub fn joinable(&self) -> bool {
        self.slot().handle.is_some()
    }

    /// Block until the owned process terminates, then tear down and return
    /// its exit code
    ///
    /// Exit code contract: a normal exit yields the process's own status
    /// (0..=255); termination by a signal yields the negated signal number
    /// (SIGKILL gives -9); a failure of the wait call itself yields
    /// [`WAIT_FAILED_EXIT_CODE`](crate::WAIT_FAILED_EXIT_CODE).
    ///
    /// Teardown joins both pump workers, so when this returns no sink
    /// invocation is in flight and none will follow.
    ///
    /// # Panics
    ///
    /// Panics if the façade is not [`joinable`](Self::joinable); calling
    /// join without a running process is a usage bug, not a runtime
    /// condition.
    pub fn join(&self) -> i32 {
        let pid = self
            .slot()
            .handle
            .as_ref()
            .map(|handle| handle.pid())
            .expect("join() called while not joinable");

        // The lock is NOT held across the wait.
        let code = unix::wait_exit_code(pid);
        debug!("process {} exited with code {}", pid, code);

        let (handle, stdin) = {
            let mut slot = self.slot();
            // A racing kill() may have already torn this process down (and
            // a later start() may even have installed a new one).
            if slot.handle.as_ref().is_some_and(|h| h.pid() == pid) {
                (slot.handle.take(), slot.stdin.take())
            } else {
                (None, None)
            }
        };
        drop(stdin);
        drop(handle); // raises the shutdown signal, joins both pumps

        code
    }

    /// Forcefully terminate the owned process and its process group
    ///
    /// No-op when not joinable. Otherwise sends SIGTERM to the child's
    /// process group, waits a short fixed grace window, then SIGKILLs the
    /// group and performs the same teardown as [`join`](Self::join);
    /// `joinable()` is false once this returns.
    ///
    /// `kill` does not report or reap the exit status itself: a `join`
    /// already blocked on the process observes the signaled status.
    pub fn kill(&self) {
        let pid = match self.slot().handle.as_ref().map(|handle| handle.pid()) {
            Some(pid) => pid,
            None => return,
        };

        if let Err(e) = unix::signal_term_group(pid) {
            warn!("graceful termination of {} failed: {}", pid, e);
        }

        std::thread::sleep(KILL_GRACE);

        let (handle, stdin) = {
            let mut slot = self.slot();
            match slot.handle.as_ref() {
                Some(h) if h.pid() == pid => {
                    if let Err(e) = unix::signal_kill_group(pid) {
                        warn!("forceful termination of {} failed: {}", pid, e);
                    }
                    (slot.handle.take(), slot.stdin.take())
                }
                // A racing join() finished the teardown during the grace
                // window; nothing left to do.
                _ => return,
            }
        };
        drop(stdin);
        drop(handle);
        debug!("killed process {}", pid);
    }

    /// Write bytes to the child's stdin
    ///
    /// Returns false on an empty input, when no stdin pipe is owned
    /// (including after [`stdin_close`](Self::stdin_close)), or when the
    /// underlying write fails or writes nothing (e.g. the child exited).
    pub fn stdin_write(&self, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        match &self.slot().stdin {
            Some(pipe) => pipe.write(data),
            None => false,
        }
    }

    /// Close the child's stdin pipe
    ///
    /// Idempotent; the child observes end-of-file and subsequent
    /// [`stdin_write`](Self::stdin_write) calls return false. The pipe is
    /// never recreated for the same process.
    pub fn stdin_close(&self) {
        self.slot().stdin.take();
    }

    /// Exchange the owned process (if any) with `other`'s
    ///
    /// Both slots move under both locks, acquired in a fixed address order
    /// so two concurrent swaps cannot deadlock.
    pub fn swap(&self, other: &Subprocess) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (first, second) = if (self as *const Self as usize) < (other as *const Self as usize) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = first.slot();
        let mut b = second.slot();
        std::mem::swap(&mut *a, &mut *b);
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        if let Ok(slot) = self.slot.get_mut() {
            debug_assert!(
                slot.handle.is_none(),
                "subprocess dropped while joinable; call join() or kill() first"
            );
        }
    }
}
