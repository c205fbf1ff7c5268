//! Pipe creation and the stdin write endpoint

use crate::{Error, Result};
use nix::fcntl::OFlag;
use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;
use tracing::debug;

/// Create one unidirectional byte pipe, returning `(read, write)` ends
///
/// Both ends carry `O_CLOEXEC`; the spawn path re-wires the child-facing
/// end onto the child's standard descriptors explicitly, so nothing leaks
/// into unrelated children.
pub(crate) fn create_pipe() -> Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| Error::PipeCreate(e.to_string()))
}

/// Owner of the write end of a child's stdin pipe
///
/// Dropping the pipe closes the descriptor, which the child observes as
/// end-of-file on its stdin. The façade destroys it on `stdin_close()` or
/// as part of join/kill teardown, whichever comes first; it is never
/// recreated for the same process.
#[derive(Debug)]
pub(crate) struct StdinPipe {
    file: File,
}

impl StdinPipe {
    pub(crate) fn new(write_end: OwnedFd) -> Self {
        Self {
            file: File::from(write_end),
        }
    }

    /// Write `data` to the child's stdin
    ///
    /// Returns false if the underlying write fails or writes zero bytes,
    /// e.g. because the child exited or closed its stdin.
    pub(crate) fn write(&self, data: &[u8]) -> bool {
        debug_assert!(!data.is_empty());
        match (&self.file).write(data) {
            Ok(n) => n > 0,
            Err(e) => {
                debug!("stdin write failed: {}", e);
                false
            }
        }
    }
}
