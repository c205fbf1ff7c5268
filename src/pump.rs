//! Asynchronous output stream pumps and their shutdown handshake
//!
//! Each child process owns two [`StreamPump`]s, one per output stream. A
//! pump runs a dedicated OS thread that multiplexes over the stream's read
//! endpoint and a shutdown descriptor with `poll(2)`, so teardown can wake
//! a reader that is blocked waiting for data without polling loops or
//! thread interruption.
//!
//! ## Shutdown protocol
//!
//! - [`ShutdownSignal::raise`] writes one byte to the signal pipe; every
//!   subscribed pump observes readiness on its clone of the read end.
//! - A signalled pump drains data already buffered in its pipe, then
//!   stops the first time the stream is idle. Output a child wrote just
//!   before exiting is therefore never lost to a teardown race, while a
//!   descendant that merely keeps the pipe open (without writing) cannot
//!   keep the pump alive.
//! - A pump also stops on its own when the stream reports end-of-file or
//!   an error, which is how a normally-exiting child ends its pumps.
//! - Dropping a pump joins the worker thread, so once teardown completes
//!   no sink invocation is in flight or can happen later.

use crate::{Error, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::thread;
use tracing::{debug, warn};

/// Callback receiving output chunks from a child's stdout or stderr
///
/// Invoked from the pump's worker thread, zero or more times, always with
/// a non-empty chunk. Chunks of one stream arrive in read order; no
/// ordering holds between the stdout and stderr sinks.
pub type OutputSink = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Wakes blocked pump workers during teardown
///
/// One signal object exists per process handle; each pump holds a clone of
/// the read end and the handle keeps the write end.
#[derive(Debug)]
pub(crate) struct ShutdownSignal {
    tx: File,
    rx: OwnedFd,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Result<Self> {
        let (rx, tx) = crate::pipe::create_pipe()?;
        Ok(Self {
            tx: File::from(tx),
            rx,
        })
    }

    /// Obtain a descriptor a pump can include in its readiness wait
    pub(crate) fn subscribe(&self) -> Result<OwnedFd> {
        self.rx
            .try_clone()
            .map_err(|e| Error::PipeCreate(e.to_string()))
    }

    /// Wake every subscribed pump
    ///
    /// The byte is never consumed, so the signal stays readable and late
    /// pollers observe it too.
    pub(crate) fn raise(&self) {
        if let Err(e) = (&self.tx).write(b".") {
            warn!("failed to raise shutdown signal: {}", e);
        }
    }
}

/// Background reader forwarding one output stream to a sink
///
/// Dropping the pump joins its worker thread; raise the owning
/// [`ShutdownSignal`] first if the stream may still be open.
#[derive(Debug)]
pub(crate) struct StreamPump {
    worker: Option<thread::JoinHandle<()>>,
}

impl StreamPump {
    /// Start a pump over `read_end`, delivering chunks of at most
    /// `chunk_size` bytes to `sink` until EOF, a read error, or a shutdown
    /// signal on `shutdown_rx`.
    pub(crate) fn spawn(
        name: &str,
        read_end: OwnedFd,
        shutdown_rx: OwnedFd,
        chunk_size: usize,
        sink: OutputSink,
    ) -> Result<Self> {
        assert!(chunk_size > 0, "chunk_size must be > 0");

        let worker = thread::Builder::new()
            .name(format!("subproc-{name}"))
            .spawn(move || pump_loop(read_end, shutdown_rx, chunk_size, sink))
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            worker: Some(worker),
        })
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("stream pump worker panicked");
            }
        }
    }
}

fn pump_loop(read_end: OwnedFd, shutdown_rx: OwnedFd, chunk_size: usize, mut sink: OutputSink) {
    let mut stream = File::from(read_end);
    let mut buffer = vec![0u8; chunk_size];

    loop {
        let (data_ready, stop) = {
            let mut fds = [
                PollFd::new(stream.as_fd(), PollFlags::POLLIN),
                PollFd::new(shutdown_rx.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("poll failed in stream pump: {}", e);
                    break;
                }
            }
            (
                fds[0].revents().is_some_and(|r| !r.is_empty()),
                fds[1].revents().is_some_and(|r| !r.is_empty()),
            )
        };

        // Pending data wins over the stop request: output buffered in the
        // pipe at shutdown time is still delivered. The pump stops once
        // the stream is idle, reaches end-of-file, or errors.
        if data_ready {
            match stream.read(&mut buffer) {
                Ok(0) => {
                    debug!("stream pump reached end of stream");
                    break;
                }
                Ok(n) => {
                    sink(&buffer[..n]);
                    continue;
                }
                Err(e) => {
                    debug!("stream pump read failed: {}", e);
                    break;
                }
            }
        }

        if stop {
            debug!("stream pump stopping on shutdown signal");
            break;
        }
    }
}
