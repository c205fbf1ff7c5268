//! Child-process lifecycle management with asynchronous output streaming
//!
//! `subproc` spawns an external program, pumps its stdout and stderr to
//! caller-supplied sinks from dedicated background threads, lets callers
//! write to its stdin, and provides deterministic [`Subprocess::join`] and
//! [`Subprocess::kill`] operations, all from a single movable handle that
//! is safe to share across threads.
//!
//! ## Lifecycle
//!
//! A [`Subprocess`] owns at most one process at a time. `start()` wires up
//! the pipes, spawns the child in its own process group, and launches one
//! pump thread per output stream; `join()` blocks until the child exits
//! and guarantees both sinks have fully quiesced before it returns;
//! `kill()` escalates SIGTERM to SIGKILL across the whole process group
//! and tears down the same way. After join or kill the façade is idle and
//! can be started again.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use subproc::{ProcessSpec, Subprocess};
//!
//! let stdout = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let stdout = stdout.clone();
//!     Box::new(move |chunk: &[u8]| stdout.lock().unwrap().extend_from_slice(chunk))
//! };
//!
//! let process = Subprocess::new();
//! process.start(&ProcessSpec::shell("echo hello"), sink, Box::new(|_: &[u8]| {}))?;
//! assert_eq!(process.join(), 0);
//! assert_eq!(stdout.lock().unwrap().as_slice(), b"hello\n");
//! # Ok::<(), subproc::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! - Chunks of one stream arrive at its sink in read order; no ordering
//!   holds between the stdout and stderr sinks.
//! - Teardown joins both pump workers: once `join()`/`kill()` returns, no
//!   sink invocation is in flight and none will follow.
//! - Sinks run on pump threads, never the caller's; they must be `Send`
//!   and synchronize any state they share with the caller themselves.

#![deny(unsafe_code)]

pub mod error;
#[cfg(unix)]
mod pipe;
#[cfg(unix)]
mod process;
#[cfg(unix)]
mod pump;
pub mod spec;
#[cfg(unix)]
mod subprocess;

pub use error::{Error, Result};
pub use spec::{ProcessSpec, DEFAULT_CHUNK_SIZE};

#[cfg(unix)]
pub use process::WAIT_FAILED_EXIT_CODE;
#[cfg(unix)]
pub use pump::OutputSink;
#[cfg(unix)]
pub use subprocess::Subprocess;
