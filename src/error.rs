//! Error types for subprocess management

use thiserror::Error;

/// Errors reported by subprocess operations
///
/// All variants describe recoverable environmental failures. Contract
/// violations (joining a façade that is not joinable, dropping one that
/// still owns a process) are programmer errors and panic instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A process is already owned by this façade; join or kill it first
    #[error("a process is already running on this handle")]
    AlreadyRunning,

    /// Creating one of the stdin/stdout/stderr/shutdown pipes failed
    #[error("failed to create pipe: {0}")]
    PipeCreate(String),

    /// The native process could not be created
    #[error("failed to spawn process: {0}")]
    ProcessSpawn(String),

    /// A stream pump worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// A quoted region in a command line was never closed
    #[error("unterminated quote in command line")]
    UnterminatedQuote,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::PipeCreate("out of file descriptors".to_string());
        assert_eq!(
            error.to_string(),
            "failed to create pipe: out of file descriptors"
        );
        assert_eq!(
            Error::UnterminatedQuote.to_string(),
            "unterminated quote in command line"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
