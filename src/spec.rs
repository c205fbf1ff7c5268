//! Process creation specifications and command-line builders
//!
//! A [`ProcessSpec`] describes everything needed to start a child process:
//! the executable, its argument vector, an optional working directory and
//! the chunk size used when draining its output pipes. Specs are plain
//! data; they borrow nothing and can be reused across multiple starts.
//!
//! The builder constructors ([`ProcessSpec::shell`], [`ProcessSpec::cmd`],
//! [`ProcessSpec::powershell`]) turn a single command-line string into a
//! spec targeting one of three interpreter conventions. They are pure
//! string transforms and compile on every platform.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default read size for stdout/stderr pipe drains, in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 131072;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Specification for creating a child process
///
/// `args` holds the arguments *after* the program name: argv[0] is supplied
/// by the operating system from `program`, matching `std::process::Command`
/// convention. This is an explicit contract of the crate, not a
/// platform-inferred default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Working directory for the child; `None` inherits the caller's
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Path or name of the executable
    pub program: PathBuf,
    /// Argument vector, excluding argv[0]
    #[serde(default)]
    pub args: Vec<String>,
    /// Maximum bytes handed to an output sink per invocation; must be > 0
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl ProcessSpec {
    /// Create a spec that runs `program` with the given arguments
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cwd: None,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Build a spec that runs `cmdline` through the POSIX shell
    ///
    /// The command line is passed verbatim as a single `-c` argument;
    /// quoting and word splitting are left to the shell itself.
    pub fn shell(cmdline: impl Into<String>) -> Self {
        Self::new("/bin/sh", ["-c".to_string(), cmdline.into()])
    }

    /// Build a spec that runs `cmdline` through the Windows command
    /// interpreter (`cmd /C`)
    ///
    /// Unlike [`shell`](Self::shell), `cmd` receives a pre-tokenized
    /// argument vector: double quotes toggle literal-space regions, `^`
    /// passes the next character through unchanged, and empty arguments
    /// are elided. Fails with [`Error::UnterminatedQuote`] if a quoted
    /// region is left open.
    pub fn cmd(cmdline: &str) -> Result<Self> {
        let mut args = vec!["/C".to_string()];
        args.extend(tokenize(cmdline)?);
        Ok(Self::new("cmd", args))
    }

    /// Build a spec that runs `cmdline` through PowerShell (`-Command`)
    pub fn powershell(cmdline: impl Into<String>) -> Self {
        Self::new("powershell", ["-Command".to_string(), cmdline.into()])
    }

    /// Set the working directory for the child process
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Override the output chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Split a command line into arguments
///
/// A `"` toggles quoted mode, in which spaces are literal; `^` escapes the
/// next character; unquoted runs of spaces separate arguments and empty
/// arguments are dropped. Neither quote nor escape characters appear in
/// the output.
fn tokenize(cmdline: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut arg = String::new();
    let mut in_quote = false;
    let mut escape = false;

    for ch in cmdline.chars() {
        if escape {
            arg.push(ch);
            escape = false;
        } else if ch == '^' {
            escape = true;
        } else if ch == '"' {
            in_quote = !in_quote;
        } else if ch == ' ' && !in_quote {
            if !arg.is_empty() {
                args.push(std::mem::take(&mut arg));
            }
        } else {
            arg.push(ch);
        }
    }

    if !arg.is_empty() {
        args.push(arg);
    }

    if in_quote {
        return Err(Error::UnterminatedQuote);
    }

    Ok(args)
}
