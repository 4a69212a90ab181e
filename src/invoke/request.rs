//! Invocation request and attempt descriptors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default terminal type advertised to children when the caller's environment
/// carries none. Some CLIs refuse to start with an empty TERM even inside a
/// pseudo-terminal.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// How the payload is delivered to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Payload appended to the argument vector as a positional argument.
    Arg,
    /// Payload written once to the child's input channel, newline-terminated.
    Stdin,
}

/// Which I/O channel the attempt runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Plain pipes.
    Direct,
    /// Pseudo-terminal relay.
    Pty,
}

/// One concrete trial: a payload mode crossed with a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub mode: PayloadMode,
    pub channel: Channel,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            PayloadMode::Arg => "arg",
            PayloadMode::Stdin => "stdin",
        };
        let channel = match self.channel {
            Channel::Direct => "direct",
            Channel::Pty => "pty",
        };
        write!(f, "{mode}-{channel}")
    }
}

/// A single request to run the target command with a payload.
///
/// Immutable once constructed; extra arguments are carried here and appended
/// to every attempt's argument vector identically.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    command: String,
    args: Vec<String>,
    payload: Option<String>,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl InvocationRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            payload: None,
            timeout: None,
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Extra arguments appended to every attempt.
    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// The prompt text delivered to the child (argv or stdin, per mode).
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Wall-clock ceiling for each individual attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Environment overrides for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Working directory for the child.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout_budget(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    /// Argument vector for the given payload mode, command included.
    pub fn argv(&self, mode: PayloadMode) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        if mode == PayloadMode::Arg {
            if let Some(payload) = &self.payload {
                argv.push(payload.clone());
            }
        }
        argv
    }

    /// Payload bytes to write to the input channel in `Stdin` mode,
    /// newline-terminated. `None` in `Arg` mode or when no payload was given.
    pub fn stdin_bytes(&self, mode: PayloadMode) -> Option<Vec<u8>> {
        if mode != PayloadMode::Stdin {
            return None;
        }
        let payload = self.payload.as_ref()?;
        let mut bytes = payload.clone().into_bytes();
        if !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }
        Some(bytes)
    }

    /// Environment block for the child: caller overrides, with TERM defaulted
    /// when neither the overrides nor the process environment carry one.
    pub fn env_block(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        let has_term =
            env.iter().any(|(k, _)| k == "TERM") || std::env::var_os("TERM").is_some();
        if !has_term {
            env.push(("TERM".to_string(), DEFAULT_TERM.to_string()));
        }
        env
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutput {
    /// All bytes the child wrote, captured through whichever channel won.
    Captured(Vec<u8>),
    /// The child streamed straight to the parent's own terminal; there is
    /// nothing to relay.
    Streamed,
}
