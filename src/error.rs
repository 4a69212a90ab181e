//! Error types for the invocation engine.
//!
//! `CommandNotFound` is fatal before any attempt is made; everything else is
//! recovered locally by the planner and folded into the aggregate `Exhausted`
//! failure when every attempt strategy has been tried.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while invoking the target command.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Target executable could not be resolved on PATH.
    #[error("command not found on PATH: {command}")]
    CommandNotFound { command: String },

    /// Child ran past the per-attempt deadline and was killed.
    #[error("timeout after {}s running: {command}", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Child ran and reported failure.
    #[error("nonzero exit {code}: {command}\n{detail}")]
    NonZeroExit {
        command: String,
        code: i32,
        /// Stderr text (direct channel) or collected output (PTY channel).
        detail: String,
    },

    /// Pseudo-terminal fallback is unavailable on this platform.
    #[error("PTY fallback is not supported on this platform")]
    PtyUnsupported,

    /// PTY allocation or spawn inside the bridge failed.
    #[error("PTY spawn failed: {message}")]
    PtySpawnFailure { message: String },

    /// Plumbing failure while driving the child.
    #[error("I/O error running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt strategy failed; `log` joins each attempt's diagnostic
    /// in the order it was tried.
    #[error("invocation failed:\n{log}")]
    Exhausted { log: String },
}

impl InvokeError {
    /// Short tag used in attempt logs and tracing events.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::CommandNotFound { .. } => "command_not_found",
            InvokeError::Timeout { .. } => "timeout",
            InvokeError::NonZeroExit { .. } => "nonzero_exit",
            InvokeError::PtyUnsupported => "pty_unsupported",
            InvokeError::PtySpawnFailure { .. } => "pty_spawn_failure",
            InvokeError::Io { .. } => "io",
            InvokeError::Exhausted { .. } => "exhausted",
        }
    }
}
