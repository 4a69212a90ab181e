//! ttycoax drives terminal-insisting CLIs from places that have no terminal.
//!
//! Agent CLIs such as `codex` or `claude` probe for a TTY on startup and
//! refuse to run from cron jobs, CI steps, or other headless callers. This
//! crate invokes them anyway: it tries plain pipes first and, when the
//! failure looks terminal-related, retries under a pseudo-terminal that
//! captures output and answers the child's terminal queries synthetically.
//!
//! The entry point is [`invoke`] with an [`InvocationRequest`]; the PTY relay
//! is also usable on its own through [`pty::PtySession`].

use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod invoke;
pub mod pty;

pub use config::{Config, ConfigError};
pub use error::InvokeError;
pub use invoke::{invoke, InvocationRequest, InvokeOutput};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}
