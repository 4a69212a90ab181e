//! Pseudo-terminal relay: allocation, capture, and query interception.

pub mod bridge;
pub mod query;

pub use bridge::{pty_supported, PtySession, RelayExit, RelayOutcome};
