use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Default settings applied when the command line leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Defaults {
    /// Target command to drive.
    #[serde(default = "default_command")]
    pub command: String,
    /// Per-attempt timeout in seconds. Absent means no ceiling.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
    /// TERM value advertised to children that have none.
    #[serde(default = "default_term")]
    pub term: String,
    /// Arguments appended to every attempt, before the payload.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout_secs(),
            term: default_term(),
            extra_args: Vec::new(),
        }
    }
}

fn default_command() -> String {
    "codex".to_string()
}

fn default_timeout_secs() -> Option<u64> {
    Some(180)
}

fn default_term() -> String {
    crate::invoke::request::DEFAULT_TERM.to_string()
}
