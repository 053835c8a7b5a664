// Error taxonomy and user-friendly messages
//
// SafetyError covers the faults the detection core knows how to recover
// from locally. Nothing here is ever shown to an end user of the host app;
// the CLI helpers below only format operator-facing messages.

use std::fmt;
use thiserror::Error;

/// Faults inside the detection and escalation core.
///
/// Each variant has a local recovery: language and region fall back to
/// their defaults, detection failures escalate, audit failures are logged.
#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("unsupported language tag '{0}'")]
    UnsupportedLanguage(String),

    #[error("unsupported region code '{0}'")]
    UnsupportedRegion(String),

    #[error("detection failed: {0}")]
    DetectionFailure(String),

    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(path: &str, error: impl fmt::Display) -> String {
    format!(
        "Failed to parse config file {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check config file syntax:\n\
           \x1b[36mcat {}\x1b[0m\n\n\
        2. Common mistakes:\n\
           • Missing quotes around strings\n\
           • Unknown surface name (use journal, chat, community)\n\
           • Region codes must be two letters",
        path, error, path
    )
}

/// Format a lexicon or resource table load error
pub fn table_load_error(kind: &str, path: &str, error: impl fmt::Display) -> String {
    format!(
        "Failed to load {} from {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mBuiltin {} will be used instead.\x1b[0m\n\
        Fix the file or remove the path from ~/.lifeline/config.toml",
        kind, path, error, kind
    )
}

/// Format a connection refused error for the CLI talking to a daemon
pub fn daemon_unreachable_error(address: &str) -> String {
    format!(
        "Could not bind or reach daemon at {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • Another process already uses the port\n\
        • Wrong bind address\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
           \x1b[36mlifeline serve --bind 127.0.0.1:8787\x1b[0m",
        address
    )
}
