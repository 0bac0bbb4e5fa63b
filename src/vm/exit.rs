//! Hypervisor exit reasons.

use serde::{Deserialize, Serialize};
use std::process::ExitStatus;

/// Why the hypervisor process ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitReason {
    /// Exited on its own with a code.
    Exited {
        /// Exit code from the process.
        code: i32,
    },

    /// Killed by signal.
    Signaled {
        /// Signal number.
        signal: i32,
    },
}

impl ExitReason {
    /// Check if this represents a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitReason::Exited { code: 0 })
    }

    /// Create an exited reason with the given code.
    pub fn exited(code: i32) -> Self {
        Self::Exited { code }
    }

    /// Create a signaled reason with the given signal.
    pub fn signaled(signal: i32) -> Self {
        Self::Signaled { signal }
    }
}

impl From<ExitStatus> for ExitReason {
    fn from(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::exited(code),
            (None, Some(signal)) => Self::signaled(signal),
            // Neither code nor signal only happens for stopped children,
            // which wait() does not report.
            (None, None) => Self::exited(-1),
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Exited { code } => write!(f, "exited with code {}", code),
            ExitReason::Signaled { signal } => write!(f, "killed by signal {}", signal),
        }
    }
}
