//! Error types for ignite.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ignite's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ignite operations.
#[derive(Error, Debug)]
pub enum Error {
    // Object store errors
    /// No object or raw entry exists at the key.
    #[error("not found: {key}")]
    NotFound {
        /// Storage key that was looked up.
        key: String,
    },

    /// A storage key is malformed.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Stored content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The requested kind is not registered in the scheme.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// A patch could not be applied to the current content.
    #[error("patch conflict for {key}: {message}")]
    PatchConflict {
        /// Storage key the patch targeted.
        key: String,
        /// Why the patch was rejected.
        message: String,
    },

    /// Object could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    // Network errors
    /// Transient provisioning condition, expected to resolve with time.
    #[error("network not ready: {0}")]
    RetryableNetwork(String),

    /// Structural provisioning failure that retrying cannot fix.
    #[error("network setup failed: {0}")]
    FatalNetwork(String),

    /// A bounded wait ran out of time.
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// Timeout in seconds.
        seconds: u64,
    },

    // VM lifecycle errors
    /// VM is in an invalid state for the requested operation.
    #[error("invalid vm state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// The hypervisor process failed or exited unsuccessfully.
    #[error("runtime error for VM {vm_id:?}: {message}")]
    Hypervisor {
        /// UID of the VM.
        vm_id: String,
        /// What went wrong.
        message: String,
    },

    // Configuration errors
    /// Failed to load configuration.
    #[error("failed to load config from {}: {message}", .path.display())]
    Config {
        /// Config file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    // Metrics errors
    /// A metric could not be registered or encoded.
    #[error("metrics error: {0}")]
    Metrics(String),

    // Command execution errors
    /// External command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not-found error for a storage key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a patch conflict error.
    pub fn patch_conflict(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PatchConflict {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a hypervisor error for a VM.
    pub fn hypervisor(vm_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hypervisor {
            vm_id: vm_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a missing object or key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
