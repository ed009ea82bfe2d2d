//! Error types for TokenKeeper
//!
//! All error types use thiserror for clean error handling.
//! SECURITY: Error messages MUST NOT contain passwords or sensitive data.

use crate::constants::{
    ERROR_ACCESS_DENIED, ERROR_NOT_ALL_ASSIGNED, ERROR_NOT_ENOUGH_MEMORY, ERROR_NO_SUCH_PRIVILEGE,
    ERROR_OUTOFMEMORY, ERROR_PRIVILEGE_NOT_HELD,
};
use std::path::PathBuf;

/// Raw failure reported by a platform call
///
/// Carries the Win32 error code and the system message text. Produced only by
/// [`SecurityPlatform`](crate::core::SecurityPlatform) implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct PlatformError {
    pub code: u32,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        PlatformError {
            code,
            message: message.into(),
        }
    }
}

/// Errors from logon, token and privilege operations
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Access denied: {0}")]
    Unauthorized(PlatformError),

    #[error("Out of memory: {0}")]
    OutOfMemory(PlatformError),

    #[error("Privilege not held: {name}")]
    PrivilegeNotHeld { name: String },

    #[error("{operation} failed: {source}")]
    Platform {
        operation: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error("Logon failed for '{user}': {source}")]
    Logon {
        user: String,
        #[source]
        source: PlatformError,
    },

    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("Token handle has not been acquired")]
    TokenNotAcquired,

    #[error("Token handle already holds a token")]
    AlreadyAcquired,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SecurityError {
    /// Wrap a platform failure with the name of the operation that produced it
    pub fn platform(operation: &'static str, source: PlatformError) -> Self {
        SecurityError::Platform { operation, source }
    }

    /// Translate a failed privilege adjustment into the taxonomy
    ///
    /// `name` is the privilege the caller was operating on, or a joined list
    /// for batched calls.
    pub fn from_adjust(name: &str, source: PlatformError) -> Self {
        match source.code {
            ERROR_ACCESS_DENIED => SecurityError::Unauthorized(source),
            ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => SecurityError::OutOfMemory(source),
            ERROR_NOT_ALL_ASSIGNED | ERROR_PRIVILEGE_NOT_HELD | ERROR_NO_SUCH_PRIVILEGE => {
                SecurityError::PrivilegeNotHeld {
                    name: name.to_string(),
                }
            }
            _ => SecurityError::platform("AdjustTokenPrivileges", source),
        }
    }

    /// Platform error code carried by this error, if any
    pub fn code(&self) -> Option<u32> {
        match self {
            SecurityError::Unauthorized(e) | SecurityError::OutOfMemory(e) => Some(e.code),
            SecurityError::Platform { source, .. } | SecurityError::Logon { source, .. } => {
                Some(source.code)
            }
            SecurityError::Io { source, .. } => source.raw_os_error().map(|c| c as u32),
            _ => None,
        }
    }
}
