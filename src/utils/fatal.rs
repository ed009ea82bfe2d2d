//! Fatal failure classification
//!
//! Code that catches errors broadly (drop-time cleanup, eviction during a
//! lookup) must not log-and-continue on resource exhaustion. The classifier
//! is evaluated once at the boundary where the error is swallowed.

use super::errors::SecurityError;
use crate::constants::{
    ERROR_COMMITMENT_LIMIT, ERROR_NOT_ENOUGH_MEMORY, ERROR_NO_SYSTEM_RESOURCES, ERROR_OUTOFMEMORY,
};

/// How a failure must be treated by code that would otherwise swallow it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Process-level condition; propagate immediately
    Fatal,
    /// Safe to log and continue
    Recoverable,
}

fn is_fatal_code(code: u32) -> bool {
    matches!(
        code,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY | ERROR_NO_SYSTEM_RESOURCES | ERROR_COMMITMENT_LIMIT
    )
}

impl SecurityError {
    pub fn class(&self) -> FailureClass {
        let fatal = match self {
            SecurityError::OutOfMemory(_) => true,
            SecurityError::Io { source, .. } => {
                source.kind() == std::io::ErrorKind::OutOfMemory
                    || source
                        .raw_os_error()
                        .map(|c| is_fatal_code(c as u32))
                        .unwrap_or(false)
            }
            SecurityError::Unauthorized(_)
            | SecurityError::PrivilegeNotHeld { .. }
            | SecurityError::Disposed(_)
            | SecurityError::TokenNotAcquired
            | SecurityError::AlreadyAcquired
            | SecurityError::InvalidCredential(_) => false,
            SecurityError::Platform { source, .. } | SecurityError::Logon { source, .. } => {
                is_fatal_code(source.code)
            }
        };

        if fatal {
            FailureClass::Fatal
        } else {
            FailureClass::Recoverable
        }
    }
}

/// Shorthand for `err.class() == FailureClass::Fatal`
pub fn is_fatal(err: &SecurityError) -> bool {
    err.class() == FailureClass::Fatal
}

/// Log a recoverable failure or hand back a fatal one
///
/// Used wherever cleanup errors would otherwise be dropped.
pub fn log_unless_fatal(context: &str, err: SecurityError) -> Result<(), SecurityError> {
    if is_fatal(&err) {
        return Err(err);
    }
    crate::logger::log_warn(&format!("{}: {}", context, err));
    Ok(())
}
