//! Owned OS token handle
//!
//! [`TokenHandle`] is the only type that closes token handles. The handle
//! value lives in a single atomic slot; disposal swaps the slot to a
//! terminal sentinel and only the caller that wins the swap closes the
//! handle, so explicit disposal racing with `Drop` (or with another thread)
//! closes it exactly once.

use super::platform::{ImpersonationLevel, RawToken, SecurityPlatform};
use crate::utils::{is_fatal, SecurityError};
use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

const UNACQUIRED: isize = 0;
const DISPOSED: isize = isize::MIN;

/// Lifecycle of a [`TokenHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unacquired,
    Acquired,
    Disposed,
}

/// Exclusive owner of one OS token handle
pub struct TokenHandle {
    slot: AtomicIsize,
    platform: Arc<dyn SecurityPlatform>,
}

impl TokenHandle {
    /// Empty handle waiting for [`TokenHandle::acquire`]
    pub fn unacquired(platform: Arc<dyn SecurityPlatform>) -> Self {
        TokenHandle {
            slot: AtomicIsize::new(UNACQUIRED),
            platform,
        }
    }

    /// Take ownership of a handle returned by the platform
    pub(crate) fn from_raw(platform: Arc<dyn SecurityPlatform>, raw: RawToken) -> Self {
        debug_assert!(raw.0 != UNACQUIRED && raw.0 != DISPOSED);
        TokenHandle {
            slot: AtomicIsize::new(raw.0),
            platform,
        }
    }

    /// Move an unacquired handle to Acquired
    ///
    /// On error the caller still owns `raw` and must close it.
    pub fn acquire(&self, raw: RawToken) -> Result<(), SecurityError> {
        if raw.0 == UNACQUIRED || raw.0 == DISPOSED {
            return Err(SecurityError::TokenNotAcquired);
        }
        match self
            .slot
            .compare_exchange(UNACQUIRED, raw.0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(DISPOSED) => Err(SecurityError::Disposed("TokenHandle")),
            Err(_) => Err(SecurityError::AlreadyAcquired),
        }
    }

    pub fn state(&self) -> TokenState {
        match self.slot.load(Ordering::Acquire) {
            UNACQUIRED => TokenState::Unacquired,
            DISPOSED => TokenState::Disposed,
            _ => TokenState::Acquired,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == TokenState::Disposed
    }

    /// Raw handle for a platform call; the handle stays owned by `self`
    pub fn raw(&self) -> Result<RawToken, SecurityError> {
        match self.slot.load(Ordering::Acquire) {
            UNACQUIRED => Err(SecurityError::TokenNotAcquired),
            DISPOSED => Err(SecurityError::Disposed("TokenHandle")),
            raw => Ok(RawToken(raw)),
        }
    }

    pub fn platform(&self) -> &Arc<dyn SecurityPlatform> {
        &self.platform
    }

    /// Duplicate into a new, independently owned handle
    pub fn duplicate(&self, level: ImpersonationLevel) -> Result<TokenHandle, SecurityError> {
        let raw = self.raw()?;
        let copy = self
            .platform
            .duplicate_token(raw, level)
            .map_err(|e| SecurityError::platform("DuplicateTokenEx", e))?;
        Ok(TokenHandle::from_raw(Arc::clone(&self.platform), copy))
    }

    /// Close the handle. Idempotent; disposing an unacquired handle is a no-op.
    pub fn dispose(&self) -> Result<(), SecurityError> {
        let mut current = self.slot.load(Ordering::Acquire);
        loop {
            if current == UNACQUIRED || current == DISPOSED {
                return Ok(());
            }
            match self.slot.compare_exchange_weak(
                current,
                DISPOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        self.platform
            .close_handle(RawToken(current))
            .map_err(|e| SecurityError::platform("CloseHandle", e))
    }
}

impl Drop for TokenHandle {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            let level = if is_fatal(&e) { "FATAL" } else { "recoverable" };
            crate::logger::log_error(&format!(
                "Token handle release during drop failed ({}): {}",
                level, e
            ));
        }
    }
}

impl fmt::Debug for TokenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHandle")
            .field("state", &self.state())
            .finish()
    }
}
