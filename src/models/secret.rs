//! Zero-on-release secret storage
//!
//! SECURITY: [`SecretBuffer`] never implements Display, Clone, or a revealing
//! Debug. The only way to read the characters is [`SecretBuffer::marshal`],
//! which produces a transient nul-terminated copy that is zero-filled when it
//! goes out of scope, on every exit path including unwinding.

use crate::utils::SecurityError;
use std::fmt;
use zeroize::Zeroize;

/// UTF-16 secret characters, zero-filled on dispose and on drop
pub struct SecretBuffer {
    chars: Vec<u16>,
    disposed: bool,
}

impl SecretBuffer {
    /// Copy `secret` into a new buffer
    ///
    /// The caller's `&str` is not wiped; prefer [`SecretBuffer::from_wide`] when
    /// the source is already an owned buffer.
    pub fn new(secret: &str) -> Self {
        SecretBuffer {
            chars: encode_presized(secret, 0),
            disposed: false,
        }
    }

    /// Take ownership of already-encoded UTF-16 characters
    pub fn from_wide(chars: Vec<u16>) -> Self {
        SecretBuffer {
            chars,
            disposed: false,
        }
    }

    /// Number of UTF-16 code units held
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Zero-fill and release the backing memory. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.chars.zeroize();
        self.disposed = true;
        wipe_probe::record();
    }

    /// Copy the secret into a transient, nul-terminated buffer for one platform call
    pub(crate) fn marshal(&self) -> Result<MarshaledSecret, SecurityError> {
        if self.disposed {
            return Err(SecurityError::Disposed("SecretBuffer"));
        }
        let mut wide = Vec::with_capacity(self.chars.len() + 1);
        wide.extend_from_slice(&self.chars);
        wide.push(0);
        Ok(MarshaledSecret(wide))
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disposed {
            write!(f, "SecretBuffer(disposed)")
        } else {
            write!(f, "SecretBuffer(*** {} chars ***)", self.chars.len())
        }
    }
}

/// UTF-16 encode into a buffer that never reallocates
///
/// A UTF-8 string never has more UTF-16 units than bytes, so `secret.len()`
/// plus `extra` covers the whole encoding and any trailer. Growing the vector
/// would free a copy of the secret without wiping it.
fn encode_presized(secret: &str, extra: usize) -> Vec<u16> {
    let mut wide = Vec::with_capacity(secret.len() + extra);
    wide.extend(secret.encode_utf16());
    wide
}

/// Transient unmanaged copy of a secret, alive for one platform call
pub(crate) struct MarshaledSecret(Vec<u16>);

impl MarshaledSecret {
    pub(crate) fn from_plain(secret: &str) -> Self {
        let mut wide = encode_presized(secret, 1);
        wide.push(0);
        MarshaledSecret(wide)
    }

    /// Nul-terminated UTF-16
    pub(crate) fn as_wide(&self) -> &[u16] {
        &self.0
    }
}

impl Drop for MarshaledSecret {
    fn drop(&mut self) {
        self.0.zeroize();
        wipe_probe::record();
    }
}


#[cfg(not(test))]
mod wipe_probe {
    #[inline(always)]
    pub(crate) fn record() {}
}
