//! One cached logon identity
//!
//! SECURITY: the secret never leaves the entry except as the transient
//! marshaled copy handed to a single logon call.

use super::clock::{to_chrono, Clock};
use super::credential_cache::CacheConfig;
use super::logon::LogonService;
use super::token::TokenHandle;
use crate::models::{LogonKind, QualifiedName, SecretBuffer, Username};
use crate::utils::sync::lock_or_recover;
use crate::utils::{is_fatal, log_unless_fatal, SecurityError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Names, secret and (once logged on) the token of one cached identity
///
/// Read accessors refresh `last_accessed`, which drives sliding expiration.
/// After [`CredentialEntry::dispose`] every accessor fails with `Disposed`.
pub struct CredentialEntry {
    id: String,
    name: QualifiedName,
    kind: LogonKind,
    created: DateTime<Utc>,
    last_accessed: Mutex<DateTime<Utc>>,
    secret: Mutex<SecretBuffer>,
    token: Mutex<Option<Arc<TokenHandle>>>,
    disposed: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl CredentialEntry {
    pub(crate) fn new(
        id: &str,
        name: QualifiedName,
        secret: SecretBuffer,
        kind: LogonKind,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let created = clock.now();
        CredentialEntry {
            id: id.to_string(),
            name,
            kind,
            created,
            last_accessed: Mutex::new(created),
            secret: Mutex::new(secret),
            token: Mutex::new(None),
            disposed: AtomicBool::new(false),
            clock,
        }
    }

    fn ensure_live(&self) -> Result<(), SecurityError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SecurityError::Disposed("CredentialEntry"));
        }
        Ok(())
    }

    /// Check liveness and record an access
    fn touch(&self) -> Result<(), SecurityError> {
        self.ensure_live()?;
        let now = self.clock.now();
        let mut last = lock_or_recover(&self.last_accessed, "credential_entry.last_accessed");
        // Never move backwards, so created <= last_accessed holds with any clock
        if now > *last {
            *last = now;
        }
        Ok(())
    }

    /// Cache key this entry was added under, as given by the caller
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> Result<&Username, SecurityError> {
        self.touch()?;
        Ok(self.name.user())
    }

    pub fn domain(&self) -> Result<Option<&str>, SecurityError> {
        self.touch()?;
        Ok(self.name.domain())
    }

    pub fn qualified_name(&self) -> Result<&QualifiedName, SecurityError> {
        self.touch()?;
        Ok(&self.name)
    }

    pub fn logon_kind(&self) -> Result<LogonKind, SecurityError> {
        self.touch()?;
        Ok(self.kind)
    }

    /// Token bound by an earlier [`CredentialEntry::logon`], if any
    pub fn bound_token(&self) -> Result<Option<Arc<TokenHandle>>, SecurityError> {
        self.touch()?;
        Ok(lock_or_recover(&self.token, "credential_entry.token").clone())
    }

    pub fn created(&self) -> Result<DateTime<Utc>, SecurityError> {
        self.ensure_live()?;
        Ok(self.created)
    }

    /// Time of the last read accessor call; does not count as an access itself
    pub fn last_accessed(&self) -> Result<DateTime<Utc>, SecurityError> {
        self.ensure_live()?;
        Ok(self.read_last_accessed())
    }

    fn read_last_accessed(&self) -> DateTime<Utc> {
        *lock_or_recover(&self.last_accessed, "credential_entry.last_accessed")
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Log on with the entry's own secret and bind the resulting token
    ///
    /// The first call performs the logon; later calls return the bound token.
    ///
    /// # Returns
    /// * `Ok(token)` - Impersonation-level token owned by this entry
    /// * `Err(SecurityError::Disposed)` - The entry was disposed before or during the logon
    /// * `Err(SecurityError::Logon)` - The platform rejected the credentials
    pub fn logon(&self, service: &LogonService) -> Result<Arc<TokenHandle>, SecurityError> {
        self.touch()?;
        // Lock order: token, then secret. dispose() never holds both.
        let mut slot = lock_or_recover(&self.token, "credential_entry.token");
        if let Some(token) = slot.as_ref() {
            if !token.is_disposed() {
                return Ok(Arc::clone(token));
            }
        }

        let handle = {
            let secret = lock_or_recover(&self.secret, "credential_entry.secret");
            service.logon_secure(
                self.name.user().as_str(),
                self.name.domain(),
                &secret,
                self.kind,
            )?
        };

        if self.is_disposed() {
            // dispose() ran while we were logging on and already emptied the slot
            if let Err(e) = handle.dispose() {
                log_unless_fatal("Releasing token of disposed credential entry", e)?;
            }
            return Err(SecurityError::Disposed("CredentialEntry"));
        }

        let token = Arc::new(handle);
        *slot = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Whether the entry is past either deadline at `now`
    ///
    /// Deadlines are exclusive: an entry is still valid at exactly
    /// `created + absolute` or `last_accessed + sliding`. A disposed entry is
    /// always expired.
    pub fn is_expired(&self, now: DateTime<Utc>, config: &CacheConfig) -> bool {
        if self.is_disposed() {
            return true;
        }
        let past = |from: DateTime<Utc>, ttl| {
            from.checked_add_signed(to_chrono(ttl))
                .map(|deadline| now > deadline)
                .unwrap_or(false)
        };
        if let Some(ttl) = config.absolute_expiration {
            if past(self.created, ttl) {
                return true;
            }
        }
        if let Some(ttl) = config.sliding_expiration {
            if past(self.read_last_accessed(), ttl) {
                return true;
            }
        }
        false
    }

    /// Zero the secret and close any bound token. Idempotent.
    ///
    /// The secret is always wiped; a failure to close the token is returned
    /// after the entry is already marked disposed.
    pub fn dispose(&self) -> Result<(), SecurityError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        lock_or_recover(&self.secret, "credential_entry.secret").dispose();

        let token = lock_or_recover(&self.token, "credential_entry.token").take();
        match token {
            Some(token) => token.dispose(),
            None => Ok(()),
        }
    }
}

impl Drop for CredentialEntry {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            let level = if is_fatal(&e) { "FATAL" } else { "recoverable" };
            crate::logger::log_error(&format!(
                "Credential entry '{}' cleanup during drop failed ({}): {}",
                self.id, level, e
            ));
        }
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("id", &self.id)
            .field("name", &self.name.to_string())
            .field("kind", &self.kind)
            .field("created", &self.created)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
