//! Keyed store of logon identities with sliding and absolute expiration
//!
//! One mutex per cache guards the map. Entries leaving the map (eviction,
//! removal, clear) are disposed while that mutex is held, so no other thread
//! can fetch an entry that has already been removed.

use super::clock::{Clock, SystemClock};
use super::credential_entry::CredentialEntry;
use crate::constants::{
    DEFAULT_ABSOLUTE_EXPIRATION_SECS, DEFAULT_SLIDING_EXPIRATION_SECS, ENV_CACHE_ABSOLUTE_SECS,
    ENV_CACHE_SLIDING_SECS,
};
use crate::models::{LogonKind, QualifiedName, SecretBuffer};
use crate::utils::sync::lock_or_recover;
use crate::utils::{log_unless_fatal, SecurityError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Expiration policy; `None` disables that check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Evict when not accessed for this long
    pub sliding_expiration: Option<Duration>,
    /// Evict this long after the entry was added, regardless of access
    pub absolute_expiration: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            sliding_expiration: Some(Duration::from_secs(DEFAULT_SLIDING_EXPIRATION_SECS)),
            absolute_expiration: Some(Duration::from_secs(DEFAULT_ABSOLUTE_EXPIRATION_SECS)),
        }
    }
}

impl CacheConfig {
    pub fn with_sliding(mut self, ttl: Duration) -> Self {
        self.sliding_expiration = Some(ttl);
        self
    }

    pub fn with_absolute(mut self, ttl: Duration) -> Self {
        self.absolute_expiration = Some(ttl);
        self
    }

    pub fn without_sliding(mut self) -> Self {
        self.sliding_expiration = None;
        self
    }

    pub fn without_absolute(mut self) -> Self {
        self.absolute_expiration = None;
        self
    }

    /// Defaults overridden by `TK_CACHE_SLIDING_SECS` / `TK_CACHE_ABSOLUTE_SECS`
    ///
    /// `0` disables a check. Values that do not parse keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CacheConfig::default();
        CacheConfig {
            sliding_expiration: timeout_setting(
                ENV_CACHE_SLIDING_SECS,
                lookup(ENV_CACHE_SLIDING_SECS),
                defaults.sliding_expiration,
            ),
            absolute_expiration: timeout_setting(
                ENV_CACHE_ABSOLUTE_SECS,
                lookup(ENV_CACHE_ABSOLUTE_SECS),
                defaults.absolute_expiration,
            ),
        }
    }
}

fn timeout_setting(name: &str, raw: Option<String>, default: Option<Duration>) -> Option<Duration> {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            crate::logger::log_warn(&format!(
                "Ignoring {}={:?}: expected whole seconds, using default",
                name, raw
            ));
            default
        }
    }
}

fn key(id: &str) -> String {
    id.to_lowercase()
}

/// Credential cache keyed by case-insensitive id
///
/// There is no implicit teardown: entries stay until they expire on lookup,
/// are removed, or [`CredentialCache::clear`] is called.
pub struct CredentialCache {
    entries: Mutex<HashMap<String, Arc<CredentialEntry>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl CredentialCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        CredentialCache {
            entries: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn with_system_clock(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert a new entry unless `id` is already present
    ///
    /// # Returns
    /// * `Some(entry)` - The newly stored entry
    /// * `None` - `id` is taken; the existing entry is untouched and `secret` is wiped
    pub fn add(
        &self,
        id: &str,
        name: QualifiedName,
        secret: SecretBuffer,
        kind: LogonKind,
    ) -> Option<Arc<CredentialEntry>> {
        let mut entries = lock_or_recover(&self.entries, "credential_cache");
        let key = key(id);
        if entries.contains_key(&key) {
            crate::logger::log_debug(&format!("Credential cache: '{}' already present", id));
            return None;
        }

        crate::logger::log_info(&format!(
            "Credential cache: added '{}' ({}, {})",
            id, name, kind
        ));
        let entry = Arc::new(CredentialEntry::new(
            id,
            name,
            secret,
            kind,
            Arc::clone(&self.clock),
        ));
        entries.insert(key, Arc::clone(&entry));
        Some(entry)
    }

    /// Fetch a live entry
    ///
    /// Expired entries are evicted, disposed and reported as `None`. The
    /// expiration test runs outside the lock, so an entry that expires between
    /// the test and the return may still be handed out.
    ///
    /// Fetching does not count as an access; the entry's read accessors do.
    pub fn get_identity(&self, id: &str) -> Result<Option<Arc<CredentialEntry>>, SecurityError> {
        let key = key(id);
        let found = lock_or_recover(&self.entries, "credential_cache")
            .get(&key)
            .cloned();
        let Some(entry) = found else {
            return Ok(None);
        };

        if !entry.is_expired(self.clock.now(), &self.config) {
            return Ok(Some(entry));
        }

        let mut entries = lock_or_recover(&self.entries, "credential_cache");
        // Only evict the entry we tested; the id may have been re-added meanwhile
        if entries
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &entry))
        {
            entries.remove(&key);
            crate::logger::log_info(&format!("Credential cache: '{}' expired, evicted", id));
        } else {
            crate::logger::log_debug(&format!(
                "Credential cache: expired '{}' was already replaced",
                id
            ));
        }
        if let Err(e) = entry.dispose() {
            log_unless_fatal(&format!("Disposing expired credential '{}'", id), e)?;
        }
        drop(entries);

        Ok(None)
    }

    pub fn contains(&self, id: &str) -> bool {
        lock_or_recover(&self.entries, "credential_cache").contains_key(&key(id))
    }

    /// Dispose and remove `id`
    ///
    /// # Returns
    /// * `Ok(true)` - The entry was present and is now disposed
    /// * `Ok(false)` - Nothing stored under `id`
    /// * `Err(_)` - Removed, but its token failed to close
    pub fn remove(&self, id: &str) -> Result<bool, SecurityError> {
        let mut entries = lock_or_recover(&self.entries, "credential_cache");
        let Some(entry) = entries.remove(&key(id)) else {
            return Ok(false);
        };
        crate::logger::log_info(&format!("Credential cache: removed '{}'", id));
        entry.dispose()?;
        Ok(true)
    }

    /// Dispose and remove every entry
    ///
    /// All entries are disposed even if some fail; the first failure is returned.
    pub fn clear(&self) -> Result<(), SecurityError> {
        let mut entries = lock_or_recover(&self.entries, "credential_cache");
        let count = entries.len();
        let mut first_error = None;
        for (id, entry) in entries.drain() {
            if let Err(e) = entry.dispose() {
                crate::logger::log_warn(&format!(
                    "Credential cache: disposing '{}' during clear failed: {}",
                    id, e
                ));
                first_error.get_or_insert(e);
            }
        }
        crate::logger::log_info(&format!("Credential cache: cleared {} entries", count));
        first_error.map_or(Ok(()), Err)
    }

    /// Evict every expired entry in one pass, returning how many were evicted
    pub fn purge_expired(&self) -> Result<usize, SecurityError> {
        let now = self.clock.now();
        let mut entries = lock_or_recover(&self.entries, "credential_cache");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, &self.config))
            .map(|(key, _)| key.clone())
            .collect();

        let mut fatal = None;
        for key in &expired {
            if let Some(entry) = entries.remove(key) {
                let outcome = entry.dispose().or_else(|e| {
                    log_unless_fatal(&format!("Disposing expired credential '{}'", key), e)
                });
                if let Err(e) = outcome {
                    fatal.get_or_insert(e);
                }
            }
        }
        drop(entries);

        if !expired.is_empty() {
            crate::logger::log_info(&format!(
                "Credential cache: purged {} expired entries",
                expired.len()
            ));
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(expired.len()),
        }
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, "credential_cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all stored entries (expired or not), sorted
    pub fn ids(&self) -> Vec<String> {
        let entries = lock_or_recover(&self.entries, "credential_cache");
        let mut ids: Vec<String> = entries.values().map(|e| e.id().to_string()).collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("config", &self.config)
            .field("ids", &self.ids())
            .finish()
    }
}
