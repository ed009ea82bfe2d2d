//! Snapshot of every privilege held by one token
//!
//! A [`PrivilegeSet`] is not a live view. Changes made to the token by other
//! code are only visible after [`PrivilegeSet::refresh`]. The set is not
//! internally synchronized; callers serialize refresh and mutation against a
//! given token themselves.

use super::platform::{DesiredState, PrivilegeAction};
use super::privilege::{adjust_labeled, Privilege, PrivilegeState};
use super::token::TokenHandle;
use super::token_privileges::{decode, PrivilegeRecord};
use crate::constants::{ERROR_INSUFFICIENT_BUFFER, SE_CHANGE_NOTIFY_NAME};
use crate::utils::SecurityError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Privileges can be added between the probe and the fetch; retry this many times
const MAX_QUERY_ATTEMPTS: usize = 3;

/// Serializable view of one privilege, for reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivilegeInfo {
    pub name: String,
    pub luid: super::platform::Luid,
    pub state: PrivilegeState,
}

impl PrivilegeInfo {
    /// Convert to JSON value for diagnostics output
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({}))
    }
}

/// Read the raw TOKEN_PRIVILEGES records of `token`
///
/// Uses the platform's probe-then-fetch pattern: the first call with an
/// empty buffer must fail with `ERROR_INSUFFICIENT_BUFFER` and report the
/// size; any other probe failure is returned as is.
pub(crate) fn query_token_privileges(
    token: &TokenHandle,
) -> Result<Vec<PrivilegeRecord>, SecurityError> {
    let raw = token.raw()?;
    let platform = token.platform();

    let mut required = 0u32;
    match platform.token_privileges(raw, &mut [], &mut required) {
        Ok(()) => return Ok(Vec::new()),
        Err(e) if e.code == ERROR_INSUFFICIENT_BUFFER => {}
        Err(e) => return Err(SecurityError::platform("GetTokenInformation", e)),
    }

    for _ in 0..MAX_QUERY_ATTEMPTS {
        let mut buffer = vec![0u8; required as usize];
        match platform.token_privileges(raw, &mut buffer, &mut required) {
            Ok(()) => {
                let written = (required as usize).min(buffer.len());
                return decode(&buffer[..written]);
            }
            Err(e) if e.code == ERROR_INSUFFICIENT_BUFFER => {
                crate::logger::log_debug_verbose(&format!(
                    "Token privileges grew during query, retrying with {} bytes",
                    required
                ));
            }
            Err(e) => return Err(SecurityError::platform("GetTokenInformation", e)),
        }
    }

    Err(SecurityError::platform(
        "GetTokenInformation",
        crate::utils::PlatformError::new(
            ERROR_INSUFFICIENT_BUFFER,
            "Token privilege list kept changing size",
        ),
    ))
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Every privilege held by one token, keyed by name (case-insensitive)
pub struct PrivilegeSet {
    token: Arc<TokenHandle>,
    privileges: HashMap<String, Privilege>,
}

impl PrivilegeSet {
    /// Build a set and load it from the token
    pub fn new(token: Arc<TokenHandle>) -> Result<Self, SecurityError> {
        let mut set = PrivilegeSet {
            token,
            privileges: HashMap::new(),
        };
        set.refresh()?;
        Ok(set)
    }

    pub fn token(&self) -> &Arc<TokenHandle> {
        &self.token
    }

    /// Re-read the token and replace the whole snapshot
    ///
    /// On failure the previous snapshot is left untouched.
    pub fn refresh(&mut self) -> Result<(), SecurityError> {
        let records = query_token_privileges(&self.token)?;
        let platform = self.token.platform();

        let mut fresh = HashMap::with_capacity(records.len());
        for record in records {
            let state = PrivilegeState::from_attributes(record.attributes);
            if state == PrivilegeState::Removed {
                continue;
            }
            let name = platform
                .lookup_privilege_name(record.luid)
                .map_err(|e| SecurityError::platform("LookupPrivilegeName", e))?;
            fresh.insert(
                key(&name),
                Privilege::new(Arc::clone(&self.token), name, record.luid, state),
            );
        }

        self.privileges = fresh;
        Ok(())
    }

    /// Privilege by name; `PrivilegeNotHeld` if the token does not hold it
    pub fn get(&self, name: &str) -> Result<&Privilege, SecurityError> {
        self.privileges
            .get(&key(name))
            .ok_or_else(|| SecurityError::PrivilegeNotHeld {
                name: name.to_string(),
            })
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Privilege, SecurityError> {
        self.privileges
            .get_mut(&key(name))
            .ok_or_else(|| SecurityError::PrivilegeNotHeld {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.privileges.contains_key(&key(name))
    }

    pub fn len(&self) -> usize {
        self.privileges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.privileges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Privilege> {
        self.privileges.values()
    }

    /// Held privilege names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn enable(&mut self, name: &str) -> Result<(), SecurityError> {
        self.get_mut(name)?.enable()
    }

    pub fn disable(&mut self, name: &str) -> Result<(), SecurityError> {
        self.get_mut(name)?.disable()
    }

    /// Remove a privilege from the token and detach it from this set
    pub fn remove(&mut self, name: &str) -> Result<(), SecurityError> {
        self.get_mut(name)?.remove()?;
        self.privileges.remove(&key(name));
        Ok(())
    }

    /// Remove every held privilege except `exceptions` and change-notify
    ///
    /// All removals go to the platform as a single batched call. Local state
    /// is only changed once that call succeeds; the set then holds the
    /// surviving exceptions alongside change-notify, mirroring the token.
    pub fn reduce_privileges_to_minimum(&mut self, exceptions: &[&str]) -> Result<(), SecurityError> {
        let keep: HashSet<String> = exceptions
            .iter()
            .map(|n| key(n))
            .chain(std::iter::once(key(SE_CHANGE_NOTIFY_NAME)))
            .collect();

        let mut doomed: Vec<&Privilege> = self
            .privileges
            .iter()
            .filter(|(k, _)| !keep.contains(*k))
            .map(|(_, p)| p)
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        doomed.sort_by(|a, b| a.name().cmp(b.name()));

        let actions: Vec<PrivilegeAction> = doomed
            .iter()
            .map(|p| PrivilegeAction::new(p.luid(), DesiredState::Remove))
            .collect();
        let label = doomed
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ");

        adjust_labeled(&self.token, false, &actions, &label)?;
        crate::logger::log_info(&format!(
            "Reduced token to minimum privileges, removed {} ({})",
            actions.len(),
            label
        ));

        self.privileges.retain(|k, _| keep.contains(k));
        Ok(())
    }

    /// Sorted serializable view of the current snapshot
    pub fn snapshot(&self) -> Vec<PrivilegeInfo> {
        let mut infos: Vec<PrivilegeInfo> = self
            .iter()
            .map(|p| PrivilegeInfo {
                name: p.name().to_string(),
                luid: p.luid(),
                state: p.state(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl std::fmt::Debug for PrivilegeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeSet")
            .field("token", &self.token)
            .field("privileges", &self.names())
            .finish()
    }
}
