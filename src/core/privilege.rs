//! A single named privilege on a token
//!
//! Every privilege mutation in the crate funnels through
//! [`adjust_token_privileges`]; a [`Privilege`] only updates its local state
//! after that call succeeds.

use super::platform::{DesiredState, Luid, PrivilegeAction};
use super::privilege_set::query_token_privileges;
use super::token::TokenHandle;
use super::token_privileges::PrivilegeAttributes;
use crate::constants::{ERROR_NONE_MAPPED, ERROR_NO_SUCH_PRIVILEGE};
use crate::utils::SecurityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// State of a privilege on one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivilegeState {
    Disabled,
    Enabled,
    EnabledByDefault,
    Removed,
}

impl PrivilegeState {
    pub fn from_attributes(attributes: PrivilegeAttributes) -> Self {
        // ENABLED_BY_DEFAULT stays set after a default privilege is disabled
        if attributes.contains(PrivilegeAttributes::REMOVED) {
            PrivilegeState::Removed
        } else if !attributes.contains(PrivilegeAttributes::ENABLED) {
            PrivilegeState::Disabled
        } else if attributes.contains(PrivilegeAttributes::ENABLED_BY_DEFAULT) {
            PrivilegeState::EnabledByDefault
        } else {
            PrivilegeState::Enabled
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, PrivilegeState::Enabled | PrivilegeState::EnabledByDefault)
    }
}

impl fmt::Display for PrivilegeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrivilegeState::Disabled => "disabled",
            PrivilegeState::Enabled => "enabled",
            PrivilegeState::EnabledByDefault => "enabled-by-default",
            PrivilegeState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Apply a batch of privilege actions to `token` in one platform call
///
/// Platform failures are mapped to `Unauthorized`, `OutOfMemory`,
/// `PrivilegeNotHeld` or a wrapped platform error.
pub fn adjust_token_privileges(
    token: &TokenHandle,
    disable_all: bool,
    actions: &[PrivilegeAction],
) -> Result<(), SecurityError> {
    let label = actions
        .iter()
        .map(|a| a.luid.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    adjust_labeled(token, disable_all, actions, &label)
}

/// [`adjust_token_privileges`] with privilege names for errors and the audit log
pub(crate) fn adjust_labeled(
    token: &TokenHandle,
    disable_all: bool,
    actions: &[PrivilegeAction],
    label: &str,
) -> Result<(), SecurityError> {
    let raw = token.raw()?;
    crate::logger::log_debug(&format!(
        "AdjustTokenPrivileges: {} action(s) [{}] disable_all={}",
        actions.len(),
        label,
        disable_all
    ));

    token
        .platform()
        .adjust_token_privileges(raw, disable_all, actions)
        .map_err(|e| {
            crate::logger::log_warn(&format!(
                "AdjustTokenPrivileges failed for [{}]: {}",
                label, e
            ));
            SecurityError::from_adjust(label, e)
        })
}

/// One privilege held by a token
pub struct Privilege {
    token: Arc<TokenHandle>,
    name: String,
    luid: Luid,
    state: PrivilegeState,
    display_name: OnceLock<String>,
}

impl Privilege {
    pub(crate) fn new(
        token: Arc<TokenHandle>,
        name: String,
        luid: Luid,
        state: PrivilegeState,
    ) -> Self {
        Privilege {
            token,
            name,
            luid,
            state,
            display_name: OnceLock::new(),
        }
    }

    /// Find `name` among the privileges currently held by `token`
    ///
    /// Fails with `PrivilegeNotHeld` if the token does not hold it.
    pub fn lookup(token: &Arc<TokenHandle>, name: &str) -> Result<Privilege, SecurityError> {
        let luid = token
            .platform()
            .lookup_privilege_value(name)
            .map_err(|e| match e.code {
                ERROR_NO_SUCH_PRIVILEGE | ERROR_NONE_MAPPED => SecurityError::PrivilegeNotHeld {
                    name: name.to_string(),
                },
                _ => SecurityError::platform("LookupPrivilegeValue", e),
            })?;

        let record = query_token_privileges(token)?
            .into_iter()
            .find(|r| r.luid == luid)
            .ok_or_else(|| SecurityError::PrivilegeNotHeld {
                name: name.to_string(),
            })?;

        let canonical = token
            .platform()
            .lookup_privilege_name(luid)
            .map_err(|e| SecurityError::platform("LookupPrivilegeName", e))?;

        Ok(Privilege::new(
            Arc::clone(token),
            canonical,
            luid,
            PrivilegeState::from_attributes(record.attributes),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn luid(&self) -> Luid {
        self.luid
    }

    pub fn state(&self) -> PrivilegeState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_removed(&self) -> bool {
        self.state == PrivilegeState::Removed
    }

    /// Human-readable description, resolved on first use
    pub fn display_name(&self) -> Result<&str, SecurityError> {
        if let Some(name) = self.display_name.get() {
            return Ok(name.as_str());
        }
        let resolved = self
            .token
            .platform()
            .lookup_privilege_display_name(&self.name)
            .map_err(|e| SecurityError::platform("LookupPrivilegeDisplayName", e))?;
        Ok(self.display_name.get_or_init(|| resolved).as_str())
    }

    pub fn enable(&mut self) -> Result<(), SecurityError> {
        self.apply(DesiredState::Enable)?;
        if self.state != PrivilegeState::EnabledByDefault {
            self.state = PrivilegeState::Enabled;
        }
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), SecurityError> {
        self.apply(DesiredState::Disable)?;
        self.state = PrivilegeState::Disabled;
        Ok(())
    }

    /// Permanently remove the privilege from the token
    ///
    /// Terminal: the privilege cannot be re-enabled without a new token.
    pub fn remove(&mut self) -> Result<(), SecurityError> {
        self.apply(DesiredState::Remove)?;
        self.state = PrivilegeState::Removed;
        Ok(())
    }

    fn apply(&self, desired: DesiredState) -> Result<(), SecurityError> {
        if self.is_removed() {
            return Err(SecurityError::PrivilegeNotHeld {
                name: self.name.clone(),
            });
        }
        adjust_labeled(
            &self.token,
            false,
            &[PrivilegeAction::new(self.luid, desired)],
            &self.name,
        )
    }
}

impl fmt::Debug for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Privilege")
            .field("name", &self.name)
            .field("luid", &self.luid)
            .field("state", &self.state)
            .finish()
    }
}
