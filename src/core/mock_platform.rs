//! In-memory security platform for tests
//!
//! Simulates LogonUser, token duplication, privilege query/adjust and
//! per-thread impersonation. Records every close call per handle so tests can
//! assert a handle was released exactly once.

use super::platform::{
    DesiredState, ImpersonationLevel, Luid, PrivilegeAction, RawToken, SecurityPlatform,
};
use super::token_privileges::{encode, PrivilegeAttributes, PrivilegeRecord};
use crate::constants::*;
use crate::models::LogonKind;
use crate::utils::PlatformError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread::ThreadId;

/// Operations that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    Logon,
    Duplicate,
    OpenProcessToken,
    Close,
    QueryPrivileges,
    Adjust,
    LookupName,
    Impersonate,
    Revert,
    OpenThreadToken,
    SetThreadToken,
}

const CATALOG: &[(u32, &str, &str)] = &[
    (8, SE_SECURITY_NAME, "Manage auditing and security log"),
    (9, SE_TAKE_OWNERSHIP_NAME, "Take ownership of files or other objects"),
    (17, SE_BACKUP_NAME, "Back up files and directories"),
    (18, SE_RESTORE_NAME, "Restore files and directories"),
    (19, SE_SHUTDOWN_NAME, "Shut down the system"),
    (20, SE_DEBUG_NAME, "Debug programs"),
    (23, SE_CHANGE_NOTIFY_NAME, "Bypass traverse checking"),
    (25, SE_UNDOCK_NAME, "Remove computer from docking station"),
    (34, SE_TIME_ZONE_NAME, "Change the time zone"),
];

#[derive(Debug, Clone)]
struct TokenRecord {
    user: String,
    primary: bool,
    privileges: Vec<PrivilegeRecord>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_handle: isize,
    open: HashMap<RawToken, TokenRecord>,
    close_calls: HashMap<RawToken, usize>,
    users: HashMap<String, String>,
    default_privileges: Vec<PrivilegeRecord>,
    failures: HashMap<FakeOp, u32>,
    impersonating: HashMap<ThreadId, TokenRecord>,
    logon_calls: usize,
    adjust_calls: usize,
    query_calls: usize,
    last_batch_len: usize,
}

/// Fake [`SecurityPlatform`] backed by a mutex-guarded state table
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

fn luid_of(name: &str) -> Luid {
    CATALOG
        .iter()
        .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
        .map(|(low, _, _)| Luid::new(*low, 0))
        .unwrap_or_else(|| panic!("privilege {name} missing from fake catalog"))
}

fn record(name: &str, attributes: PrivilegeAttributes) -> PrivilegeRecord {
    PrivilegeRecord {
        luid: luid_of(name),
        attributes,
    }
}

impl FakePlatform {
    /// Platform whose new tokens hold change-notify (enabled by default) plus
    /// shutdown, backup, restore, debug and time-zone (all disabled)
    pub fn new() -> Self {
        let default_on = PrivilegeAttributes::ENABLED | PrivilegeAttributes::ENABLED_BY_DEFAULT;
        let off = PrivilegeAttributes::empty();
        let state = FakeState {
            next_handle: 0x100,
            default_privileges: vec![
                record(SE_CHANGE_NOTIFY_NAME, default_on),
                record(SE_SHUTDOWN_NAME, off),
                record(SE_BACKUP_NAME, off),
                record(SE_RESTORE_NAME, off),
                record(SE_DEBUG_NAME, off),
                record(SE_TIME_ZONE_NAME, off),
            ],
            ..FakeState::default()
        };
        FakePlatform {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_user(&self, user: &str, password: &str) {
        self.state()
            .users
            .insert(user.to_lowercase(), password.to_string());
    }

    pub fn fail(&self, op: FakeOp, code: u32) {
        self.state().failures.insert(op, code);
    }

    pub fn clear_failure(&self, op: FakeOp) {
        self.state().failures.remove(&op);
    }

    /// Register a raw handle that nothing else knows about
    pub fn issue_handle(&self) -> RawToken {
        let mut state = self.state();
        let raw = next_handle(&mut state);
        let privileges = state.default_privileges.clone();
        state.open.insert(
            raw,
            TokenRecord {
                user: "fixture".to_string(),
                primary: true,
                privileges,
            },
        );
        raw
    }

    pub fn close_count(&self, token: RawToken) -> usize {
        self.state().close_calls.get(&token).copied().unwrap_or(0)
    }

    pub fn is_open(&self, token: RawToken) -> bool {
        self.state().open.contains_key(&token)
    }

    pub fn open_handle_count(&self) -> usize {
        self.state().open.len()
    }

    pub fn is_primary(&self, token: RawToken) -> Option<bool> {
        self.state().open.get(&token).map(|t| t.primary)
    }

    pub fn token_user(&self, token: RawToken) -> Option<String> {
        self.state().open.get(&token).map(|t| t.user.clone())
    }

    pub fn logon_calls(&self) -> usize {
        self.state().logon_calls
    }

    pub fn adjust_calls(&self) -> usize {
        self.state().adjust_calls
    }

    pub fn query_calls(&self) -> usize {
        self.state().query_calls
    }

    pub fn last_batch_len(&self) -> usize {
        self.state().last_batch_len
    }

    /// User the calling thread is impersonating, if any
    ///
    /// Kept as a copy of the token record, so it outlives the handle that
    /// installed it, as a real thread token does.
    pub fn current_identity(&self) -> Option<String> {
        self.state()
            .impersonating
            .get(&std::thread::current().id())
            .map(|t| t.user.clone())
    }

    pub fn held_privileges(&self, token: RawToken) -> Vec<String> {
        let state = self.state();
        let Some(record) = state.open.get(&token) else {
            return Vec::new();
        };
        record
            .privileges
            .iter()
            .filter_map(|p| {
                CATALOG
                    .iter()
                    .find(|(low, _, _)| *low == p.luid.low)
                    .map(|(_, name, _)| name.to_string())
            })
            .collect()
    }

    pub fn attributes_of(&self, token: RawToken, name: &str) -> Option<PrivilegeAttributes> {
        let luid = luid_of(name);
        self.state()
            .open
            .get(&token)
            .and_then(|t| t.privileges.iter().find(|p| p.luid == luid))
            .map(|p| p.attributes)
    }

    /// Replace the privileges held by `token` behind the core's back
    pub fn set_privileges(&self, token: RawToken, held: &[(&str, PrivilegeAttributes)]) {
        let records = held.iter().map(|(n, a)| record(n, *a)).collect();
        if let Some(t) = self.state().open.get_mut(&token) {
            t.privileges = records;
        }
    }

    fn check(state: &FakeState, op: FakeOp) -> Result<(), PlatformError> {
        match state.failures.get(&op) {
            Some(code) => Err(PlatformError::new(*code, format!("injected {:?} failure", op))),
            None => Ok(()),
        }
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn next_handle(state: &mut FakeState) -> RawToken {
    state.next_handle += 4;
    RawToken(state.next_handle)
}

fn invalid_handle() -> PlatformError {
    PlatformError::new(ERROR_INVALID_HANDLE, "The handle is invalid.")
}

impl SecurityPlatform for FakePlatform {
    fn logon_user(
        &self,
        user: &str,
        domain: Option<&str>,
        secret: &[u16],
        _kind: LogonKind,
    ) -> Result<RawToken, PlatformError> {
        let mut state = self.state();
        state.logon_calls += 1;
        Self::check(&state, FakeOp::Logon)?;

        assert_eq!(secret.last(), Some(&0), "secret must be nul-terminated");
        let password = String::from_utf16_lossy(&secret[..secret.len() - 1]);
        let known = state.users.get(&user.to_lowercase()).cloned();
        if known.as_deref() != Some(password.as_str()) {
            return Err(PlatformError::new(
                ERROR_LOGON_FAILURE,
                "The user name or password is incorrect.",
            ));
        }

        let raw = next_handle(&mut state);
        let privileges = state.default_privileges.clone();
        state.open.insert(
            raw,
            TokenRecord {
                user: crate::models::display_account(user, domain),
                primary: true,
                privileges,
            },
        );
        Ok(raw)
    }

    fn duplicate_token(
        &self,
        token: RawToken,
        _level: ImpersonationLevel,
    ) -> Result<RawToken, PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::Duplicate)?;
        let mut copy = state.open.get(&token).cloned().ok_or_else(invalid_handle)?;
        copy.primary = false;
        let raw = next_handle(&mut state);
        state.open.insert(raw, copy);
        Ok(raw)
    }

    fn open_process_token(&self) -> Result<RawToken, PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::OpenProcessToken)?;
        let raw = next_handle(&mut state);
        let privileges = state.default_privileges.clone();
        state.open.insert(
            raw,
            TokenRecord {
                user: "process".to_string(),
                primary: true,
                privileges,
            },
        );
        Ok(raw)
    }

    fn close_handle(&self, token: RawToken) -> Result<(), PlatformError> {
        let mut state = self.state();
        *state.close_calls.entry(token).or_insert(0) += 1;
        Self::check(&state, FakeOp::Close)?;
        state.open.remove(&token).map(|_| ()).ok_or_else(invalid_handle)
    }

    fn token_privileges(
        &self,
        token: RawToken,
        buffer: &mut [u8],
        return_length: &mut u32,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.query_calls += 1;
        Self::check(&state, FakeOp::QueryPrivileges)?;
        let record = state.open.get(&token).ok_or_else(invalid_handle)?;
        let data = encode(&record.privileges);
        *return_length = data.len() as u32;
        if buffer.len() < data.len() {
            return Err(PlatformError::new(
                ERROR_INSUFFICIENT_BUFFER,
                "The data area passed to a system call is too small.",
            ));
        }
        buffer[..data.len()].copy_from_slice(&data);
        Ok(())
    }

    fn adjust_token_privileges(
        &self,
        token: RawToken,
        disable_all: bool,
        actions: &[PrivilegeAction],
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.adjust_calls += 1;
        state.last_batch_len = actions.len();
        Self::check(&state, FakeOp::Adjust)?;
        let record = state.open.get_mut(&token).ok_or_else(invalid_handle)?;

        if actions
            .iter()
            .any(|a| !record.privileges.iter().any(|p| p.luid == a.luid))
        {
            return Err(PlatformError::new(
                ERROR_NOT_ALL_ASSIGNED,
                "Not all privileges or groups referenced are assigned to the caller.",
            ));
        }

        if disable_all {
            for p in &mut record.privileges {
                p.attributes.remove(PrivilegeAttributes::ENABLED);
            }
        }

        for action in actions {
            match action.state {
                DesiredState::Remove => record.privileges.retain(|p| p.luid != action.luid),
                DesiredState::Enable | DesiredState::Disable => {
                    if let Some(p) = record.privileges.iter_mut().find(|p| p.luid == action.luid) {
                        p.attributes.set(
                            PrivilegeAttributes::ENABLED,
                            action.state == DesiredState::Enable,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn lookup_privilege_name(&self, luid: Luid) -> Result<String, PlatformError> {
        Self::check(&self.state(), FakeOp::LookupName)?;
        CATALOG
            .iter()
            .find(|(low, _, _)| luid.high == 0 && *low == luid.low)
            .map(|(_, name, _)| name.to_string())
            .ok_or_else(|| PlatformError::new(ERROR_NONE_MAPPED, "No mapping was done."))
    }

    fn lookup_privilege_value(&self, name: &str) -> Result<Luid, PlatformError> {
        CATALOG
            .iter()
            .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
            .map(|(low, _, _)| Luid::new(*low, 0))
            .ok_or_else(|| {
                PlatformError::new(ERROR_NO_SUCH_PRIVILEGE, "A specified privilege does not exist.")
            })
    }

    fn lookup_privilege_display_name(&self, name: &str) -> Result<String, PlatformError> {
        CATALOG
            .iter()
            .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, _, display)| display.to_string())
            .ok_or_else(|| {
                PlatformError::new(ERROR_NO_SUCH_PRIVILEGE, "A specified privilege does not exist.")
            })
    }

    fn impersonate(&self, token: RawToken) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::Impersonate)?;
        let record = state.open.get(&token).cloned().ok_or_else(invalid_handle)?;
        state
            .impersonating
            .insert(std::thread::current().id(), record);
        Ok(())
    }

    fn revert_to_self(&self) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::Revert)?;
        state.impersonating.remove(&std::thread::current().id());
        Ok(())
    }

    fn current_thread_token(&self) -> Result<Option<RawToken>, PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::OpenThreadToken)?;
        let Some(mut copy) = state
            .impersonating
            .get(&std::thread::current().id())
            .cloned()
        else {
            return Ok(None);
        };
        copy.primary = false;
        let raw = next_handle(&mut state);
        state.open.insert(raw, copy);
        Ok(Some(raw))
    }

    fn set_thread_token(&self, token: Option<RawToken>) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check(&state, FakeOp::SetThreadToken)?;
        let thread = std::thread::current().id();
        match token {
            Some(token) => {
                let record = state.open.get(&token).cloned().ok_or_else(invalid_handle)?;
                state.impersonating.insert(thread, record);
            }
            None => {
                state.impersonating.remove(&thread);
            }
        }
        Ok(())
    }
}
