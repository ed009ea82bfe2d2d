//! Platform-agnostic security API
//!
//! Every OS call made by the core goes through [`SecurityPlatform`]. The
//! Windows implementation lives in `src/platform/`; tests use an in-memory
//! fake. All methods are synchronous and blocking.

use crate::constants::{SE_PRIVILEGE_ENABLED, SE_PRIVILEGE_REMOVED};
use crate::models::LogonKind;
use crate::utils::PlatformError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw OS token handle value
///
/// Carries no ownership. Owned handles are wrapped in
/// [`TokenHandle`](super::TokenHandle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawToken(pub isize);

/// Locally unique identifier of a privilege type, stable for one boot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Luid {
    pub low: u32,
    pub high: i32,
}

impl Luid {
    pub fn new(low: u32, high: i32) -> Self {
        Luid { low, high }
    }
}

impl fmt::Display for Luid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{:08x}", self.high, self.low)
    }
}

/// Target state in a privilege adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DesiredState {
    Enable,
    Disable,
    Remove,
}

impl DesiredState {
    /// SE_PRIVILEGE_* attribute bits sent to the platform
    pub fn attributes(self) -> u32 {
        match self {
            DesiredState::Enable => SE_PRIVILEGE_ENABLED,
            DesiredState::Disable => 0,
            DesiredState::Remove => SE_PRIVILEGE_REMOVED,
        }
    }
}

/// One entry in a batched privilege adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrivilegeAction {
    pub luid: Luid,
    pub state: DesiredState,
}

impl PrivilegeAction {
    pub fn new(luid: Luid, state: DesiredState) -> Self {
        PrivilegeAction { luid, state }
    }
}

/// SECURITY_IMPERSONATION_LEVEL used when duplicating a token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpersonationLevel {
    Identification,
    Impersonation,
    Delegation,
}

/// OS security primitives consumed by the core
///
/// Implementations report failures as [`PlatformError`] with the Win32 code;
/// the core maps codes into [`SecurityError`](crate::utils::SecurityError).
pub trait SecurityPlatform: Send + Sync {
    /// LogonUser. `secret` is nul-terminated UTF-16 and must not be retained.
    fn logon_user(
        &self,
        user: &str,
        domain: Option<&str>,
        secret: &[u16],
        kind: LogonKind,
    ) -> Result<RawToken, PlatformError>;

    /// DuplicateTokenEx into a new impersonation token
    fn duplicate_token(
        &self,
        token: RawToken,
        level: ImpersonationLevel,
    ) -> Result<RawToken, PlatformError>;

    /// Token of the current process, opened for query and privilege adjustment
    fn open_process_token(&self) -> Result<RawToken, PlatformError>;

    fn close_handle(&self, token: RawToken) -> Result<(), PlatformError>;

    /// GetTokenInformation(TokenPrivileges)
    ///
    /// Writes the native TOKEN_PRIVILEGES layout into `buffer` and always sets
    /// `return_length` to the required size. A buffer that is too small fails
    /// with `ERROR_INSUFFICIENT_BUFFER`.
    fn token_privileges(
        &self,
        token: RawToken,
        buffer: &mut [u8],
        return_length: &mut u32,
    ) -> Result<(), PlatformError>;

    /// AdjustTokenPrivileges with every action applied in one call
    ///
    /// A call that leaves any action unassigned fails with
    /// `ERROR_NOT_ALL_ASSIGNED`.
    fn adjust_token_privileges(
        &self,
        token: RawToken,
        disable_all: bool,
        actions: &[PrivilegeAction],
    ) -> Result<(), PlatformError>;

    fn lookup_privilege_name(&self, luid: Luid) -> Result<String, PlatformError>;

    fn lookup_privilege_value(&self, name: &str) -> Result<Luid, PlatformError>;

    fn lookup_privilege_display_name(&self, name: &str) -> Result<String, PlatformError>;

    /// ImpersonateLoggedOnUser on the calling thread
    fn impersonate(&self, token: RawToken) -> Result<(), PlatformError>;

    /// RevertToSelf on the calling thread
    fn revert_to_self(&self) -> Result<(), PlatformError>;

    /// OpenThreadToken for the calling thread
    ///
    /// Returns a new handle the caller owns, or `None` when the thread is not
    /// impersonating.
    fn current_thread_token(&self) -> Result<Option<RawToken>, PlatformError>;

    /// SetThreadToken on the calling thread; `None` drops any impersonation
    fn set_thread_token(&self, token: Option<RawToken>) -> Result<(), PlatformError>;
}
