//! Core logic (platform-agnostic)
//!
//! CRITICAL: This module MUST NOT import platform-specific code. Every OS call
//! goes through the [`SecurityPlatform`] trait.

pub mod clock;
pub mod credential_cache;
pub mod credential_entry;
pub mod logon;
pub mod platform;
pub mod privilege;
pub mod privilege_set;
pub mod token;
pub mod token_privileges;

// In-memory platform fake (tests only)
#[cfg(test)]
pub mod mock_platform;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential_cache::{CacheConfig, CredentialCache};
pub use credential_entry::CredentialEntry;
pub use logon::LogonService;
pub use platform::{
    DesiredState, ImpersonationLevel, Luid, PrivilegeAction, RawToken, SecurityPlatform,
};
pub use privilege::{adjust_token_privileges, Privilege, PrivilegeState};
pub use privilege_set::{PrivilegeInfo, PrivilegeSet};
pub use token::{TokenHandle, TokenState};
pub use token_privileges::PrivilegeAttributes;
