//! # Crate-Wide Constants
//!
//! Platform error codes, privilege attribute bits, well-known privilege names
//! and cache defaults used throughout TokenKeeper.
//!
//! ## Usage
//!
//! ```rust
//! use tokenkeeper::constants::*;
//! use std::time::Duration;
//!
//! let sliding = Duration::from_secs(DEFAULT_SLIDING_EXPIRATION_SECS);
//! assert_eq!(SE_CHANGE_NOTIFY_NAME, "SeChangeNotifyPrivilege");
//! ```

// ============================================================================
// Win32 Error Codes
// ============================================================================
//
// Values match winerror.h. They are defined here rather than taken from the
// `windows` crate so the platform-agnostic core can match on them.

pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
pub const ERROR_INVALID_DATA: u32 = 13;
pub const ERROR_OUTOFMEMORY: u32 = 14;
pub const ERROR_BAD_NETPATH: u32 = 53;
pub const ERROR_BAD_NET_NAME: u32 = 67;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_NO_TOKEN: u32 = 1008;
pub const ERROR_NOT_ALL_ASSIGNED: u32 = 1300;
pub const ERROR_NONE_MAPPED: u32 = 1332;
pub const ERROR_NO_SUCH_PRIVILEGE: u32 = 1313;
pub const ERROR_PRIVILEGE_NOT_HELD: u32 = 1314;
pub const ERROR_LOGON_FAILURE: u32 = 1326;
pub const ERROR_NO_SYSTEM_RESOURCES: u32 = 1450;
pub const ERROR_COMMITMENT_LIMIT: u32 = 1455;

// ============================================================================
// Token Privilege Attributes
// ============================================================================

/// Privilege is enabled by default on the token
pub const SE_PRIVILEGE_ENABLED_BY_DEFAULT: u32 = 0x0000_0001;

/// Privilege is currently enabled
pub const SE_PRIVILEGE_ENABLED: u32 = 0x0000_0002;

/// Privilege is (or is to be) removed from the token
pub const SE_PRIVILEGE_REMOVED: u32 = 0x0000_0004;

/// Privilege was used to gain access to an object or service
pub const SE_PRIVILEGE_USED_FOR_ACCESS: u32 = 0x8000_0000;

// ============================================================================
// Well-Known Privilege Names
// ============================================================================

/// Bypass traverse checking. Never removed by
/// [`PrivilegeSet::reduce_privileges_to_minimum`](crate::core::PrivilegeSet::reduce_privileges_to_minimum).
pub const SE_CHANGE_NOTIFY_NAME: &str = "SeChangeNotifyPrivilege";

pub const SE_BACKUP_NAME: &str = "SeBackupPrivilege";
pub const SE_RESTORE_NAME: &str = "SeRestorePrivilege";
pub const SE_DEBUG_NAME: &str = "SeDebugPrivilege";
pub const SE_SHUTDOWN_NAME: &str = "SeShutdownPrivilege";
pub const SE_SECURITY_NAME: &str = "SeSecurityPrivilege";
pub const SE_TAKE_OWNERSHIP_NAME: &str = "SeTakeOwnershipPrivilege";
pub const SE_IMPERSONATE_NAME: &str = "SeImpersonatePrivilege";
pub const SE_INCREASE_QUOTA_NAME: &str = "SeIncreaseQuotaPrivilege";
pub const SE_TIME_ZONE_NAME: &str = "SeTimeZonePrivilege";
pub const SE_UNDOCK_NAME: &str = "SeUndockPrivilege";

// ============================================================================
// Credential Cache Defaults
// ============================================================================

/// Default sliding expiration (seconds since last access)
pub const DEFAULT_SLIDING_EXPIRATION_SECS: u64 = 30 * 60;

/// Default absolute expiration (seconds since the entry was added)
pub const DEFAULT_ABSOLUTE_EXPIRATION_SECS: u64 = 8 * 60 * 60;

/// Environment override for the sliding expiration, `0` disables it
pub const ENV_CACHE_SLIDING_SECS: &str = "TK_CACHE_SLIDING_SECS";

/// Environment override for the absolute expiration, `0` disables it
pub const ENV_CACHE_ABSOLUTE_SECS: &str = "TK_CACHE_ABSOLUTE_SECS";

// ============================================================================
// Security / Validation
// ============================================================================

/// Maximum user name length (UNLEN in lmcons.h)
pub const MAX_USERNAME_LENGTH: usize = 256;

/// Maximum NetBIOS/DNS domain name length accepted for logon
pub const MAX_DOMAIN_LENGTH: usize = 255;
