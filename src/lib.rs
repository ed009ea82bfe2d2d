//! TokenKeeper - logon credential caching, token privileges and impersonation
//!
//! Core library exposing platform-agnostic types and traits.

// Public modules
pub mod constants;
pub mod core;
pub mod logger;
pub mod models;
pub mod utils;

// Platform-specific modules
#[cfg(windows)]
pub mod platform;

// Re-export commonly used types
pub use crate::core::{
    CacheConfig, Clock, CredentialCache, CredentialEntry, LogonService, Privilege, PrivilegeSet,
    PrivilegeState, SecurityPlatform, SystemClock, TokenHandle,
};
pub use crate::models::{LogonKind, QualifiedName, SecretBuffer, Username};
pub use crate::utils::{PlatformError, SecurityError};
