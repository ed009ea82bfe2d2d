//! Logon identity value types
//!
//! SECURITY: none of these types carry secret material. Secrets live only in
//! [`SecretBuffer`](super::SecretBuffer).

use crate::constants::{MAX_DOMAIN_LENGTH, MAX_USERNAME_LENGTH};
use crate::utils::SecurityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Windows account name without its domain part
///
/// UPN names (`user@domain.com`) are kept whole; LogonUser expects them with
/// a null domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Create a new username after validation
    pub fn new(username: impl Into<String>) -> Result<Self, SecurityError> {
        let username = username.into();

        if username.trim().is_empty() {
            return Err(SecurityError::InvalidCredential(
                "Username cannot be empty".to_string(),
            ));
        }

        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(SecurityError::InvalidCredential(format!(
                "Username exceeds maximum length ({})",
                MAX_USERNAME_LENGTH
            )));
        }

        if username.contains('\0') {
            return Err(SecurityError::InvalidCredential(
                "Username contains a nul character".to_string(),
            ));
        }

        Ok(Username(username))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_upn(&self) -> bool {
        self.0.contains('@')
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Username {
    type Error = SecurityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Username::new(value)
    }
}

/// Account name plus optional domain, as passed to LogonUser
///
/// Accepted input forms:
/// - `user` (no domain, resolved by the platform)
/// - `.\\user` (local machine account)
/// - `DOMAIN\\user`
/// - `user@domain.com` (UPN, domain left empty)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualifiedName {
    user: Username,
    domain: Option<String>,
}

impl QualifiedName {
    pub fn new(user: Username, domain: Option<&str>) -> Result<Self, SecurityError> {
        let domain = match domain.map(str::trim) {
            None | Some("") => None,
            Some(d) if d.chars().count() > MAX_DOMAIN_LENGTH => {
                return Err(SecurityError::InvalidCredential(format!(
                    "Domain exceeds maximum length ({})",
                    MAX_DOMAIN_LENGTH
                )))
            }
            Some(d) => Some(d.to_string()),
        };
        Ok(QualifiedName { user, domain })
    }

    /// Split `DOMAIN\user` style input into its parts
    pub fn parse(input: &str) -> Result<Self, SecurityError> {
        match input.split_once('\\') {
            Some((domain, user)) => {
                if domain.is_empty() {
                    return Err(SecurityError::InvalidCredential(
                        "Domain part before '\\' is empty".to_string(),
                    ));
                }
                QualifiedName::new(Username::new(user)?, Some(domain))
            }
            None => QualifiedName::new(Username::new(input)?, None),
        }
    }

    pub fn user(&self) -> &Username {
        &self.user
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_account(self.user.as_str(), self.domain.as_deref()))
    }
}

/// Render `DOMAIN\user`, or just `user` when the domain is absent or blank
pub fn display_account(user: &str, domain: Option<&str>) -> String {
    match domain.map(str::trim) {
        Some(d) if !d.is_empty() => format!("{}\\{}", d, user),
        _ => user.to_string(),
    }
}

/// LogonUser logon type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogonKind {
    Interactive,
    Network,
    Batch,
    Service,
    Unlock,
    NetworkCleartext,
    NewCredentials,
}

impl LogonKind {
    /// LOGON32_LOGON_* value
    pub fn as_raw(self) -> u32 {
        match self {
            LogonKind::Interactive => 2,
            LogonKind::Network => 3,
            LogonKind::Batch => 4,
            LogonKind::Service => 5,
            LogonKind::Unlock => 7,
            LogonKind::NetworkCleartext => 8,
            LogonKind::NewCredentials => 9,
        }
    }
}

impl fmt::Display for LogonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogonKind::Interactive => "interactive",
            LogonKind::Network => "network",
            LogonKind::Batch => "batch",
            LogonKind::Service => "service",
            LogonKind::Unlock => "unlock",
            LogonKind::NetworkCleartext => "network-cleartext",
            LogonKind::NewCredentials => "new-credentials",
        };
        f.write_str(name)
    }
}
