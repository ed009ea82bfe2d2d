//! Logon, impersonation and impersonated filesystem probes
//!
//! SECURITY: secrets reach the platform only as a [`MarshaledSecret`], which is
//! zero-filled when it leaves scope on every path, including unwinding.

use super::platform::{ImpersonationLevel, SecurityPlatform};
use super::token::TokenHandle;
use crate::constants::{ERROR_BAD_NETPATH, ERROR_BAD_NET_NAME};
use crate::models::secret::MarshaledSecret;
use crate::models::{LogonKind, QualifiedName, SecretBuffer, Username};
use crate::utils::{log_unless_fatal, SecurityError};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Produces impersonation-level tokens and runs code under them
pub struct LogonService {
    platform: Arc<dyn SecurityPlatform>,
}

impl LogonService {
    pub fn new(platform: Arc<dyn SecurityPlatform>) -> Self {
        LogonService { platform }
    }

    /// Service backed by the Win32 security API
    #[cfg(windows)]
    pub fn windows() -> Self {
        Self::new(Arc::new(crate::platform::Win32Platform::new()))
    }

    pub fn platform(&self) -> &Arc<dyn SecurityPlatform> {
        &self.platform
    }

    /// Log on with a plain-text secret
    ///
    /// # Arguments
    /// * `user` - Account name; with `domain` absent, `DOMAIN\user` is split here
    /// * `domain` - Domain or `.` for the local machine
    /// * `secret` - Password; copied into a wiped buffer for the platform call
    /// * `kind` - Logon type passed to the platform
    pub fn logon(
        &self,
        user: &str,
        domain: Option<&str>,
        secret: &str,
        kind: LogonKind,
    ) -> Result<TokenHandle, SecurityError> {
        let name = resolve_name(user, domain)?;
        let marshaled = MarshaledSecret::from_plain(secret);
        self.logon_marshaled(&name, &marshaled, kind)
    }

    /// Log on with a secret held in a [`SecretBuffer`]
    ///
    /// The buffer itself is left intact; only the transient copy is wiped.
    pub fn logon_secure(
        &self,
        user: &str,
        domain: Option<&str>,
        secret: &SecretBuffer,
        kind: LogonKind,
    ) -> Result<TokenHandle, SecurityError> {
        let name = resolve_name(user, domain)?;
        let marshaled = secret.marshal()?;
        self.logon_marshaled(&name, &marshaled, kind)
    }

    fn logon_marshaled(
        &self,
        name: &QualifiedName,
        secret: &MarshaledSecret,
        kind: LogonKind,
    ) -> Result<TokenHandle, SecurityError> {
        let account = name.to_string();
        let raw = self
            .platform
            .logon_user(name.user().as_str(), name.domain(), secret.as_wide(), kind)
            .map_err(|source| {
                crate::logger::log_warn(&format!(
                    "Logon failed for '{}' ({}): {}",
                    account, kind, source
                ));
                SecurityError::Logon {
                    user: account.clone(),
                    source,
                }
            })?;

        // The primary handle from LogonUser misbehaves when used directly for
        // access checks; always hand out an impersonation-level duplicate.
        let primitive = TokenHandle::from_raw(Arc::clone(&self.platform), raw);
        let duplicated = primitive.duplicate(ImpersonationLevel::Impersonation);
        if let Err(e) = primitive.dispose() {
            log_unless_fatal("Closing primary logon token", e)?;
        }

        let token = duplicated.map_err(|e| {
            crate::logger::log_warn(&format!(
                "Token duplication failed for '{}': {}",
                account, e
            ));
            e
        })?;
        crate::logger::log_info(&format!("Logon succeeded for '{}' ({})", account, kind));
        Ok(token)
    }

    /// Token of the running process, opened for query and adjust
    pub fn current_process_token(&self) -> Result<TokenHandle, SecurityError> {
        let raw = self
            .platform
            .open_process_token()
            .map_err(|e| SecurityError::platform("OpenProcessToken", e))?;
        Ok(TokenHandle::from_raw(Arc::clone(&self.platform), raw))
    }

    /// Run `action` on the calling thread under `token`'s identity
    ///
    /// The identity the thread had before the call is restored when `action`
    /// returns and when it panics: the enclosing impersonation when calls are
    /// nested, otherwise the process identity. A failure to restore after a
    /// normal return is reported as an error and the action's result is
    /// discarded.
    pub fn impersonate<R>(
        &self,
        token: &TokenHandle,
        action: impl FnOnce() -> R,
    ) -> Result<R, SecurityError> {
        let raw = token.raw()?;
        let prior = self
            .platform
            .current_thread_token()
            .map_err(|e| SecurityError::platform("OpenThreadToken", e))?
            .map(|prior| TokenHandle::from_raw(Arc::clone(&self.platform), prior));
        self.platform
            .impersonate(raw)
            .map_err(|e| SecurityError::platform("ImpersonateLoggedOnUser", e))?;

        let guard = RevertGuard {
            platform: self.platform.as_ref(),
            prior,
            armed: true,
        };
        let result = action();
        guard.revert()?;
        Ok(result)
    }

    /// Whether `token`'s identity can list `dir`
    ///
    /// Access denied is `Ok(false)`. Any other failure, including a missing
    /// directory, is an error.
    pub fn check_user_access_to_dir(
        &self,
        token: &TokenHandle,
        dir: &Path,
    ) -> Result<bool, SecurityError> {
        self.impersonate(token, || match std::fs::read_dir(dir) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(false),
            Err(source) => Err(SecurityError::Io {
                path: dir.to_path_buf(),
                source,
            }),
        })?
    }

    /// Whether the share (or any directory) at `path` is visible to `token`'s identity
    ///
    /// Missing paths, unreachable network names and access denied are all
    /// `Ok(false)`.
    pub fn does_share_exist(&self, token: &TokenHandle, path: &Path) -> Result<bool, SecurityError> {
        self.impersonate(token, || match std::fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if share_missing(&e) => Ok(false),
            Err(source) => Err(SecurityError::Io {
                path: path.to_path_buf(),
                source,
            }),
        })?
    }
}

impl std::fmt::Debug for LogonService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogonService").finish_non_exhaustive()
    }
}

fn share_missing(e: &std::io::Error) -> bool {
    match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => true,
        _ => matches!(
            e.raw_os_error().map(|c| c as u32),
            Some(ERROR_BAD_NETPATH | ERROR_BAD_NET_NAME)
        ),
    }
}

fn resolve_name(user: &str, domain: Option<&str>) -> Result<QualifiedName, SecurityError> {
    match domain {
        Some(domain) => QualifiedName::new(Username::new(user)?, Some(domain)),
        None => QualifiedName::parse(user),
    }
}

/// Puts the thread's previous identity back when dropped
///
/// `prior` is the thread token saved before impersonating; it is closed when
/// the guard goes away.
struct RevertGuard<'a> {
    platform: &'a dyn SecurityPlatform,
    prior: Option<TokenHandle>,
    armed: bool,
}

impl RevertGuard<'_> {
    fn revert(mut self) -> Result<(), SecurityError> {
        self.armed = false;
        self.restore()
    }

    fn restore(&self) -> Result<(), SecurityError> {
        match &self.prior {
            Some(prior) => self
                .platform
                .set_thread_token(Some(prior.raw()?))
                .map_err(|e| SecurityError::platform("SetThreadToken", e)),
            None => self
                .platform
                .revert_to_self()
                .map_err(|e| SecurityError::platform("RevertToSelf", e)),
        }
    }
}

impl Drop for RevertGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.restore() {
            crate::logger::log_error(&format!(
                "Restoring thread identity failed while unwinding: {}",
                e
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock_platform::{FakeOp, FakePlatform};
    use crate::core::token::TokenState;
    use crate::models::secret::wipe_probe;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn service() -> (Arc<FakePlatform>, LogonService) {
        let fake = Arc::new(FakePlatform::new());
        fake.add_user("bob", "pa55word");
        let platform: Arc<dyn SecurityPlatform> = fake.clone();
        (fake, LogonService::new(platform))
    }

    #[test]
    fn test_logon_returns_impersonation_duplicate() {
        let (fake, service) = service();
        let token = service
            .logon("bob", Some("CORP"), "pa55word", LogonKind::Interactive)
            .unwrap();

        let raw = token.raw().unwrap();
        assert_eq!(fake.is_primary(raw), Some(false));
        assert_eq!(fake.token_user(raw).as_deref(), Some("CORP\\bob"));
        // Only the duplicate is left open
        assert_eq!(fake.open_handle_count(), 1);
    }

    #[test]
    fn test_logon_splits_domain_from_user() {
        let (fake, service) = service();
        let token = service
            .logon("CORP\\bob", None, "pa55word", LogonKind::Network)
            .unwrap();
        let raw = token.raw().unwrap();
        assert_eq!(fake.token_user(raw).as_deref(), Some("CORP\\bob"));
    }

    #[test]
    fn test_logon_failure_is_typed() {
        let (fake, service) = service();
        let err = service
            .logon("bob", None, "wrong", LogonKind::Interactive)
            .unwrap_err();
        match err {
            SecurityError::Logon { user, source } => {
                assert_eq!(user, "bob");
                assert_eq!(source.code, crate::constants::ERROR_LOGON_FAILURE);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fake.open_handle_count(), 0);
    }

    #[test]
    fn test_invalid_user_never_reaches_platform() {
        let (fake, service) = service();
        assert!(matches!(
            service.logon("  ", None, "pa55word", LogonKind::Interactive),
            Err(SecurityError::InvalidCredential(_))
        ));
        assert_eq!(fake.logon_calls(), 0);
    }

    #[test]
    fn test_duplicate_failure_still_closes_primitive() {
        let (fake, service) = service();
        fake.fail(FakeOp::Duplicate, 8);

        let err = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap_err();
        assert_eq!(err.code(), Some(8));
        assert_eq!(fake.open_handle_count(), 0);
    }

    #[test]
    fn test_recoverable_close_failure_is_not_fatal_to_logon() {
        let (fake, service) = service();
        fake.fail(FakeOp::Close, 6);
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();
        fake.clear_failure(FakeOp::Close);
        assert_eq!(token.state(), TokenState::Acquired);
    }

    #[test]
    fn test_fatal_close_failure_propagates() {
        let (fake, service) = service();
        fake.fail(FakeOp::Close, crate::constants::ERROR_NO_SYSTEM_RESOURCES);
        let err = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap_err();
        assert!(crate::utils::is_fatal(&err));
        fake.clear_failure(FakeOp::Close);
    }

    #[test]
    fn test_marshaled_secret_wiped_on_every_path() {
        let (fake, service) = service();
        let secret = SecretBuffer::new("pa55word");

        let before = wipe_probe::count();
        service
            .logon_secure("bob", None, &secret, LogonKind::Interactive)
            .unwrap();
        assert_eq!(wipe_probe::count(), before + 1);

        fake.fail(FakeOp::Logon, 1326);
        assert!(service
            .logon_secure("bob", None, &secret, LogonKind::Interactive)
            .is_err());
        assert_eq!(wipe_probe::count(), before + 2);

        // The caller's buffer is untouched
        assert!(!secret.is_disposed());
        assert_eq!(secret.len(), 8);
    }

    #[test]
    fn test_logon_secure_rejects_disposed_buffer() {
        let (fake, service) = service();
        let mut secret = SecretBuffer::new("pa55word");
        secret.dispose();
        assert!(matches!(
            service.logon_secure("bob", None, &secret, LogonKind::Interactive),
            Err(SecurityError::Disposed("SecretBuffer"))
        ));
        assert_eq!(fake.logon_calls(), 0);
    }

    #[test]
    fn test_current_process_token() {
        let (fake, service) = service();
        let token = service.current_process_token().unwrap();
        assert_eq!(fake.token_user(token.raw().unwrap()).as_deref(), Some("process"));

        fake.fail(FakeOp::OpenProcessToken, 5);
        assert_eq!(service.current_process_token().unwrap_err().code(), Some(5));
    }

    #[test]
    fn test_impersonation_restored_after_return() {
        let (fake, service) = service();
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();
        let raw = token.raw().unwrap();

        assert_eq!(fake.current_identity(), None);
        let inside = service.impersonate(&token, || fake.current_identity()).unwrap();
        assert_eq!(inside, fake.token_user(raw));
        assert_eq!(fake.current_identity(), None);

        // An action that fails by value is still a normal return
        let result: Result<(), &str> = service
            .impersonate(&token, || Err("action failed"))
            .unwrap();
        assert!(result.is_err());
        assert_eq!(fake.current_identity(), None);
    }

    #[test]
    fn test_impersonation_restored_after_panic() {
        let (fake, service) = service();
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            service.impersonate(&token, || -> () {
                assert!(fake.current_identity().is_some());
                panic!("action blew up");
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(fake.current_identity(), None);
    }

    #[test]
    fn test_nested_impersonation_restores_outer_identity() {
        let (fake, service) = service();
        fake.add_user("alice", "s3cret");
        let bob = service
            .logon("bob", Some("CORP"), "pa55word", LogonKind::Interactive)
            .unwrap();
        let alice = service
            .logon("alice", Some("CORP"), "s3cret", LogonKind::Interactive)
            .unwrap();

        let (inner, outer_after) = service
            .impersonate(&bob, || {
                let inner = service
                    .impersonate(&alice, || fake.current_identity())
                    .unwrap();
                (inner, fake.current_identity())
            })
            .unwrap();
        assert_eq!(inner.as_deref(), Some("CORP\\alice"));
        assert_eq!(outer_after.as_deref(), Some("CORP\\bob"));
        assert_eq!(fake.current_identity(), None);

        // The saved thread token is closed once restored
        assert_eq!(fake.open_handle_count(), 2);
    }

    #[test]
    fn test_nested_impersonation_restores_outer_identity_after_panic() {
        let (fake, service) = service();
        fake.add_user("alice", "s3cret");
        let bob = service
            .logon("bob", Some("CORP"), "pa55word", LogonKind::Interactive)
            .unwrap();
        let alice = service
            .logon("alice", Some("CORP"), "s3cret", LogonKind::Interactive)
            .unwrap();

        let outer_after = service
            .impersonate(&bob, || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    service.impersonate(&alice, || -> () { panic!("inner action blew up") })
                }));
                assert!(outcome.is_err());
                fake.current_identity()
            })
            .unwrap();
        assert_eq!(outer_after.as_deref(), Some("CORP\\bob"));
        assert_eq!(fake.current_identity(), None);
        assert_eq!(fake.open_handle_count(), 2);
    }

    #[test]
    fn test_directory_checks_inside_impersonation_keep_outer_identity() {
        let (fake, service) = service();
        let bob = service
            .logon("bob", Some("CORP"), "pa55word", LogonKind::Interactive)
            .unwrap();
        let dir = std::env::temp_dir();

        let after = service
            .impersonate(&bob, || {
                assert!(service.check_user_access_to_dir(&bob, &dir).unwrap());
                assert!(service.does_share_exist(&bob, &dir).unwrap());
                fake.current_identity()
            })
            .unwrap();
        assert_eq!(after.as_deref(), Some("CORP\\bob"));
        assert_eq!(fake.current_identity(), None);
    }

    #[test]
    fn test_thread_token_failures() {
        let (fake, service) = service();
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();

        fake.fail(FakeOp::OpenThreadToken, 5);
        let mut ran = false;
        let err = service.impersonate(&token, || ran = true).unwrap_err();
        assert!(err.to_string().contains("OpenThreadToken"));
        assert!(!ran);
        fake.clear_failure(FakeOp::OpenThreadToken);

        // Restoring an enclosing identity goes through SetThreadToken
        let err = service
            .impersonate(&token, || {
                fake.fail(FakeOp::SetThreadToken, 6);
                let inner = service.impersonate(&token, || ());
                fake.clear_failure(FakeOp::SetThreadToken);
                inner
            })
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("SetThreadToken"));
        assert_eq!(fake.current_identity(), None);
        assert_eq!(fake.open_handle_count(), 1);
    }

    #[test]
    fn test_impersonation_failures() {
        let (fake, service) = service();
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();

        fake.fail(FakeOp::Impersonate, 5);
        let mut ran = false;
        assert!(service.impersonate(&token, || ran = true).is_err());
        assert!(!ran);
        fake.clear_failure(FakeOp::Impersonate);

        fake.fail(FakeOp::Revert, 6);
        let err = service.impersonate(&token, || ()).unwrap_err();
        assert!(err.to_string().contains("RevertToSelf"));
        fake.clear_failure(FakeOp::Revert);

        token.dispose().unwrap();
        assert!(matches!(
            service.impersonate(&token, || ()),
            Err(SecurityError::Disposed(_))
        ));
    }

    #[test]
    fn test_directory_probes() {
        let (fake, service) = service();
        let token = service
            .logon("bob", None, "pa55word", LogonKind::Interactive)
            .unwrap();
        let dir = std::env::temp_dir();
        let missing = dir.join(format!("tokenkeeper-missing-{}", std::process::id()));

        assert!(service.check_user_access_to_dir(&token, &dir).unwrap());
        assert!(matches!(
            service.check_user_access_to_dir(&token, &missing),
            Err(SecurityError::Io { .. })
        ));

        assert!(service.does_share_exist(&token, &dir).unwrap());
        assert!(!service.does_share_exist(&token, &missing).unwrap());
        assert_eq!(fake.current_identity(), None);
    }
}
