//! # Domain Models
//!
//! Value types for logon identities and the secret buffer that carries their
//! passwords.
//!
//! ## Security Design
//!
//! [`SecretBuffer`] provides the memory contract for secrets:
//! - Characters are zero-filled on dispose and on drop
//! - Never exposed in `Debug` or `Display` implementations
//! - The only read path is a transient marshaled copy that is itself
//!   zero-filled when the single platform call using it returns or unwinds

pub mod credentials;
pub mod secret;

pub use credentials::{display_account, LogonKind, QualifiedName, Username};
pub use secret::SecretBuffer;
