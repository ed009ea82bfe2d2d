//! # Utilities Module
//!
//! Cross-cutting concerns shared by `core` and `platform`.
//!
//! ## Modules
//!
//! - [`errors`]: Typed error hierarchy using `thiserror`
//! - [`fatal`]: Fatal/recoverable classification for errors that would otherwise be swallowed
//! - [`sync`]: Poison-recovering mutex locking
//!
//! ## Design Notes
//!
//! Error types are defined here to avoid circular dependencies between the
//! `core` and `platform` modules. Platform wrappers return [`PlatformError`];
//! the core translates it into [`SecurityError`] at the call site and never
//! reinterprets the code afterwards.

pub mod errors;
pub mod fatal;
pub mod sync;

pub use errors::{PlatformError, SecurityError};
pub use fatal::{is_fatal, log_unless_fatal, FailureClass};
