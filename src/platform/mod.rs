//! Platform-specific implementations
//!
//! All unsafe Windows API code is isolated here.

pub mod win32;

pub use win32::Win32Platform;
