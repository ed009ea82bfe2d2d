//! Mutex helpers

use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked
///
/// Every mutex in this crate protects state that stays consistent across a
/// panic (maps of owned entries, timestamps, secret buffers), so the inner
/// value is always safe to reuse.
pub fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|p| {
        crate::logger::log_warn(&format!(
            "Recovered from poisoned mutex '{}' - previous thread panicked",
            name
        ));
        p.into_inner()
    })
}
