//! Stop flag shared by the Ctrl-C handler and the apply loop.
//!
//! A migration is never cut mid-step: `MigrationOrchestrator` polls
//! [`is_requested`] before each step and, once set, rolls back the executed
//! prefix. Relaxed ordering is enough for a flag that only goes false -> true.

use std::sync::atomic::{AtomicBool, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);

/// Ask the running migration to stop after its current step.
///
/// Returns `true` for the first request and `false` if one was already pending,
/// so a handler can escalate on a repeated interrupt. Signal-safe.
#[inline]
pub fn request() -> bool {
    !STOP.swap(true, Ordering::Relaxed)
}

#[inline]
pub fn is_requested() -> bool {
    STOP.load(Ordering::Relaxed)
}

/// Clear a pending request so the next `Apply` in this process starts clean.
#[inline]
pub fn reset() {
    STOP.store(false, Ordering::Relaxed);
}
