//! Process-local unique id generation

use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh opaque id.
///
/// Combines a nanosecond timestamp with a process-local counter so ids minted
/// in a tight loop stay distinct even on coarse clocks.
#[must_use]
pub fn new_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{timestamp:024x}-{seq:08x}")
}
