//! Per-user concurrent-stream quota ledger.
//!
//! Every admission decision goes through [`QuotaLedger::try_reserve`]; no
//! component reads or bumps active counts on its own. Reservation failure is
//! the expected at-capacity rejection path, not a fault.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

/// Per-user ledger entry.
#[derive(Debug, Clone, Copy)]
struct QuotaEntry {
    allowed: u32,
    active: u32,
}

/// Read-only view of one user's quota state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Max concurrent sessions for this user.
    pub allowed: u32,
    /// Sessions currently holding a reservation.
    pub active: u32,
}

/// Tracks, per user, how many concurrent sessions are active against an
/// allowed maximum, with atomic reserve/release.
///
/// Check-and-increment happens under one lock, so concurrent creates for the
/// same user can never over-admit. Users without an explicit ceiling get
/// `default_allowed`.
pub struct QuotaLedger {
    default_allowed: u32,
    entries: Mutex<HashMap<String, QuotaEntry>>,
}

impl QuotaLedger {
    /// Create a ledger with the given ceiling for users that have no
    /// explicit one.
    pub fn new(default_allowed: u32) -> Self {
        Self {
            default_allowed,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically reserve one slot for `user_id`.
    ///
    /// Returns false (with no side effect) when the user is at capacity.
    pub fn try_reserve(&self, user_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(user_id.to_string())
            .or_insert_with(|| QuotaEntry {
                allowed: self.default_allowed,
                active: 0,
            });

        if entry.active < entry.allowed {
            entry.active += 1;
            true
        } else {
            false
        }
    }

    /// Release one slot for `user_id`, floored at zero.
    ///
    /// Call sites must release exactly once per session; the floor only
    /// keeps a double-release bug from corrupting admission, it does not
    /// make one correct.
    pub fn release(&self, user_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(user_id) {
            Some(entry) if entry.active > 0 => entry.active -= 1,
            _ => {
                warn!(user_id, "quota release with no active reservation");
            }
        }
    }

    /// Update the per-user ceiling. Does not touch the active count: running
    /// sessions keep their reservations even when the ceiling drops below
    /// them.
    pub fn set_allowed(&self, user_id: &str, allowed: u32) {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(user_id.to_string())
            .and_modify(|e| e.allowed = allowed)
            .or_insert(QuotaEntry { allowed, active: 0 });
    }

    /// Seed the active count for `user_id` from persisted state.
    ///
    /// Startup recovery only; overwrites whatever count is present.
    pub fn restore_active(&self, user_id: &str, active: u32) {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(user_id.to_string())
            .and_modify(|e| e.active = active)
            .or_insert_with(|| QuotaEntry {
                allowed: self.default_allowed,
                active,
            });
    }

    /// Current usage for `user_id`.
    pub fn usage(&self, user_id: &str) -> QuotaUsage {
        let entries = self.entries.lock().unwrap();
        match entries.get(user_id) {
            Some(entry) => QuotaUsage {
                allowed: entry.allowed,
                active: entry.active,
            },
            None => QuotaUsage {
                allowed: self.default_allowed,
                active: 0,
            },
        }
    }
}
