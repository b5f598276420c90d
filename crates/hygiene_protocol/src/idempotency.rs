//! Replay/idempotency helpers.
//!
//! The executor's idempotency key is always `job_id` — a task is bound to at
//! most one job, and redelivery of an identical task must not re-run
//! completed work. The one piece of temporal judgement needed is whether a
//! `RUNNING` job is still actively held by another worker ("recent activity
//! within a configurable lease interval") or whether it's abandoned and safe
//! to resume.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Returns `true` if `last_activity` is recent enough that another worker is
/// presumed to still hold the job's lease.
pub fn lease_is_held(last_activity: DateTime<Utc>, lease_interval: Duration, now: DateTime<Utc>) -> bool {
    let elapsed = now.signed_duration_since(last_activity);
    match chrono::Duration::from_std(lease_interval) {
        Ok(lease) => elapsed < lease,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_activity_holds_the_lease() {
        let now = Utc::now();
        assert!(lease_is_held(now, Duration::from_secs(120), now));
    }

    #[test]
    fn stale_activity_releases_the_lease() {
        let now = Utc::now();
        let stale = now - chrono::Duration::seconds(300);
        assert!(!lease_is_held(stale, Duration::from_secs(120), now));
    }
}
