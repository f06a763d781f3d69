// =============================================================================
// scheduler.rs — ELIGIBILITY TRIAGE
// =============================================================================
//
// Decides which tracked cases are due for a fresh poll. Pure function:
// same cases + same `now` in, same subset out. No side effects, no
// ordering promises beyond determinism — the worker pool downstream does
// not care who goes first.
// =============================================================================

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::MonitoredCase;

/// Select the cases due for a check: never checked at all, or last checked
/// at least `recheck_interval` ago.
///
/// The boundary is inclusive — exactly 24h00m since the last check means
/// eligible. 23h59m means come back tomorrow.
pub fn eligible_cases(
    cases: Vec<MonitoredCase>,
    now: DateTime<Utc>,
    recheck_interval: Duration,
) -> Vec<MonitoredCase> {
    let interval = chrono::Duration::from_std(recheck_interval)
        .unwrap_or_else(|_| chrono::Duration::hours(24));

    cases
        .into_iter()
        .filter(|case| match case.last_checked_at {
            None => true,
            Some(checked_at) => now.signed_duration_since(checked_at) >= interval,
        })
        .collect()
}
