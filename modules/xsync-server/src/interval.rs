// Adaptive refresh interval: the adapter proposes, the platform bounds decide.

use std::time::Duration;

use chrono::{DateTime, Utc};

use xsync_common::Platform;

/// Clamp `proposed` into the platform's refresh bounds. No proposal (fewer
/// than two entries in the batch) means the slowest allowed refresh.
pub fn clamp_interval(proposed: Option<Duration>, platform: &Platform) -> Duration {
    match proposed {
        Some(d) => d.clamp(platform.min_refresh_gap, platform.max_refresh_gap),
        None => platform.max_refresh_gap,
    }
}

/// Next scheduled fetch, counted from the batch's acceptance time.
pub fn next_update(accepted_at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
    accepted_at
        .checked_add_signed(step)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
