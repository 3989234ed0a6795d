//! Built-in [`Provider`](crate::traits::Provider)s for `ewwd`.

pub mod date;
pub mod timer;

use chrono::Timelike;
use std::time::Duration;

/// Time left until the next wall-clock minute boundary.
pub(crate) fn until_next_minute<T: Timelike>(now: &T) -> Duration {
    let elapsed = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    match Duration::from_secs(60).checked_sub(elapsed) {
        Some(d) if !d.is_zero() => d,
        _ => Duration::from_secs(60),
    }
}
