//! Reconnect backoff scheduling.
//!
//! The scheduler is a pure function with no state of its own. It only
//! computes delays; bounding the total number of attempts is the channel
//! connection's job.

use std::time::Duration;

/// Computes the delay to apply before the given reconnect attempt.
///
/// `attempt` is 1-based: the first retry waits `base` and every following
/// retry doubles the previous delay. Values below 1 are treated as the
/// first attempt. The result saturates instead of overflowing and is not
/// capped here.
pub fn reconnect_delay(attempt: u32, base: Duration) -> Duration {
    let doublings = attempt.saturating_sub(1);
    match 2u32.checked_pow(doublings) {
        Some(factor) => base.saturating_mul(factor),
        None => Duration::MAX,
    }
}
