//! Exponential backoff with jitter, per spec §4.4 "Retry schedule".
//!
//! Grounded on `manager::download::progress::ProgressCounters`'s role of
//! pure bookkeeping kept apart from the transport that drives it; the same
//! separation applies here between backoff arithmetic and `SyncPipeline`'s
//! dispatch loop.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Computes `next_retry_at = now + min(max_delay, base * backoff^retry_count) + jitter`.
pub fn next_retry_at(
    now: DateTime<Utc>,
    retry_count: u32,
    base_delay: Duration,
    backoff: f64,
    max_delay: Duration,
) -> DateTime<Utc> {
    let scaled = base_delay.as_secs_f64() * backoff.powi(retry_count as i32);
    let capped = scaled.min(max_delay.as_secs_f64()).max(0.0);

    let jitter_fraction = rand::rng().random_range(0.0..0.25);
    let jittered = capped * (1.0 + jitter_fraction);

    now + chrono::Duration::milliseconds((jittered * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_retry_count() {
        let now = Utc::now();
        let base = Duration::from_secs(10);
        let max = Duration::from_secs(120);

        let first = next_retry_at(now, 0, base, 2.0, max) - now;
        let second = next_retry_at(now, 1, base, 2.0, max) - now;
        let third = next_retry_at(now, 2, base, 2.0, max) - now;

        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let now = Utc::now();
        let base = Duration::from_secs(10);
        let max = Duration::from_secs(60);

        let far = next_retry_at(now, 20, base, 2.0, max) - now;
        // max plus at most 25% jitter
        assert!(far <= chrono::Duration::milliseconds((60_000.0 * 1.25) as i64));
    }

    #[test]
    fn jitter_never_produces_a_time_before_now() {
        let now = Utc::now();
        let at = next_retry_at(now, 0, Duration::from_secs(1), 2.0, Duration::from_secs(10));
        assert!(at >= now);
    }
}
