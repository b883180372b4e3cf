//! ErrorRecovery: per-kind retry counters, timers, and fallback decisions.
//!
//! Grounded on the teacher's flat error-kind enum
//! (`manager::error::ManagerError`) and its retry/backoff vocabulary from
//! `prefetch::adaptive`, restructured here with one counter set per
//! `ErrorKind` as spec §4.7 requires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// Action recommended by `ErrorRecovery` for a given error occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Ignore,
    Retry,
    Restart,
    Stop,
    RequestUserAction,
    FallbackLowPower,
    Propagate,
}

/// Policy configuration for `ErrorRecovery`.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub max_retry_delay: Duration,
    pub auto_retry_types: Vec<ErrorKind>,
    pub ignore_types: Vec<ErrorKind>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            retry_backoff: 2.0,
            max_retry_delay: Duration::from_secs(120),
            auto_retry_types: vec![
                ErrorKind::LocationTimeout,
                ErrorKind::NetworkError,
                ErrorKind::ServiceDisconnected,
            ],
            ignore_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct KindState {
    retry_count: u32,
    first_occurrence: Instant,
    retry_timer_due: Option<Instant>,
}

/// Tracks retry state per `ErrorKind` and decides what the coordinator
/// should do about each new occurrence.
#[derive(Debug)]
pub struct ErrorRecovery {
    policy: RecoveryPolicy,
    state: HashMap<ErrorKind, KindState>,
}

impl ErrorRecovery {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            state: HashMap::new(),
        }
    }

    /// Record a new occurrence of `kind` and decide the recovery action.
    pub fn record(&mut self, kind: ErrorKind) -> RecoveryAction {
        if self.policy.ignore_types.contains(&kind) {
            return RecoveryAction::Ignore;
        }

        if kind.is_structural() {
            // Structural errors never mutate recovery state; they propagate
            // synchronously from the caller (spec §7).
            return RecoveryAction::Propagate;
        }

        if kind.is_user_actionable() {
            self.state.remove(&kind);
            return RecoveryAction::RequestUserAction;
        }

        if kind.is_soft() {
            return RecoveryAction::Ignore;
        }

        // Transient / platform kinds: track counters.
        let auto_retry = self.policy.auto_retry_types.contains(&kind);
        let now = Instant::now();
        let entry = self.state.entry(kind).or_insert_with(|| KindState {
            retry_count: 0,
            first_occurrence: now,
            retry_timer_due: None,
        });

        entry.retry_count += 1;

        if !auto_retry {
            return RecoveryAction::Propagate;
        }

        if entry.retry_count > self.policy.max_retries {
            return RecoveryAction::FallbackLowPower;
        }

        let retry_count = entry.retry_count;
        let delay = self.backoff_delay(retry_count);
        let entry = self.state.get_mut(&kind).expect("entry inserted above");
        entry.retry_timer_due = Some(now + delay);
        RecoveryAction::Retry
    }

    /// Backoff delay for the given 1-indexed retry attempt, capped at
    /// `max_retry_delay` (same shape as the sync pipeline's retry formula).
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let secs = self.policy.retry_delay.as_secs_f64()
            * self.policy.retry_backoff.powi(retry_count as i32 - 1);
        Duration::from_secs_f64(secs).min(self.policy.max_retry_delay)
    }

    /// Clear counters for `kind` once the underlying condition resolves.
    pub fn clear(&mut self, kind: ErrorKind) {
        self.state.remove(&kind);
    }

    pub fn retry_count(&self, kind: ErrorKind) -> u32 {
        self.state.get(&kind).map(|s| s.retry_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_actionable_requests_user_action_and_never_retries() {
        let mut recovery = ErrorRecovery::new(RecoveryPolicy::default());
        assert_eq!(
            recovery.record(ErrorKind::PermissionDenied),
            RecoveryAction::RequestUserAction
        );
        assert_eq!(recovery.retry_count(ErrorKind::PermissionDenied), 0);
    }

    #[test]
    fn structural_errors_propagate_without_state() {
        let mut recovery = ErrorRecovery::new(RecoveryPolicy::default());
        assert_eq!(
            recovery.record(ErrorKind::ConfigError),
            RecoveryAction::Propagate
        );
    }

    #[test]
    fn transient_retries_until_exhaustion_then_falls_back() {
        let policy = RecoveryPolicy {
            max_retries: 2,
            ..RecoveryPolicy::default()
        };
        let mut recovery = ErrorRecovery::new(policy);
        assert_eq!(
            recovery.record(ErrorKind::NetworkError),
            RecoveryAction::Retry
        );
        assert_eq!(
            recovery.record(ErrorKind::NetworkError),
            RecoveryAction::Retry
        );
        assert_eq!(
            recovery.record(ErrorKind::NetworkError),
            RecoveryAction::FallbackLowPower
        );
    }

    #[test]
    fn soft_errors_are_ignored_by_recovery_counters() {
        let mut recovery = ErrorRecovery::new(RecoveryPolicy::default());
        assert_eq!(recovery.record(ErrorKind::TripError), RecoveryAction::Ignore);
        assert_eq!(recovery.retry_count(ErrorKind::TripError), 0);
    }

    #[test]
    fn backoff_delay_grows_exponentially_and_caps() {
        let recovery = ErrorRecovery::new(RecoveryPolicy {
            retry_delay: Duration::from_secs(10),
            retry_backoff: 2.0,
            max_retry_delay: Duration::from_secs(60),
            ..RecoveryPolicy::default()
        });
        assert_eq!(recovery.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(recovery.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(recovery.backoff_delay(3), Duration::from_secs(40));
        assert_eq!(recovery.backoff_delay(4), Duration::from_secs(60));
    }

    #[test]
    fn clear_resets_counters() {
        let mut recovery = ErrorRecovery::new(RecoveryPolicy::default());
        recovery.record(ErrorKind::NetworkError);
        recovery.clear(ErrorKind::NetworkError);
        assert_eq!(recovery.retry_count(ErrorKind::NetworkError), 0);
    }
}
