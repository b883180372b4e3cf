//! Time-of-day tracking windows, per spec §4.1 "Schedule".
//!
//! A pure function over `chrono::NaiveTime`; no grounding in the teacher's
//! domain logic is applicable here (nothing in the pack models wall-clock
//! windows), so this stays a small, directly-specified helper rather than
//! an adaptation of specific teacher code.

use chrono::{NaiveTime, Timelike};

use crate::config::ScheduleWindow;

/// True if `now` (hour, minute) falls inside any configured window. An
/// empty schedule means "always on" (spec §4.1 default).
pub fn in_scheduled_window(schedule: &[ScheduleWindow], now: NaiveTime) -> bool {
    if schedule.is_empty() {
        return true;
    }

    let now_minutes = now.hour() * 60 + now.minute();

    schedule.iter().any(|window| {
        let start = window.start.0 as u32 * 60 + window.start.1 as u32;
        let end = window.end.0 as u32 * 60 + window.end.1 as u32;

        if start <= end {
            now_minutes >= start && now_minutes < end
        } else {
            // Window wraps past midnight, e.g. 22:00-06:00.
            now_minutes >= start || now_minutes < end
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(sh: u8, sm: u8, eh: u8, em: u8) -> ScheduleWindow {
        ScheduleWindow {
            start: (sh, sm),
            end: (eh, em),
        }
    }

    #[test]
    fn empty_schedule_is_always_in_window() {
        assert!(in_scheduled_window(&[], NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
    }

    #[test]
    fn time_inside_simple_window_matches() {
        let schedule = vec![window(9, 0, 17, 0)];
        assert!(in_scheduled_window(&schedule, NaiveTime::from_hms_opt(12, 30, 0).unwrap()));
        assert!(!in_scheduled_window(&schedule, NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
    }

    #[test]
    fn midnight_wrapping_window_matches_both_sides() {
        let schedule = vec![window(22, 0, 6, 0)];
        assert!(in_scheduled_window(&schedule, NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(in_scheduled_window(&schedule, NaiveTime::from_hms_opt(4, 0, 0).unwrap()));
        assert!(!in_scheduled_window(&schedule, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn multiple_windows_are_unioned() {
        let schedule = vec![window(6, 0, 9, 0), window(17, 0, 20, 0)];
        assert!(in_scheduled_window(&schedule, NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(in_scheduled_window(&schedule, NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
        assert!(!in_scheduled_window(&schedule, NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }
}
