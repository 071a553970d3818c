// libs/scheduling-cell/src/services/slots.rs
//
// Pure slot arithmetic. Everything here is deterministic over the provider's
// weekly template; persistence never enters this module.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use provider_cell::models::{DayRule, WeeklyAvailability};

fn minutes_since_midnight(t: NaiveTime) -> i32 {
    (t.hour() * 60 + t.minute()) as i32
}

fn time_from_minutes(m: i32) -> NaiveTime {
    NaiveTime::from_hms_opt((m / 60) as u32, (m % 60) as u32, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
}

/// Generate the bookable slot starts for a single day rule, in ascending
/// order. Starts step from the window open to its close (exclusive); any
/// start falling inside [break_start, break_end) is dropped. A closed day
/// yields nothing, and `max_appointments` caps how many starts are offered.
pub fn day_slots(rule: &DayRule) -> Vec<NaiveTime> {
    if !rule.is_available {
        return Vec::new();
    }

    let open = minutes_since_midnight(rule.start_time);
    let close = minutes_since_midnight(rule.end_time);
    let stride = rule.slot_duration_minutes;
    let brk = rule
        .break_start
        .zip(rule.break_end)
        .map(|(s, e)| (minutes_since_midnight(s), minutes_since_midnight(e)));

    let mut slots = Vec::new();
    let mut cursor = open;
    while cursor < close {
        let in_break = brk.is_some_and(|(bs, be)| cursor >= bs && cursor < be);
        if !in_break {
            slots.push(time_from_minutes(cursor));
        }
        cursor += stride;
    }

    if rule.max_appointments > 0 {
        slots.truncate(rule.max_appointments as usize);
    }
    slots
}

/// Slot grid for a concrete calendar date: look up the weekday's rule and
/// expand it. Same date and template always produce the same grid.
pub fn slot_grid(template: &WeeklyAvailability, date: NaiveDate) -> Vec<NaiveTime> {
    day_slots(template.rule_for(date.weekday()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn morning_with_break() -> DayRule {
        DayRule::open(t(9, 0), t(12, 0), 30, 16).with_break(t(10, 0), t(10, 30))
    }

    #[test]
    fn generates_expected_morning_grid() {
        let slots = day_slots(&morning_with_break());
        assert_eq!(slots, vec![t(9, 0), t(9, 30), t(10, 30), t(11, 0), t(11, 30)]);
    }

    #[test]
    fn closed_day_has_no_slots() {
        assert!(day_slots(&DayRule::closed()).is_empty());
    }

    #[test]
    fn slot_count_matches_steps_minus_break_overlap() {
        // 8 steps in 09:00-13:00 at 30 min, 2 of them land in the break.
        let rule = DayRule::open(t(9, 0), t(13, 0), 30, 16).with_break(t(11, 0), t(12, 0));
        assert_eq!(day_slots(&rule).len(), 6);
    }

    #[test]
    fn break_boundary_is_half_open() {
        // A start exactly at break_end is bookable; one at break_start is not.
        let rule = DayRule::open(t(9, 0), t(12, 0), 30, 16).with_break(t(10, 0), t(10, 30));
        let slots = day_slots(&rule);
        assert!(!slots.contains(&t(10, 0)));
        assert!(slots.contains(&t(10, 30)));
    }

    #[test]
    fn window_close_is_exclusive() {
        let rule = DayRule::open(t(9, 0), t(10, 0), 30, 16);
        assert_eq!(day_slots(&rule), vec![t(9, 0), t(9, 30)]);
    }

    #[test]
    fn max_appointments_caps_the_grid() {
        let rule = DayRule::open(t(9, 0), t(17, 0), 30, 3);
        assert_eq!(day_slots(&rule), vec![t(9, 0), t(9, 30), t(10, 0)]);
    }

    #[test]
    fn grid_is_deterministic_per_weekday() {
        let mut days = [
            DayRule::closed(),
            DayRule::closed(),
            DayRule::closed(),
            DayRule::closed(),
            DayRule::closed(),
            DayRule::closed(),
            DayRule::closed(),
        ];
        days[1] = morning_with_break(); // Monday, Sunday-first layout
        let template = WeeklyAvailability::new(days).unwrap();

        // 2025-06-02 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);
        let first = slot_grid(&template, monday);
        let second = slot_grid(&template, monday);
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);

        // The neighbouring Tuesday is closed.
        let tuesday = monday.succ_opt().unwrap();
        assert!(slot_grid(&template, tuesday).is_empty());
    }
}
