//! Event and period schedules.
//!
//! An [`EventSchedule`] answers "is a recomputation due at `t`" and a
//! [`PeriodSchedule`] answers "is `t` inside a permitted window". Both are
//! built from small composable rules over timestamps.
//!
//! Periodic occurrences carry a `next_due` cursor that advances as a side
//! effect of [`EventSchedule::is_due`]. Queries must therefore arrive in
//! increasing time order; clone the schedule to snapshot it for replay.

use std::ops::BitOr;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike, Weekday};

/// Set of weekdays stored as a bitmask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet(u8);

impl DaySet {
    pub const NONE: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b111_1111);
    pub const WEEKDAYS: DaySet = DaySet(0b001_1111);
    pub const WEEKENDS: DaySet = DaySet(0b110_0000);

    pub fn from_days(days: &[Weekday]) -> Self {
        days.iter().fold(Self::NONE, |set, day| set.with(*day))
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | 1 << day.num_days_from_monday())
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DaySet {
    type Output = DaySet;

    fn bitor(self, rhs: DaySet) -> DaySet {
        DaySet(self.0 | rhs.0)
    }
}

/// Set of hours of the day (0–23) stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HourSet(u32);

impl HourSet {
    pub const NONE: HourSet = HourSet(0);
    pub const ALL: HourSet = HourSet((1 << 24) - 1);

    /// Builds a set from hour values.
    ///
    /// # Panics
    ///
    /// Panics if any hour is greater than 23.
    pub fn from_hours(hours: impl IntoIterator<Item = u32>) -> Self {
        let mut mask = 0;
        for hour in hours {
            assert!(hour < 24, "hour {hour} out of range");
            mask |= 1 << hour;
        }
        Self(mask)
    }

    /// Half-open hour range `[start, end)`; wraps past midnight when `start > end`.
    pub fn range(start: u32, end: u32) -> Self {
        if start <= end {
            Self::from_hours(start..end.min(24))
        } else {
            Self::from_hours((start..24).chain(0..end))
        }
    }

    pub fn contains(self, hour: u32) -> bool {
        hour < 24 && self.0 & (1 << hour) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Recurring day-of-week and hour-of-day pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyHours {
    pub days: DaySet,
    pub hours: HourSet,
}

impl DailyHours {
    pub fn new(days: DaySet, hours: HourSet) -> Self {
        Self { days, hours }
    }

    /// True when `t` falls on an enabled day inside an enabled hour.
    pub fn matches(&self, t: NaiveDateTime) -> bool {
        self.days.contains(t.weekday()) && self.hours.contains(t.hour())
    }
}

/// One rule of an [`EventSchedule`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventOccurrence {
    /// Due exactly at one of a sorted set of instants.
    Specific(Vec<NaiveDateTime>),
    /// Due once `t` reaches `next_due`, then re-armed one `period` later.
    ///
    /// Catch-up keeps the phase: firings stay on `first_due + k * period`
    /// rather than drifting to the instant the rule happened to fire.
    Periodic {
        next_due: NaiveDateTime,
        period: TimeDelta,
    },
    /// Due at minute zero of each matching hour.
    TopOfHour(DailyHours),
}

impl EventOccurrence {
    pub fn specific(instants: impl IntoIterator<Item = NaiveDateTime>) -> Self {
        let mut instants: Vec<_> = instants.into_iter().collect();
        instants.sort_unstable();
        instants.dedup();
        Self::Specific(instants)
    }

    /// # Panics
    ///
    /// Panics if `period` is not positive.
    pub fn periodic(first_due: NaiveDateTime, period: TimeDelta) -> Self {
        assert!(period > TimeDelta::zero(), "period must be positive");
        Self::Periodic {
            next_due: first_due,
            period,
        }
    }

    /// Evaluates the rule at `t`.
    ///
    /// A firing periodic rule advances `next_due` by whole periods until it
    /// lies after `t`, so a gap in the queries fires once rather than once
    /// per missed period.
    pub fn is_due(&mut self, t: NaiveDateTime) -> bool {
        match self {
            EventOccurrence::Specific(instants) => instants.binary_search(&t).is_ok(),
            EventOccurrence::Periodic { next_due, period } => {
                if t < *next_due {
                    return false;
                }
                while *next_due <= t {
                    *next_due += *period;
                }
                true
            }
            EventOccurrence::TopOfHour(pattern) => t.minute() == 0 && pattern.matches(t),
        }
    }
}

/// OR-combination of event rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSchedule {
    occurrences: Vec<EventOccurrence>,
    always_due: bool,
}

impl EventSchedule {
    /// A schedule with no rules; never due.
    pub fn new() -> Self {
        Self::default()
    }

    /// A schedule that is due at every instant.
    pub fn always() -> Self {
        Self {
            occurrences: Vec::new(),
            always_due: true,
        }
    }

    pub fn with(mut self, occurrence: EventOccurrence) -> Self {
        self.add(occurrence);
        self
    }

    pub fn add(&mut self, occurrence: EventOccurrence) {
        self.occurrences.push(occurrence);
    }

    pub fn clear(&mut self) {
        self.occurrences.clear();
    }

    /// True when no rule can ever fire.
    pub fn is_empty(&self) -> bool {
        !self.always_due && self.occurrences.is_empty()
    }

    /// True when any rule fires at `t`.
    ///
    /// Every rule is evaluated on each call so periodic cursors advance in
    /// lockstep regardless of which rule fired.
    pub fn is_due(&mut self, t: NaiveDateTime) -> bool {
        let mut due = self.always_due;
        for occurrence in &mut self.occurrences {
            due |= occurrence.is_due(t);
        }
        due
    }
}

/// One rule of a [`PeriodSchedule`].
#[derive(Debug, Clone, PartialEq)]
pub enum Period {
    /// Active when `from <= t <= to`.
    DateRange {
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    Daily(DailyHours),
}

impl Period {
    pub fn is_active(&self, t: NaiveDateTime) -> bool {
        match self {
            Period::DateRange { from, to } => *from <= t && t <= *to,
            Period::Daily(pattern) => pattern.matches(t),
        }
    }
}

/// Active periods minus pause periods; a matching pause always wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodSchedule {
    periods: Vec<Period>,
    pauses: Vec<Period>,
    always_active: bool,
}

impl PeriodSchedule {
    /// A schedule with no periods; never active.
    pub fn new() -> Self {
        Self::default()
    }

    /// A schedule active at every instant not covered by a pause.
    pub fn always() -> Self {
        Self {
            always_active: true,
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.periods.push(period);
        self
    }

    pub fn with_pause(mut self, pause: Period) -> Self {
        self.pauses.push(pause);
        self
    }

    pub fn add_period(&mut self, period: Period) {
        self.periods.push(period);
    }

    pub fn add_periods(&mut self, periods: impl IntoIterator<Item = Period>) {
        self.periods.extend(periods);
    }

    pub fn add_pause(&mut self, pause: Period) {
        self.pauses.push(pause);
    }

    /// Drops all active periods, keeping pauses and the always-active flag.
    pub fn clear_periods(&mut self) {
        self.periods.clear();
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn is_active(&self, t: NaiveDateTime) -> bool {
        let active = self.always_active || self.periods.iter().any(|p| p.is_active(t));
        active && !self.pauses.iter().any(|p| p.is_active(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-01-01 is a Monday.
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid datetime")
    }

    #[test]
    fn day_groups() {
        assert!(DaySet::WEEKDAYS.contains(Weekday::Fri));
        assert!(!DaySet::WEEKDAYS.contains(Weekday::Sat));
        assert!(DaySet::WEEKENDS.contains(Weekday::Sun));
        assert_eq!(DaySet::WEEKDAYS | DaySet::WEEKENDS, DaySet::ALL);
        assert!(DaySet::from_days(&[Weekday::Wed]).contains(Weekday::Wed));
    }

    #[test]
    fn hour_range_wraps_midnight() {
        let night = HourSet::range(22, 6);
        assert!(night.contains(23));
        assert!(night.contains(0));
        assert!(night.contains(5));
        assert!(!night.contains(6));
        assert!(!night.contains(12));
    }

    #[test]
    #[should_panic]
    fn hour_out_of_range_panics() {
        HourSet::from_hours([24]);
    }

    #[test]
    fn specific_instants() {
        let mut occ = EventOccurrence::specific([at(1, 6, 0), at(2, 6, 0)]);
        assert!(occ.is_due(at(1, 6, 0)));
        assert!(!occ.is_due(at(1, 7, 0)));
        assert!(occ.is_due(at(2, 6, 0)));
    }

    #[test]
    fn periodic_advances_on_fire() {
        let mut occ = EventOccurrence::periodic(at(1, 0, 0), TimeDelta::hours(6));
        assert!(occ.is_due(at(1, 0, 0)));
        assert!(!occ.is_due(at(1, 0, 0)), "second query at same instant is not due");
        assert!(!occ.is_due(at(1, 5, 0)));
        assert!(occ.is_due(at(1, 6, 0)));
    }

    #[test]
    fn periodic_gap_fires_once() {
        let mut occ = EventOccurrence::periodic(at(1, 0, 0), TimeDelta::hours(1));
        assert!(occ.is_due(at(1, 5, 30)));
        assert!(!occ.is_due(at(1, 5, 45)));
        assert!(occ.is_due(at(1, 6, 0)));
    }

    #[test]
    fn periodic_catch_up_keeps_phase() {
        let mut occ = EventOccurrence::periodic(at(1, 0, 0), TimeDelta::hours(6));
        assert!(occ.is_due(at(1, 1, 30)));
        assert!(!occ.is_due(at(1, 5, 59)));
        assert!(occ.is_due(at(1, 6, 0)));
        assert_eq!(
            occ,
            EventOccurrence::Periodic {
                next_due: at(1, 12, 0),
                period: TimeDelta::hours(6),
            }
        );
    }

    #[test]
    fn top_of_hour_requires_minute_zero() {
        let pattern = DailyHours::new(DaySet::WEEKDAYS, HourSet::from_hours([7]));
        let mut occ = EventOccurrence::TopOfHour(pattern);
        assert!(occ.is_due(at(1, 7, 0)));
        assert!(!occ.is_due(at(1, 7, 30)));
        // 2024-01-06 is a Saturday
        assert!(!occ.is_due(at(6, 7, 0)));
    }

    #[test]
    fn empty_event_schedule_never_due() {
        let mut schedule = EventSchedule::new();
        assert!(schedule.is_empty());
        for hour in 0..24 {
            assert!(!schedule.is_due(at(1, hour, 0)));
        }
    }

    #[test]
    fn always_due_schedule() {
        let mut schedule = EventSchedule::always();
        assert!(!schedule.is_empty());
        assert!(schedule.is_due(at(3, 13, 17)));
    }

    #[test]
    fn every_rule_is_evaluated() {
        let mut schedule = EventSchedule::new()
            .with(EventOccurrence::specific([at(1, 0, 0)]))
            .with(EventOccurrence::periodic(at(1, 0, 0), TimeDelta::hours(2)));
        assert!(schedule.is_due(at(1, 0, 0)));
        // periodic cursor advanced even though the specific rule also fired
        assert!(!schedule.is_due(at(1, 1, 0)));
        assert!(schedule.is_due(at(1, 2, 0)));
    }

    #[test]
    fn date_range_is_inclusive() {
        let period = Period::DateRange {
            from: at(1, 2, 0),
            to: at(1, 4, 0),
        };
        assert!(period.is_active(at(1, 2, 0)));
        assert!(period.is_active(at(1, 4, 0)));
        assert!(!period.is_active(at(1, 4, 1)));
        assert!(!period.is_active(at(1, 1, 59)));
    }

    #[test]
    fn daily_period_matches_any_minute() {
        let period = Period::Daily(DailyHours::new(DaySet::ALL, HourSet::range(17, 20)));
        assert!(period.is_active(at(6, 17, 45)));
        assert!(!period.is_active(at(6, 20, 0)));
    }

    #[test]
    fn pause_beats_active_period() {
        let schedule = PeriodSchedule::new()
            .with_period(Period::Daily(DailyHours::new(DaySet::ALL, HourSet::ALL)))
            .with_pause(Period::DateRange {
                from: at(1, 12, 0),
                to: at(1, 13, 0),
            });
        assert!(schedule.is_active(at(1, 11, 0)));
        assert!(!schedule.is_active(at(1, 12, 30)));
    }

    #[test]
    fn always_active_respects_pauses() {
        let schedule = PeriodSchedule::always().with_pause(Period::Daily(DailyHours::new(
            DaySet::WEEKENDS,
            HourSet::ALL,
        )));
        assert!(schedule.is_active(at(5, 9, 0)));
        assert!(!schedule.is_active(at(6, 9, 0)));
    }

    #[test]
    fn empty_period_schedule_is_inactive() {
        assert!(!PeriodSchedule::new().is_active(at(1, 0, 0)));
    }
}
