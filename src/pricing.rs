//! Price and opening-hours resolution against a venue's local calendar.
//!
//! Times of day are compared as seconds from local midnight. A `close` or
//! rule `end` of `00:00:00` means the end of the day, so `00:00–00:00` is a
//! full-day window.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Weekday};

use crate::model::{DayType, OperatingHours, Price, PricingRule, TimeRange};

pub const DEFAULT_RATE_PER_HOUR: Price = 100_000;

const DAY_SECS: u32 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBasis {
    Rule { peak: bool },
    /// The court has no pricing rules at all.
    DefaultRate,
    /// Rules exist but none covers the range; the first one is charged.
    FirstRuleFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub amount: Price,
    pub basis: PriceBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoursCheck {
    Open,
    /// The range falls outside the day's window, or the day is closed.
    Closed,
    /// The court has no operating-hours records.
    Unrestricted,
}

/// A range projected onto a single local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalSpan {
    weekday: Weekday,
    start: u32,
    end: u32,
}

fn local(t: DateTime<chrono::Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    t.with_timezone(&offset)
}

/// `None` when the range crosses a local midnight (ending exactly at the
/// next midnight is allowed).
fn local_span(range: &TimeRange, offset: FixedOffset) -> Option<LocalSpan> {
    let start = local(range.start(), offset);
    let end = local(range.end(), offset);
    let end_secs = if end.date_naive() == start.date_naive() {
        end.time().num_seconds_from_midnight()
    } else if Some(end.date_naive()) == start.date_naive().succ_opt()
        && end.time().num_seconds_from_midnight() == 0
    {
        DAY_SECS
    } else {
        return None;
    };
    Some(LocalSpan {
        weekday: start.weekday(),
        start: start.time().num_seconds_from_midnight(),
        end: end_secs,
    })
}

fn end_of_window(t: chrono::NaiveTime) -> u32 {
    match t.num_seconds_from_midnight() {
        0 => DAY_SECS,
        s => s,
    }
}

pub fn day_type(range: &TimeRange, offset: FixedOffset) -> DayType {
    DayType::of(local(range.start(), offset).weekday())
}

/// Price a range. The first rule of the matching day type whose window covers
/// the whole local time-of-day span wins.
pub fn quote(rules: &[PricingRule], range: &TimeRange, offset: FixedOffset, default_rate: Price) -> PriceQuote {
    let secs = (range.end() - range.start()).num_seconds();
    let charge = |per_hour: Price| per_hour * secs / 3600;

    let Some(first) = rules.first() else {
        return PriceQuote { amount: charge(default_rate), basis: PriceBasis::DefaultRate };
    };

    let day = day_type(range, offset);
    let matched = local_span(range, offset).and_then(|span| {
        rules.iter().find(|r| {
            r.day_type == day
                && r.start.num_seconds_from_midnight() <= span.start
                && span.end <= end_of_window(r.end)
        })
    });

    match matched {
        Some(rule) => PriceQuote {
            amount: charge(rule.price_per_hour),
            basis: PriceBasis::Rule { peak: rule.peak },
        },
        None => PriceQuote {
            amount: charge(first.price_per_hour),
            basis: PriceBasis::FirstRuleFallback,
        },
    }
}

pub fn is_within_operating_hours(range: &TimeRange, hours: &[OperatingHours], offset: FixedOffset) -> HoursCheck {
    if hours.is_empty() {
        return HoursCheck::Unrestricted;
    }
    let Some(span) = local_span(range, offset) else {
        return HoursCheck::Closed;
    };
    match open_window(hours, span.weekday) {
        Some((open, close)) if open <= span.start && span.end <= close => HoursCheck::Open,
        _ => HoursCheck::Closed,
    }
}

fn open_window(hours: &[OperatingHours], weekday: Weekday) -> Option<(u32, u32)> {
    let day = hours.iter().find(|h| h.weekday == weekday)?;
    if day.closed {
        return None;
    }
    let open = day.open.num_seconds_from_midnight();
    let close = end_of_window(day.close);
    (open < close).then_some((open, close))
}

/// Opening window for a local date in seconds from local midnight.
/// `None` when the court is closed that day; the whole day when no records exist.
pub fn day_window(hours: &[OperatingHours], date: NaiveDate) -> Option<(u32, u32)> {
    if hours.is_empty() {
        return Some((0, DAY_SECS));
    }
    open_window(hours, date.weekday())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};
    use ulid::Ulid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2025-03-04 is a Tuesday, 2025-03-08 a Saturday.
    fn range_on(day: u32, h1: u32, m1: u32, h2: u32, m2: u32) -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, day, h1, m1, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, day, h2, m2, 0).unwrap(),
        )
        .unwrap()
    }

    fn rule(day_type: DayType, start: NaiveTime, end: NaiveTime, price: Price, peak: bool) -> PricingRule {
        PricingRule { court_id: Ulid::nil(), day_type, start, end, price_per_hour: price, peak }
    }

    fn hours(weekday: Weekday, open: NaiveTime, close: NaiveTime, closed: bool) -> OperatingHours {
        OperatingHours { court_id: Ulid::nil(), weekday, open, close, closed }
    }

    #[test]
    fn weekday_rule_prices_tuesday_morning() {
        let rules = [rule(DayType::Weekday, t(6, 0), t(17, 0), 150_000, false)];
        let q = quote(&rules, &range_on(4, 8, 0, 9, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(q, PriceQuote { amount: 150_000, basis: PriceBasis::Rule { peak: false } });
    }

    #[test]
    fn fractional_hours_are_prorated() {
        let rules = [rule(DayType::Weekday, t(6, 0), t(17, 0), 150_000, false)];
        let q = quote(&rules, &range_on(4, 8, 0, 9, 30), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(q.amount, 225_000);
    }

    #[test]
    fn rule_window_is_inclusive_at_both_ends() {
        let rules = [rule(DayType::Weekday, t(6, 0), t(17, 0), 150_000, false)];
        let q = quote(&rules, &range_on(4, 16, 0, 17, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(q.basis, PriceBasis::Rule { peak: false });
    }

    #[test]
    fn peak_rule_and_day_type_selection() {
        let rules = [
            rule(DayType::Weekday, t(6, 0), t(17, 0), 150_000, false),
            rule(DayType::Weekday, t(17, 0), t(22, 0), 220_000, true),
            rule(DayType::Weekend, t(6, 0), t(22, 0), 250_000, false),
        ];
        let evening = quote(&rules, &range_on(4, 18, 0, 19, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(evening, PriceQuote { amount: 220_000, basis: PriceBasis::Rule { peak: true } });

        let saturday = quote(&rules, &range_on(8, 8, 0, 9, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(saturday.amount, 250_000);
    }

    #[test]
    fn no_rules_uses_default_rate() {
        let q = quote(&[], &range_on(4, 8, 0, 10, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(q, PriceQuote { amount: 200_000, basis: PriceBasis::DefaultRate });
    }

    #[test]
    fn unmatched_range_falls_back_to_first_rule() {
        let rules = [
            rule(DayType::Weekday, t(6, 0), t(17, 0), 150_000, false),
            rule(DayType::Weekday, t(17, 0), t(22, 0), 220_000, true),
        ];
        // spans both windows, so neither covers it
        let q = quote(&rules, &range_on(4, 16, 0, 18, 0), utc(), DEFAULT_RATE_PER_HOUR);
        assert_eq!(q, PriceQuote { amount: 300_000, basis: PriceBasis::FirstRuleFallback });
    }

    #[test]
    fn venue_offset_shifts_local_calendar() {
        // 23:00 UTC Friday is 06:00 Saturday at UTC+7
        let plus7 = FixedOffset::east_opt(7 * 3600).unwrap();
        let r = TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 7, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(day_type(&r, plus7), DayType::Weekend);
        assert_eq!(day_type(&r, utc()), DayType::Weekday);

        let rules = [
            rule(DayType::Weekday, t(0, 0), t(0, 0), 100_000, false),
            rule(DayType::Weekend, t(6, 0), t(22, 0), 250_000, false),
        ];
        assert_eq!(quote(&rules, &r, plus7, DEFAULT_RATE_PER_HOUR).amount, 250_000);
    }

    #[test]
    fn midnight_end_means_end_of_day() {
        let rules = [rule(DayType::Weekday, t(18, 0), t(0, 0), 180_000, true)];
        let late = TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 4, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(quote(&rules, &late, utc(), DEFAULT_RATE_PER_HOUR).basis, PriceBasis::Rule { peak: true });
    }

    #[test]
    fn no_hours_records_is_unrestricted() {
        let check = is_within_operating_hours(&range_on(4, 2, 0, 3, 0), &[], utc());
        assert_eq!(check, HoursCheck::Unrestricted);
    }

    #[test]
    fn hours_bounds_are_inclusive() {
        let tue = [hours(Weekday::Tue, t(6, 0), t(22, 0), false)];
        assert_eq!(is_within_operating_hours(&range_on(4, 6, 0, 7, 0), &tue, utc()), HoursCheck::Open);
        assert_eq!(is_within_operating_hours(&range_on(4, 21, 0, 22, 0), &tue, utc()), HoursCheck::Open);
        assert_eq!(is_within_operating_hours(&range_on(4, 5, 30, 6, 30), &tue, utc()), HoursCheck::Closed);
        assert_eq!(is_within_operating_hours(&range_on(4, 21, 30, 22, 30), &tue, utc()), HoursCheck::Closed);
    }

    #[test]
    fn missing_or_closed_day_rejects() {
        let week = [
            hours(Weekday::Tue, t(6, 0), t(22, 0), false),
            hours(Weekday::Sat, t(6, 0), t(22, 0), true),
        ];
        // Wednesday has no record
        assert_eq!(is_within_operating_hours(&range_on(5, 8, 0, 9, 0), &week, utc()), HoursCheck::Closed);
        assert_eq!(is_within_operating_hours(&range_on(8, 8, 0, 9, 0), &week, utc()), HoursCheck::Closed);
    }

    #[test]
    fn range_crossing_local_midnight_is_outside_hours() {
        let all_week: Vec<_> = [Weekday::Mon, Weekday::Tue, Weekday::Wed]
            .into_iter()
            .map(|d| hours(d, t(0, 0), t(0, 0), false))
            .collect();
        let overnight = TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 4, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 5, 1, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(is_within_operating_hours(&overnight, &all_week, utc()), HoursCheck::Closed);
    }

    #[test]
    fn day_window_variants() {
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let week = [
            hours(Weekday::Tue, t(6, 0), t(22, 0), false),
            hours(Weekday::Sat, t(6, 0), t(22, 0), true),
        ];
        assert_eq!(day_window(&week, tuesday), Some((6 * 3600, 22 * 3600)));
        assert_eq!(day_window(&week, saturday), None);
        assert_eq!(day_window(&[], saturday), Some((0, DAY_SECS)));
    }
}
