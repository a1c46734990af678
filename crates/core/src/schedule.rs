use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Produces the upcoming meetup dates offered in a poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateSchedule {
    pub weekday: Weekday,
    /// Local hour from which the current day is considered too late.
    pub cutoff_hour: u32,
    pub count: usize,
    pub timezone: Tz,
}

impl Default for CandidateSchedule {
    fn default() -> Self {
        Self { weekday: Weekday::Fri, cutoff_hour: 18, count: 4, timezone: Tz::UTC }
    }
}

impl CandidateSchedule {
    pub fn next_candidates(&self, reference: DateTime<Utc>) -> Vec<NaiveDate> {
        let local = reference.with_timezone(&self.timezone).naive_local();
        next_candidates_from(local, self.weekday, self.cutoff_hour, self.count)
    }
}

pub fn next_candidates_from(
    local: NaiveDateTime,
    weekday: Weekday,
    cutoff_hour: u32,
    count: usize,
) -> Vec<NaiveDate> {
    let today = local.date();
    let days_until = (i64::from(weekday.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday()))
    .rem_euclid(7);
    let days_until = if days_until == 0 && local.hour() >= cutoff_hour { 7 } else { days_until };
    let first = today + Duration::days(days_until);

    (0..count).map(|week| first + Duration::weeks(week as i64)).collect()
}

/// Long human form used on cards, e.g. "Friday, March 7, 2025".
pub fn format_candidate(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
    use chrono_tz::Tz;

    use super::{format_candidate, next_candidates_from, CandidateSchedule};

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid datetime")
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn friday_before_cutoff_starts_today() {
        let candidates = next_candidates_from(at(2025, 3, 7, 17), Weekday::Fri, 18, 4);

        assert_eq!(
            candidates,
            vec![date(2025, 3, 7), date(2025, 3, 14), date(2025, 3, 21), date(2025, 3, 28)]
        );
    }

    #[test]
    fn friday_at_cutoff_starts_next_week() {
        let candidates = next_candidates_from(at(2025, 3, 7, 18), Weekday::Fri, 18, 4);

        assert_eq!(candidates.first(), Some(&date(2025, 3, 14)));
    }

    #[test]
    fn midweek_reference_picks_the_coming_friday() {
        let candidates = next_candidates_from(at(2025, 3, 5, 23), Weekday::Fri, 18, 4);

        assert_eq!(candidates.first(), Some(&date(2025, 3, 7)));
    }

    #[test]
    fn saturday_rolls_to_the_following_week() {
        let candidates = next_candidates_from(at(2025, 3, 8, 9), Weekday::Fri, 18, 4);

        assert_eq!(candidates.first(), Some(&date(2025, 3, 14)));
    }

    #[test]
    fn candidates_are_weekly_and_strictly_increasing() {
        let candidates = next_candidates_from(at(2025, 12, 30, 10), Weekday::Fri, 18, 4);

        assert_eq!(candidates.len(), 4);
        for pair in candidates.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_days(), 7);
        }
        assert!(candidates.iter().all(|candidate| candidate.weekday() == Weekday::Fri));
        assert_eq!(candidates.first(), Some(&date(2026, 1, 2)));
    }

    #[test]
    fn schedule_applies_its_timezone_before_the_cutoff_check() {
        let schedule = CandidateSchedule { timezone: Tz::Asia__Shanghai, ..Default::default() };
        // 11:00 UTC on Friday is 19:00 in Shanghai, past the cutoff.
        let reference = Utc.with_ymd_and_hms(2025, 3, 7, 11, 0, 0).single().expect("valid");

        let candidates = schedule.next_candidates(reference);

        assert_eq!(candidates.first(), Some(&date(2025, 3, 14)));
        assert_eq!(CandidateSchedule::default().next_candidates(reference)[0], date(2025, 3, 7));
    }

    #[test]
    fn formats_long_us_dates() {
        assert_eq!(format_candidate(date(2025, 3, 7)), "Friday, March 7, 2025");
        assert_eq!(format_candidate(date(2025, 10, 31)), "Friday, October 31, 2025");
    }
}
