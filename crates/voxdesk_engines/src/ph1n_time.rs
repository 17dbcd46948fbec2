#![forbid(unsafe_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Day part of a time phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    Today,
    Tonight,
    Tomorrow,
    Weekday(Weekday),
    NextWeek,
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

/// Clock reading as written. `meridiem` is `None` for 24h forms and bare numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockParts {
    pub hour: u32,
    pub minute: u32,
    pub has_minutes: bool,
    pub meridiem: Option<Meridiem>,
}

impl ClockParts {
    pub fn to_time(self) -> Option<NaiveTime> {
        let hour = match self.meridiem {
            None => self.hour,
            Some(_) if self.hour == 0 || self.hour > 12 => return None,
            Some(Meridiem::Am) => self.hour % 12,
            Some(Meridiem::Pm) => self.hour % 12 + 12,
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }
}

pub fn parse_weekday(lower: &str) -> Option<Weekday> {
    let w = match lower {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(w)
}

/// Single-token day words: `today`, `tomorrow`, weekday names, ISO dates.
pub fn parse_day_word(lower: &str) -> Option<DayRef> {
    match lower {
        "today" => Some(DayRef::Today),
        "tonight" => Some(DayRef::Tonight),
        "tomorrow" | "tmrw" => Some(DayRef::Tomorrow),
        _ => parse_weekday(lower)
            .map(DayRef::Weekday)
            .or_else(|| NaiveDate::parse_from_str(lower, "%Y-%m-%d").ok().map(DayRef::Date)),
    }
}

pub fn parse_meridiem(lower: &str) -> Option<Meridiem> {
    match lower {
        "am" | "a.m" | "a.m." => Some(Meridiem::Am),
        "pm" | "p.m" | "p.m." => Some(Meridiem::Pm),
        _ => None,
    }
}

/// Parses `3`, `3pm`, `3:30`, `3:30pm`, `15:00`. Range checks are left to `to_time`.
pub fn parse_clock(lower: &str) -> Option<ClockParts> {
    let digits_end = lower
        .find(|c: char| !(c.is_ascii_digit() || c == ':'))
        .unwrap_or(lower.len());
    let (numeric, suffix) = lower.split_at(digits_end);
    let meridiem = if suffix.is_empty() {
        None
    } else {
        Some(parse_meridiem(suffix)?)
    };
    let (hour_raw, minute_raw) = match numeric.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (numeric, None),
    };
    if hour_raw.is_empty() || hour_raw.len() > 2 {
        return None;
    }
    let hour: u32 = hour_raw.parse().ok()?;
    let minute: u32 = match minute_raw {
        Some(m) if m.len() == 2 => m.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockParts {
        hour,
        minute,
        has_minutes: minute_raw.is_some(),
        meridiem,
    })
}

/// Named parts of the day, mapped to a fixed clock reading.
pub fn parse_day_period(lower: &str) -> Option<NaiveTime> {
    let hour = match lower {
        "noon" | "midday" => 12,
        "midnight" => 0,
        "morning" => 9,
        "afternoon" => 15,
        "evening" => 19,
        "night" => 21,
        _ => return None,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

/// Resolves a TIME phrase such as `tomorrow at 3pm` to a local date-time.
///
/// A clock reading is required; a phrase without a day part lands on `now`'s date.
/// Weekday names resolve to the next such day strictly after today.
pub fn resolve_when(phrase: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let words: Vec<String> = phrase
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | '.' | '!' | '?')).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    let mut day: Option<DayRef> = None;
    let mut time: Option<NaiveTime> = None;
    let mut i = 0;
    while i < words.len() {
        let w = words[i].as_str();
        if w == "next" && words.get(i + 1).map(String::as_str) == Some("week") {
            day.get_or_insert(DayRef::NextWeek);
            i += 2;
            continue;
        }
        if let Some(d) = parse_day_word(w) {
            day.get_or_insert(d);
            if d == DayRef::Tonight && time.is_none() {
                time = NaiveTime::from_hms_opt(20, 0, 0);
            }
        } else if let Some(c) = parse_clock(w) {
            let mut c = c;
            if c.meridiem.is_none() {
                if let Some(m) = words.get(i + 1).and_then(|n| parse_meridiem(n)) {
                    c.meridiem = Some(m);
                    i += 1;
                }
            }
            if let Some(t) = c.to_time() {
                time = Some(t);
            }
        } else if let Some(t) = parse_day_period(w) {
            if time.is_none() || w == "noon" || w == "midnight" {
                time = Some(t);
            }
        }
        i += 1;
    }

    let time = time?;
    let today = now.date();
    let date = match day.unwrap_or(DayRef::Today) {
        DayRef::Today | DayRef::Tonight => today,
        DayRef::Tomorrow => today + Duration::days(1),
        DayRef::NextWeek => today + Duration::days(7),
        DayRef::Date(d) => d,
        DayRef::Weekday(target) => {
            let ahead = (7 + target.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            today + Duration::days(if ahead == 0 { 7 } else { ahead })
        }
    };
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // 2026-03-04 is a Wednesday.
    fn now() -> NaiveDateTime {
        at(2026, 3, 4, 10, 0)
    }

    #[test]
    fn at_n_time_01_clock_forms() {
        assert_eq!(
            parse_clock("3pm").and_then(ClockParts::to_time),
            NaiveTime::from_hms_opt(15, 0, 0)
        );
        assert_eq!(
            parse_clock("3:30").and_then(ClockParts::to_time),
            NaiveTime::from_hms_opt(3, 30, 0)
        );
        assert_eq!(
            parse_clock("15:00").and_then(ClockParts::to_time),
            NaiveTime::from_hms_opt(15, 0, 0)
        );
        assert_eq!(
            parse_clock("12am").and_then(ClockParts::to_time),
            NaiveTime::from_hms_opt(0, 0, 0)
        );
        assert!(parse_clock("13pm").and_then(ClockParts::to_time).is_none());
        assert!(parse_clock("3:5").is_none());
        assert!(parse_clock("pm").is_none());
        assert!(parse_clock("3x").is_none());
    }

    #[test]
    fn at_n_time_02_relative_day_and_clock() {
        assert_eq!(
            resolve_when("tomorrow at 3pm", now()),
            Some(at(2026, 3, 5, 15, 0))
        );
        assert_eq!(
            resolve_when("at 3:30 pm", now()),
            Some(at(2026, 3, 4, 15, 30))
        );
        assert_eq!(resolve_when("tonight", now()), Some(at(2026, 3, 4, 20, 0)));
    }

    #[test]
    fn at_n_time_03_weekday_is_strictly_after_today() {
        assert_eq!(
            resolve_when("on friday at 9am", now()),
            Some(at(2026, 3, 6, 9, 0))
        );
        assert_eq!(
            resolve_when("wednesday at noon", now()),
            Some(at(2026, 3, 11, 12, 0))
        );
    }

    #[test]
    fn at_n_time_04_day_without_clock_does_not_resolve() {
        assert_eq!(resolve_when("tomorrow", now()), None);
        assert_eq!(resolve_when("next week", now()), None);
        assert_eq!(
            resolve_when("2026-05-01 at 10:15", now()),
            Some(at(2026, 5, 1, 10, 15))
        );
    }
}
