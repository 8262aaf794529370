//! Business-day calendar for Canadian mortgage payment dates.
//!
//! Payment dates falling on a weekend or federal holiday move forward to the
//! next business day; interest accrues until the adjusted date. All holiday
//! rules are arithmetic functions of the year, so no per-year tables exist
//! to keep in sync.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// check if a date is a Saturday or Sunday
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// check if a date is a Canadian federal holiday
///
/// Covers New Year's Day, Good Friday, Easter Monday, Victoria Day,
/// Canada Day, Labour Day, Thanksgiving, Remembrance Day, Christmas and
/// Boxing Day.
pub fn is_canadian_holiday(date: NaiveDate) -> bool {
    let year = date.year();
    let (month, day) = (date.month(), date.day());

    // fixed-date holidays
    match (month, day) {
        (1, 1) => return true,   // New Year's Day
        (7, 1) => return true,   // Canada Day
        (11, 11) => return true, // Remembrance Day
        (12, 25) => return true, // Christmas
        (12, 26) => return true, // Boxing Day
        _ => {}
    }

    let easter = easter_sunday(year);
    if date == easter - Duration::days(2) {
        return true; // Good Friday
    }
    if date == easter + Duration::days(1) {
        return true; // Easter Monday
    }

    date == victoria_day(year) || date == labour_day(year) || date == thanksgiving(year)
}

/// check if a date is a business day (not a weekend, not a holiday)
pub fn is_business_day(date: NaiveDate) -> bool {
    !is_weekend(date) && !is_canadian_holiday(date)
}

/// move a payment date forward to the next business day
///
/// Already-business days are returned unchanged; the result is never earlier
/// than the input.
pub fn adjust_to_business_day(date: NaiveDate) -> NaiveDate {
    let mut adjusted = date;
    while !is_business_day(adjusted) {
        adjusted += Duration::days(1);
    }
    adjusted
}

/// signed number of whole days from `start` to `end`
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Easter Sunday via the anonymous Gregorian algorithm
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    // the algorithm only yields March or April days
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 4, 1).expect("valid date"))
}

/// Victoria Day: the Monday preceding May 25
fn victoria_day(year: i32) -> NaiveDate {
    let may_25 = NaiveDate::from_ymd_opt(year, 5, 25).expect("valid date");
    let back = match may_25.weekday() {
        Weekday::Mon => 0,
        Weekday::Sun => 6,
        other => other.num_days_from_monday() as i64,
    };
    may_25 - Duration::days(back)
}

/// Labour Day: first Monday of September
fn labour_day(year: i32) -> NaiveDate {
    nth_monday(year, 9, 1)
}

/// Thanksgiving: second Monday of October
fn thanksgiving(year: i32) -> NaiveDate {
    nth_monday(year, 10, 2)
}

fn nth_monday(year: i32, month: u32, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid date");
    let forward = (7 - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days(forward as i64 + 7 * (n as i64 - 1))
}
