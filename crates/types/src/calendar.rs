//! Date arithmetic used for age calculation and birth-date shifting.

use chrono::{Datelike, Duration, NaiveDate};

/// Errors that can occur when shifting calendar dates.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    /// The shifted date falls outside the range chrono can represent.
    #[error("date {date} cannot be shifted by {years} years")]
    OutOfRange { date: NaiveDate, years: i32 },
}

/// Age in whole years on `today` for someone born on `birth`.
///
/// `today.year - birth.year`, minus one if the birthday has not yet been reached this year.
/// A birth date after `today` yields zero.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Moves `date` by a whole number of years, keeping month and day.
///
/// 29 February becomes 28 February when the target year is not a leap year.
///
/// # Errors
///
/// Returns [`CalendarError::OutOfRange`] if the target year cannot be represented.
pub fn shift_years(date: NaiveDate, years: i32) -> Result<NaiveDate, CalendarError> {
    let out_of_range = || CalendarError::OutOfRange { date, years };
    let year = date.year().checked_add(years).ok_or_else(out_of_range)?;

    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .ok_or_else(out_of_range)
}

/// Inclusive birth-date bounds for everyone aged `lower..=upper` on `today`.
///
/// The earliest birth date is the day after `today` minus `upper + 1` years; the latest is
/// `today` minus `lower` years. Both bounds agree with [`age_on`].
///
/// # Errors
///
/// Returns [`CalendarError::OutOfRange`] if either bound cannot be represented.
pub fn birth_date_window(
    lower: u32,
    upper: u32,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    let to_years = |n: u32| -> Result<i32, CalendarError> {
        i32::try_from(n).map_err(|_| CalendarError::OutOfRange {
            date: today,
            years: i32::MAX,
        })
    };

    let latest = shift_years(today, -to_years(lower)?)?;
    let before_earliest = shift_years(today, -to_years(upper)?.saturating_add(1))?;
    let earliest = before_earliest + Duration::days(1);
    Ok((earliest, latest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_age_before_birthday() {
        assert_eq!(age_on(date(2000, 3, 15), date(2024, 3, 14)), 23);
    }

    #[test]
    fn test_age_on_birthday() {
        assert_eq!(age_on(date(2000, 3, 15), date(2024, 3, 15)), 24);
    }

    #[test]
    fn test_age_for_future_birth_is_zero() {
        assert_eq!(age_on(date(2030, 1, 1), date(2024, 3, 15)), 0);
    }

    #[test]
    fn test_shift_years_keeps_month_and_day() {
        assert_eq!(shift_years(date(1990, 1, 1), 3).expect("shift"), date(1993, 1, 1));
        assert_eq!(shift_years(date(1990, 7, 9), -10).expect("shift"), date(1980, 7, 9));
    }

    #[test]
    fn test_shift_years_clamps_leap_day() {
        assert_eq!(shift_years(date(2024, 2, 29), 1).expect("shift"), date(2025, 2, 28));
        assert_eq!(shift_years(date(2024, 2, 29), 4).expect("shift"), date(2028, 2, 29));
    }

    #[test]
    fn test_birth_date_window_matches_age_formula() {
        let today = date(2024, 6, 10);
        let (earliest, latest) = birth_date_window(18, 20, today).expect("window");
        assert_eq!(earliest, date(2003, 6, 11));
        assert_eq!(latest, date(2006, 6, 10));

        assert_eq!(age_on(earliest, today), 20);
        assert_eq!(age_on(latest, today), 18);
        assert_eq!(age_on(earliest - Duration::days(1), today), 21);
        assert_eq!(age_on(latest + Duration::days(1), today), 17);
    }

    #[test]
    fn test_birth_date_window_on_leap_day() {
        let today = date(2024, 2, 29);
        let (earliest, latest) = birth_date_window(0, 0, today).expect("window");
        assert_eq!(earliest, date(2023, 3, 1));
        assert_eq!(latest, today);
    }
}
