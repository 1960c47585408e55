use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of "today" for age arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Clock {
    /// The local calendar date.
    #[default]
    System,
    /// A pinned date, for tests and reproducible runs.
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => Local::now().date_naive(),
            Clock::Fixed(date) => *date,
        }
    }

    /// Current local time, or midnight of the pinned date.
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => Local::now().naive_local(),
            Clock::Fixed(date) => date.and_time(chrono::NaiveTime::MIN),
        }
    }
}
