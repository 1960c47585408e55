//! Birth-date and age rewriting for records read back from the store.
//!
//! Generated patients are created with a requested age. Two views of them are supported:
//! - **masquerade**: the age given at creation is kept and the birth date moves forward as
//!   real time passes
//! - **realistic**: the birth date is kept and the age is recomputed
//!
//! All functions take `today` explicitly.

use crate::allocator::IdentifierSource;
use crate::config::AgeMode;
use crate::{PatientError, PatientResult};
use chrono::{Datelike, Duration, NaiveDate};
use pas_types::{age_on, shift_years, PatientRecord};
use rand::{Rng, RngCore};

pub struct AgeProjection;

impl AgeProjection {
    /// Applies the projection for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if a shifted birth date cannot be represented.
    pub fn project(record: &mut PatientRecord, mode: AgeMode, today: NaiveDate) -> PatientResult<()> {
        match mode {
            AgeMode::Masquerade => Self::project_masquerade(record, today),
            AgeMode::Realistic => {
                Self::project_realistic(record, today);
                Ok(())
            }
        }
    }

    /// Moves the birth date so the stored age stays true.
    ///
    /// The birth year is recomputed from scratch as `today.year - age`, keeping the stored month
    /// and day, and goes back one more year if that birthday has not yet come round. The result
    /// depends only on the age, the month and day, and `today`, so projecting again (in the same
    /// year or a later one) never drifts. The age itself is never changed and `projected_on` is
    /// set to `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if the shifted birth date cannot be represented.
    pub fn project_masquerade(record: &mut PatientRecord, today: NaiveDate) -> PatientResult<()> {
        let target_year = i32::try_from(record.age)
            .ok()
            .and_then(|age| today.year().checked_sub(age))
            .ok_or_else(|| PatientError::InvalidInput(format!("age {} is out of range", record.age)))?;

        let mut birth_date = shift_years(record.birth_date, target_year - record.birth_date.year())?;
        if age_on(birth_date, today) < record.age {
            birth_date = shift_years(birth_date, -1)?;
        }

        record.birth_date = birth_date;
        record.projected_on = Some(today);
        Ok(())
    }

    /// Recomputes the age from the birth date.
    pub fn project_realistic(record: &mut PatientRecord, today: NaiveDate) {
        record.age = age_on(record.birth_date, today);
    }

    /// Forces the record to `desired_age`.
    ///
    /// The birth date becomes 1 January of `today.year - desired_age`, plus `batch_index` days
    /// when given, so a batch of same-age patients get distinct birth dates.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if the birth date cannot be represented.
    pub fn assign_target_age(
        record: &mut PatientRecord,
        desired_age: u32,
        batch_index: Option<u32>,
        today: NaiveDate,
    ) -> PatientResult<()> {
        let year = i32::try_from(desired_age)
            .ok()
            .and_then(|age| today.year().checked_sub(age))
            .ok_or_else(|| PatientError::InvalidInput(format!("age {desired_age} is out of range")))?;
        let first_of_year = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PatientError::InvalidInput(format!("year {year} is out of range")))?;

        record.birth_date = first_of_year + Duration::days(i64::from(batch_index.unwrap_or(0)));
        record.age = desired_age;
        Ok(())
    }

    /// Makes the record's age fall in `lower..=upper`, reusing an earlier identity if possible.
    ///
    /// If the age is already in range nothing changes. Otherwise the identifier history is
    /// searched for a birth date whose age on `today` is in range; the first one found becomes
    /// current, without allocating. Failing that, a random age in range is assigned and a new
    /// identifier is allocated for the new birth date. Existing history entries are never
    /// removed.
    ///
    /// Returns true if the record changed.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if `lower > upper`, or any error from allocation.
    pub fn reassign_for_age_range(
        record: &mut PatientRecord,
        lower: u32,
        upper: u32,
        identifiers: &dyn IdentifierSource,
        rng: &mut dyn RngCore,
        today: NaiveDate,
    ) -> PatientResult<bool> {
        if lower > upper {
            return Err(PatientError::InvalidInput(format!(
                "age range {lower}..={upper} is empty"
            )));
        }
        if (lower..=upper).contains(&record.age) {
            return Ok(false);
        }

        let reusable = record
            .identifier_history()
            .keys()
            .copied()
            .find(|date| (lower..=upper).contains(&age_on(*date, today)));
        if let Some(date) = reusable {
            record.birth_date = date;
            record.age = age_on(date, today);
            record.select_identifier(date);
            tracing::debug!("record {} reuses the identity born {date}", record.id);
            return Ok(true);
        }

        let age = rng.gen_range(lower..=upper);
        let identifier = identifiers.next_identifier()?;
        Self::assign_target_age(record, age, None, today)?;
        tracing::info!(
            "record {} assigned age {age} with new identifier {identifier}",
            record.id
        );
        record.insert_identifier(record.birth_date, identifier);
        Ok(true)
    }
}
