//! Bulk import of FHIR bundles into the record store.
//!
//! Patients in one bundle are given consecutive birth dates: the first is moved to 1 January of
//! its birth year and each later patient is born the day after the one before. Every imported
//! patient gets a fresh clinical identifier and freshly minted order numbers.

use crate::constants::{FILLER_ORDER_PREFIX, PLACER_ORDER_PREFIX};
use crate::records::RecordStore;
use crate::status::StatusCode;
use crate::{PatientError, PatientResult};
use chrono::{Datelike, Duration, NaiveDate};
use fhir::Bundle;
use pas_types::PatientRecord;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Totals for an [`import_directory`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: usize,
    pub failed_files: usize,
    pub created: usize,
    pub conflicts: usize,
    pub too_large: usize,
    /// Ids of the records written, in import order.
    pub imported: Vec<String>,
}

impl ImportSummary {
    fn tally(&mut self, id: String, status: StatusCode) {
        match status {
            StatusCode::Created | StatusCode::Updated => {
                self.created += 1;
                self.imported.push(id);
            }
            StatusCode::Conflict => self.conflicts += 1,
            StatusCode::DocumentTooLarge => self.too_large += 1,
            StatusCode::NoMatch | StatusCode::Discarded => {}
        }
    }
}

/// Imports every patient in a bundle, returning each record id with its save status.
///
/// # Errors
///
/// Returns [`PatientError::Fhir`] if the bundle cannot be parsed, or any store or allocation
/// error. Patients saved before the failure stay saved.
pub fn import_bundle(
    records: &RecordStore,
    json_text: &str,
) -> PatientResult<Vec<(String, StatusCode)>> {
    let inbound = Bundle::parse(json_text)?;
    let today = records.today();
    let mut previous_birth: Option<NaiveDate> = None;
    let mut outcomes = Vec::with_capacity(inbound.len());

    for mut patient in inbound {
        let birth_date = match previous_birth {
            Some(previous) => previous + Duration::days(1),
            None => first_of_year(patient.birth_date)?,
        };
        previous_birth = Some(birth_date);
        patient.birth_date = birth_date;

        for observation in &mut patient.observations {
            observation.placer_order_number = Some(format!("{PLACER_ORDER_PREFIX}{}", Uuid::new_v4()));
            observation.filler_order_number = Some(format!("{FILLER_ORDER_PREFIX}{}", Uuid::new_v4()));
        }

        let id = patient
            .id
            .take()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        // Identifiers in the bundle are not ours; the allocator issues one below.
        patient.identifiers = Default::default();

        let mut record = PatientRecord::from_inbound(patient, id, today);
        records.assign_initial_identifier(&mut record, birth_date)?;

        let status = records.save(&mut record, false)?;
        outcomes.push((record.id, status));
    }

    Ok(outcomes)
}

/// Imports every `*.json` file in `dir`, in file name order.
///
/// A file that fails to read, parse or save is logged and counted; the run continues.
///
/// # Errors
///
/// Returns [`PatientError::StoreIo`] if the directory itself cannot be listed.
pub fn import_directory(records: &RecordStore, dir: &Path) -> PatientResult<ImportSummary> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut summary = ImportSummary::default();
    for path in paths {
        summary.files += 1;
        let outcome = std::fs::read_to_string(&path)
            .map_err(PatientError::from)
            .and_then(|text| import_bundle(records, &text));

        match outcome {
            Ok(statuses) => {
                tracing::info!("imported {} patient(s) from {}", statuses.len(), path.display());
                for (id, status) in statuses {
                    summary.tally(id, status);
                }
            }
            Err(e) => {
                tracing::warn!("failed to import {}: {e}", path.display());
                summary.failed_files += 1;
            }
        }
    }

    Ok(summary)
}

fn first_of_year(date: NaiveDate) -> PatientResult<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), 1, 1)
        .ok_or_else(|| PatientError::InvalidInput(format!("year of {date} is out of range")))
}
