//! Stored document schema and migration.
//!
//! Every write uses the current schema (`schema_version` 2):
//!
//! | field                | content                                                     |
//! |----------------------|-------------------------------------------------------------|
//! | `identifier_history` | map of ISO birth date to clinical identifier                |
//! | `current_identifier` | the history value in use for the current birth date         |
//! | `max_identifier`     | greatest history value, sorted on to find the next identifier |
//! | `identifiers`        | every history value, matched by the contains filter         |
//! | `birth_date`, `creation_date`, `projected_on` | ISO `YYYY-MM-DD`                   |
//!
//! plus `id`, `age`, the demographic fields, `conditions` and `observations`.
//!
//! Older documents are read through [`document_to_record`], which accepts the earlier
//! identifier layouts: `hl7v2_id` as a date map, a list or a single string, with
//! `max_hl7v2_id` as the current pointer.

use crate::constants::SCHEMA_VERSION;
use crate::store::Document;
use crate::{PatientError, PatientResult};
use chrono::NaiveDate;
use pas_types::{
    age_on, ClinicalIdentifier, ConditionRecord, Demographics, ObservationComponent,
    ObservationRecord, ObservationValue, PatientRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const FIELD_ID: &str = "id";
pub const FIELD_AGE: &str = "age";
pub const FIELD_BIRTH_DATE: &str = "birth_date";
pub const FIELD_IDENTIFIERS: &str = "identifiers";
pub const FIELD_MAX_IDENTIFIER: &str = "max_identifier";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Serialize)]
struct StoredPatient<'a> {
    schema_version: u32,
    id: &'a str,
    identifier_history: BTreeMap<String, String>,
    current_identifier: Option<String>,
    max_identifier: Option<String>,
    identifiers: Vec<String>,
    birth_date: String,
    age: u32,
    creation_date: String,
    projected_on: Option<String>,
    #[serde(flatten)]
    demographics: &'a Demographics,
    conditions: &'a [ConditionRecord],
    observations: Vec<StoredObservation>,
}

/// Observation as stored: the value is split into two optional fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredObservation {
    category: Option<String>,
    observation: Option<String>,
    placer_order_number: Option<String>,
    filler_order_number: Option<String>,
    status: Option<String>,
    effective_date_time: Option<String>,
    issued: Option<String>,
    value_quantity: Option<String>,
    value_codeable_concept: Option<String>,
    encounter_reference: Option<String>,
    subject_reference: Option<String>,
    component: Option<Vec<ObservationComponent>>,
}

impl From<&ObservationRecord> for StoredObservation {
    fn from(o: &ObservationRecord) -> Self {
        let (value_quantity, value_codeable_concept) = match &o.value {
            Some(ObservationValue::Quantity(q)) => (Some(q.clone()), None),
            Some(ObservationValue::Coded(c)) => (None, Some(c.clone())),
            None => (None, None),
        };
        Self {
            category: o.category.clone(),
            observation: o.observation.clone(),
            placer_order_number: o.placer_order_number.clone(),
            filler_order_number: o.filler_order_number.clone(),
            status: o.status.clone(),
            effective_date_time: o.effective_date_time.clone(),
            issued: o.issued.clone(),
            value_quantity,
            value_codeable_concept,
            encounter_reference: o.encounter_reference.clone(),
            subject_reference: o.subject_reference.clone(),
            component: (!o.components.is_empty()).then(|| o.components.clone()),
        }
    }
}

impl From<StoredObservation> for ObservationRecord {
    fn from(s: StoredObservation) -> Self {
        // A quantity wins if a legacy document carries both.
        let value = s
            .value_quantity
            .map(ObservationValue::Quantity)
            .or(s.value_codeable_concept.map(ObservationValue::Coded));
        Self {
            category: s.category,
            observation: s.observation,
            placer_order_number: s.placer_order_number,
            filler_order_number: s.filler_order_number,
            status: s.status,
            effective_date_time: s.effective_date_time,
            issued: s.issued,
            value,
            encounter_reference: s.encounter_reference,
            subject_reference: s.subject_reference,
            components: s.component.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Renders a record in the current schema.
///
/// # Errors
///
/// Returns [`PatientError::Serialization`] if the record cannot be serialised.
pub fn record_to_document(record: &PatientRecord) -> PatientResult<Document> {
    let history = record.identifier_history();
    let mut identifiers: Vec<String> = history.values().map(|id| id.to_string()).collect();
    identifiers.sort();
    identifiers.dedup();

    let stored = StoredPatient {
        schema_version: SCHEMA_VERSION,
        id: &record.id,
        identifier_history: history
            .iter()
            .map(|(date, id)| (iso(*date), id.to_string()))
            .collect(),
        current_identifier: record.current_identifier().map(|id| id.to_string()),
        max_identifier: history.values().max().map(|id| id.to_string()),
        identifiers,
        birth_date: iso(record.birth_date),
        age: record.age,
        creation_date: iso(record.creation_date),
        projected_on: record.projected_on.map(iso),
        demographics: &record.demographics,
        conditions: &record.conditions,
        observations: record.observations.iter().map(StoredObservation::from).collect(),
    };

    match serde_json::to_value(&stored).map_err(PatientError::Serialization)? {
        Value::Object(map) => Ok(map),
        _ => Err(PatientError::MalformedDocument {
            id: record.id.clone(),
            reason: "record did not serialise to an object".into(),
        }),
    }
}

/// Serialised size in bytes of the demographic fields plus every condition and observation.
///
/// # Errors
///
/// Returns [`PatientError::Serialization`] if any part cannot be serialised.
pub fn content_size(record: &PatientRecord) -> PatientResult<usize> {
    let len = |value: Result<Vec<u8>, serde_json::Error>| {
        value.map(|bytes| bytes.len()).map_err(PatientError::Serialization)
    };

    let mut total = len(serde_json::to_vec(&record.demographics))?;
    for condition in &record.conditions {
        total += len(serde_json::to_vec(condition))?;
    }
    for observation in &record.observations {
        total += len(serde_json::to_vec(&StoredObservation::from(observation)))?;
    }
    Ok(total)
}

fn iso(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================================================
// Reading
// ============================================================================

/// Rebuilds a record from a stored document of any schema version.
///
/// - A missing `creation_date` becomes `today`; a missing `age` is computed at `today`.
/// - Identifiers that fail validation are dropped with a warning.
/// - A legacy identifier list keeps only its current entry, keyed at the birth date.
///
/// # Errors
///
/// Returns [`PatientError::MalformedDocument`] if `id` or `birth_date` is missing or invalid,
/// or a nested field has the wrong type.
pub fn document_to_record(document: &Document, today: NaiveDate) -> PatientResult<PatientRecord> {
    let id = document
        .get(FIELD_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("<unknown>", "missing 'id'"))?
        .to_owned();

    let birth_date = document
        .get(FIELD_BIRTH_DATE)
        .and_then(Value::as_str)
        .and_then(parse_date)
        .ok_or_else(|| malformed(&id, "missing or invalid 'birth_date'"))?;

    let creation_date = document
        .get("creation_date")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .unwrap_or(today);

    let age = document
        .get(FIELD_AGE)
        .and_then(Value::as_u64)
        .and_then(|a| u32::try_from(a).ok())
        .unwrap_or_else(|| age_on(birth_date, today));

    let mut record = PatientRecord::new(id.clone(), birth_date, age, creation_date);
    record.projected_on = document
        .get("projected_on")
        .and_then(Value::as_str)
        .and_then(parse_date);

    record.demographics = serde_json::from_value(Value::Object(document.clone()))
        .map_err(|e| malformed(&id, &format!("demographics: {e}")))?;

    let current = document
        .get("current_identifier")
        .or_else(|| document.get("max_hl7v2_id"))
        .and_then(Value::as_str)
        .and_then(|raw| valid_identifier(&id, raw));

    let history = match document.get("identifier_history") {
        Some(value) => history_from_map(&id, value),
        None => legacy_history(&id, document.get("hl7v2_id"), birth_date, current.as_ref()),
    };
    record.restore_identifiers(history, current.as_ref());

    if let Some(conditions) = document.get("conditions").filter(|v| !v.is_null()) {
        record.conditions = serde_json::from_value(conditions.clone())
            .map_err(|e| malformed(&id, &format!("conditions: {e}")))?;
    }
    if let Some(observations) = document.get("observations").filter(|v| !v.is_null()) {
        let stored: Vec<StoredObservation> = serde_json::from_value(observations.clone())
            .map_err(|e| malformed(&id, &format!("observations: {e}")))?;
        record.observations = stored.into_iter().map(ObservationRecord::from).collect();
    }

    Ok(record)
}

fn malformed(id: &str, reason: &str) -> PatientError {
    PatientError::MalformedDocument {
        id: id.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, DATE_FORMAT).ok()
}

fn valid_identifier(id: &str, raw: &str) -> Option<ClinicalIdentifier> {
    match ClinicalIdentifier::parse(raw) {
        Ok(identifier) => Some(identifier),
        Err(e) => {
            tracing::warn!("document {id}: dropping identifier: {e}");
            None
        }
    }
}

fn history_from_map(id: &str, value: &Value) -> BTreeMap<NaiveDate, ClinicalIdentifier> {
    let Some(map) = value.as_object() else {
        tracing::warn!("document {id}: identifier history is not a map");
        return BTreeMap::new();
    };

    let mut history = BTreeMap::new();
    for (key, raw) in map {
        let Some(date) = parse_date(key) else {
            tracing::warn!("document {id}: dropping identifier with invalid date key '{key}'");
            continue;
        };
        if let Some(identifier) = raw.as_str().and_then(|r| valid_identifier(id, r)) {
            history.insert(date, identifier);
        }
    }
    history
}

fn legacy_history(
    id: &str,
    value: Option<&Value>,
    birth_date: NaiveDate,
    current: Option<&ClinicalIdentifier>,
) -> BTreeMap<NaiveDate, ClinicalIdentifier> {
    match value {
        Some(map @ Value::Object(_)) => history_from_map(id, map),
        Some(Value::Array(items)) => {
            let listed: Vec<ClinicalIdentifier> = items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|raw| valid_identifier(id, raw))
                .collect();
            let chosen = current
                .filter(|c| listed.contains(c))
                .cloned()
                .or_else(|| listed.last().cloned());
            if listed.len() > 1 {
                tracing::warn!(
                    "document {id}: legacy identifier list has {} entries, keeping the current one",
                    listed.len()
                );
            }
            chosen.map(|c| BTreeMap::from([(birth_date, c)])).unwrap_or_default()
        }
        Some(Value::String(raw)) => valid_identifier(id, raw)
            .map(|c| BTreeMap::from([(birth_date, c)]))
            .unwrap_or_default(),
        _ => current
            .map(|c| BTreeMap::from([(birth_date, c.clone())]))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn ident(s: &str) -> ClinicalIdentifier {
        ClinicalIdentifier::parse(s).expect("identifier")
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test documents must be objects"),
        }
    }

    fn sample() -> PatientRecord {
        let mut record = PatientRecord::new("p-0001", date(1990, 1, 1), 34, date(2024, 1, 10));
        record.insert_identifier(date(1980, 1, 1), ident("SYN00003^^^PAS^MR"));
        record.insert_identifier(date(1990, 1, 1), ident("SYN00001^^^PAS^MR"));
        record.demographics.first_name = Some("Ann".into());
        record.conditions.push(ConditionRecord {
            condition: Some("Asthma".into()),
            ..Default::default()
        });
        record.observations.push(ObservationRecord {
            observation: Some("Glucose".into()),
            value: Some(ObservationValue::Quantity("5.4mmol/L".into())),
            ..Default::default()
        });
        record.observations.push(ObservationRecord {
            observation: Some("Mood".into()),
            value: Some(ObservationValue::Coded("Calm".into())),
            components: vec![ObservationComponent {
                code_text: Some("Score".into()),
                result: Some("3".into()),
            }],
            ..Default::default()
        });
        record
    }

    #[test]
    fn test_round_trip() {
        let record = sample();
        let document = record_to_document(&record).expect("to document");

        assert_eq!(document.get("schema_version"), Some(&json!(2)));
        assert_eq!(document.get("birth_date"), Some(&json!("1990-01-01")));
        assert_eq!(document.get("first_name"), Some(&json!("Ann")));
        assert_eq!(
            document.get("current_identifier"),
            Some(&json!("SYN00001^^^PAS^MR"))
        );
        assert_eq!(
            document.get("max_identifier"),
            Some(&json!("SYN00003^^^PAS^MR"))
        );
        assert_eq!(
            document.get("identifiers"),
            Some(&json!(["SYN00001^^^PAS^MR", "SYN00003^^^PAS^MR"]))
        );
        assert_eq!(
            document["observations"][0]["value_quantity"],
            json!("5.4mmol/L")
        );

        let back = document_to_record(&document, date(2024, 6, 1)).expect("from document");
        assert_eq!(back, record);
    }

    #[test]
    fn test_legacy_map_with_max_pointer() {
        let document = doc(json!({
            "id": "legacy-1",
            "birth_date": "1970-01-01",
            "age": 54,
            "hl7v2_id": {"1970-01-01": "SYN00002^^^PAS^MR", "1960-01-01": "SYN00009^^^PAS^MR"},
            "max_hl7v2_id": "SYN00009^^^PAS^MR",
            "first_name": "Bo",
            "middle_name": null,
            "observations": [{
                "category": "laboratory",
                "observation": "Glucose",
                "placer_order_number": "PL-1",
                "filler_order_number": "FL-1",
                "status": "F",
                "effective_date_time": null,
                "issued": null,
                "value_quantity": null,
                "value_codeable_concept": "Normal",
                "encounter_reference": null,
                "subject_reference": null,
                "component": null
            }]
        }));

        let record = document_to_record(&document, date(2024, 6, 1)).expect("migrate");
        assert_eq!(record.identifier_history().len(), 2);
        assert_eq!(
            record.current_identifier().map(|c| c.to_string()).as_deref(),
            Some("SYN00009^^^PAS^MR")
        );
        assert_eq!(record.creation_date, date(2024, 6, 1));
        assert_eq!(record.demographics.first_name.as_deref(), Some("Bo"));
        assert_eq!(
            record.observations[0].value,
            Some(ObservationValue::Coded("Normal".into()))
        );
        assert!(record.observations[0].components.is_empty());
        assert!(record.conditions.is_empty());
    }

    #[test]
    fn test_legacy_single_and_list() {
        let single = doc(json!({
            "id": "legacy-2",
            "birth_date": "1980-01-01",
            "hl7v2_id": "SYN0000A^^^PAS^MR"
        }));
        let record = document_to_record(&single, date(2024, 6, 1)).expect("migrate");
        assert_eq!(record.age, 44);
        assert_eq!(
            record.identifier_history().get(&date(1980, 1, 1)),
            Some(&ident("SYN0000A^^^PAS^MR"))
        );

        let list = doc(json!({
            "id": "legacy-3",
            "birth_date": "1980-01-01",
            "hl7v2_id": ["SYN0000A^^^PAS^MR", "bogus", "SYN0000B^^^PAS^MR"]
        }));
        let record = document_to_record(&list, date(2024, 6, 1)).expect("migrate");
        assert_eq!(
            record.current_identifier(),
            Some(&ident("SYN0000B^^^PAS^MR"))
        );
        assert_eq!(record.identifier_history().len(), 1);
    }

    #[test]
    fn test_invalid_identifiers_are_dropped() {
        let document = doc(json!({
            "id": "p-0002",
            "birth_date": "1980-01-01",
            "identifier_history": {"1980-01-01": "NOT-AN-ID", "not-a-date": "SYN00001^^^PAS^MR"},
            "current_identifier": "NOT-AN-ID"
        }));
        let record = document_to_record(&document, date(2024, 6, 1)).expect("migrate");
        assert!(!record.has_identifier());
        assert_eq!(record.current_identifier(), None);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = document_to_record(&doc(json!({"birth_date": "1980-01-01"})), date(2024, 1, 1))
            .expect_err("no id");
        assert!(matches!(err, PatientError::MalformedDocument { .. }));

        let err = document_to_record(&doc(json!({"id": "p-1", "birth_date": "01/01/1980"})), date(2024, 1, 1))
            .expect_err("bad birth date");
        assert!(matches!(err, PatientError::MalformedDocument { id, .. } if id == "p-1"));
    }

    #[test]
    fn test_content_size_counts_clinical_lists() {
        let mut record = sample();
        let before = content_size(&record).expect("size");
        record.observations.push(ObservationRecord {
            observation: Some("x".repeat(1000)),
            ..Default::default()
        });
        let after = content_size(&record).expect("size");
        assert!(after >= before + 1000);
    }
}
