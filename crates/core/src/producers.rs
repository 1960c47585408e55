//! Outbound message production from stored records.
//!
//! Producers never write to the store. Each produced message is paired with the id of the
//! record it describes so the caller can name its output after it.

use crate::config::AgeMode;
use crate::constants::{
    ASSIGNABLE_AGES, FILLER_ORDER_PREFIX, LAB_ORDER_CATEGORY, LAB_ORDER_STATUS, LAB_ORDER_TEST,
    PLACER_ORDER_PREFIX,
};
use crate::projection::AgeProjection;
use crate::records::{RecordStore, Retrieval};
use crate::PatientResult;
use hl7::outbound;
use hl7::MessageContext;
use pas_types::{ObservationRecord, PatientRecord};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Messages built by a producer, or how many more records the store needs.
#[derive(Debug, PartialEq, Eq)]
pub enum Production {
    /// `(record id, ER7 text)` per record.
    Messages(Vec<(String, String)>),
    Shortfall(u64),
}

/// Message written for each freshly imported record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMessage {
    /// ADT^A01.
    Admission,
    /// ORM^O01 for the record's first observation.
    Order,
    /// ORU^R01 for the record's first observation.
    Result,
}

impl FromStr for ImportMessage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adt" | "adt_a01" => Ok(ImportMessage::Admission),
            "orm" | "orm_o01" => Ok(ImportMessage::Order),
            "oru" | "oru_r01" => Ok(ImportMessage::Result),
            other => Err(format!("message type must be adt, orm or oru, got '{other}'")),
        }
    }
}

impl fmt::Display for ImportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportMessage::Admission => "ADT^A01",
            ImportMessage::Order => "ORM^O01",
            ImportMessage::Result => "ORU^R01",
        })
    }
}

/// One message of kind `kind` per record in `ids`, as stored.
///
/// Orders and results describe the record's first observation, with the order numbers minted
/// at import. Records that are missing, or have no observation for an order or result, are
/// skipped with a warning.
///
/// # Errors
///
/// As [`produce_admissions`].
pub fn produce_for_imported(
    records: &RecordStore,
    ids: &[String],
    kind: ImportMessage,
    ctx: &mut MessageContext<'_>,
) -> PatientResult<Production> {
    let mut messages = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(record) = records.get(id)? else {
            tracing::warn!("imported record {id} is no longer stored");
            continue;
        };

        let text = match (kind, record.observations.first()) {
            (ImportMessage::Admission, _) => outbound::adt_a01(&record, ctx)?,
            (ImportMessage::Order, Some(order)) => outbound::orm_o01(&record, order, ctx)?,
            (ImportMessage::Result, Some(result)) => outbound::oru_r01(&record, result, ctx)?,
            (_, None) => {
                tracing::warn!("record {id} has no observation; no {kind} written");
                continue;
            }
        };
        messages.push((record.id, text));
    }
    tracing::info!("produced {} {kind} message(s) for imported records", messages.len());
    Ok(Production::Messages(messages))
}

/// One ADT^A01 per record aged `lower..=upper`.
///
/// # Errors
///
/// Returns a store error, or [`crate::PatientError::Hl7`] if a record has no identifier.
pub fn produce_admissions(
    records: &RecordStore,
    lower: u32,
    upper: u32,
    mode: AgeMode,
    n: usize,
    ctx: &mut MessageContext<'_>,
) -> PatientResult<Production> {
    let found = match records.retrieve(lower, upper, mode, n)? {
        Retrieval::Records(found) => found,
        Retrieval::Shortfall(missing) => return Ok(Production::Shortfall(missing)),
    };

    let mut messages = Vec::with_capacity(found.len());
    for record in found {
        let text = outbound::adt_a01(&record, ctx)?;
        messages.push((record.id, text));
    }
    tracing::info!("produced {} ADT^A01 message(s)", messages.len());
    Ok(Production::Messages(messages))
}

/// One OML^O21 liver function order per record aged `age`.
///
/// With `assign_age`, records of any assignable age are taken and forced to `age`, each batch
/// member born one day after the previous. The forced age is not saved.
///
/// # Errors
///
/// As [`produce_admissions`].
pub fn produce_lab_orders(
    records: &RecordStore,
    age: u32,
    n: usize,
    assign_age: bool,
    ctx: &mut MessageContext<'_>,
) -> PatientResult<Production> {
    let (lower, upper) = if assign_age { ASSIGNABLE_AGES } else { (age, age) };
    let mut found = match records.retrieve(lower, upper, AgeMode::Masquerade, n)? {
        Retrieval::Records(found) => found,
        Retrieval::Shortfall(missing) => return Ok(Production::Shortfall(missing)),
    };

    if assign_age {
        let today = records.today();
        for (index, record) in (0u32..).zip(found.iter_mut()) {
            AgeProjection::assign_target_age(record, age, Some(index), today)?;
        }
    }

    let mut messages = Vec::with_capacity(found.len());
    for record in found {
        let order = lab_order(&record);
        let text = outbound::oml_o21(&record, &order, ctx)?;
        messages.push((record.id, text));
    }
    tracing::info!("produced {} OML^O21 message(s) for age {age}", messages.len());
    Ok(Production::Messages(messages))
}

fn lab_order(record: &PatientRecord) -> ObservationRecord {
    ObservationRecord {
        category: Some(LAB_ORDER_CATEGORY.to_owned()),
        observation: Some(LAB_ORDER_TEST.to_owned()),
        placer_order_number: Some(format!("{PLACER_ORDER_PREFIX}{}", Uuid::new_v4())),
        filler_order_number: Some(format!("{FILLER_ORDER_PREFIX}{}", Uuid::new_v4())),
        status: Some(LAB_ORDER_STATUS.to_owned()),
        subject_reference: record.current_identifier().map(ToString::to_string),
        ..Default::default()
    }
}
