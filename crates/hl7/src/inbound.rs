//! Extraction of patient and order/result data from inbound messages.

use crate::er7::{Er7Message, MessageType, Segment};
use crate::{Hl7Error, Hl7Result};
use chrono::NaiveDate;
use pas_types::{
    ClinicalIdentifier, Demographics, IdentifierSet, InboundRecord, ObservationComponent,
    ObservationRecord, ObservationValue,
};

/// Category given to every observation received over HL7.
const LABORATORY: &str = "laboratory";

/// Status for an order whose ORC-5 is empty.
const DEFAULT_ORDER_STATUS: &str = "SC";

/// Status for a result with neither OBR-25 nor ORC-5.
const DEFAULT_RESULT_STATUS: &str = "F";

/// OBX value types whose value is a coded concept or free text rather than a quantity.
const CODED_VALUE_TYPES: [&str; 3] = ["CE", "CWE", "TX"];

/// The parts of an inbound message the store acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_type: MessageType,
    pub control_id: Option<String>,
    /// Patient from the PID segment, with any order or result attached as an observation.
    /// `None` when the message has no PID.
    pub patient: Option<InboundRecord>,
}

impl InboundMessage {
    /// Parses ER7 text and extracts its patient and clinical payload.
    ///
    /// - PID-3 repetitions become candidate identifiers. Repetitions that are not canonical
    ///   clinical identifiers are skipped with a warning.
    /// - PID-2 becomes the source record id.
    /// - ORM^O01 and OML^O21 carry one observation request from OBR/ORC.
    /// - ORU^R01 carries one observation result from OBR/ORC/OBX.
    ///
    /// # Errors
    ///
    /// Returns an [`Hl7Error`] if the text cannot be parsed or PID-7 is missing or not a date.
    pub fn from_er7(text: &str) -> Hl7Result<Self> {
        let message = Er7Message::parse(text)?;
        Self::from_message(&message)
    }

    pub fn from_message(message: &Er7Message) -> Hl7Result<Self> {
        let message_type = message.message_type();
        let control_id = message.control_id().map(str::to_owned);

        let Some(pid) = message.segment("PID") else {
            tracing::debug!("{message_type} message has no PID segment");
            return Ok(Self {
                message_type,
                control_id,
                patient: None,
            });
        };

        let mut patient = patient_from_pid(pid)?;
        let subject = patient
            .identifiers
            .candidates()
            .first()
            .map(|id| id.to_string());

        let observation = match message_type {
            MessageType::OrmO01 | MessageType::OmlO21 => Some(order_observation(message)),
            MessageType::OruR01 => Some(result_observation(message)),
            _ => None,
        };
        if let Some(mut observation) = observation {
            observation.subject_reference = subject;
            patient.observations.push(observation);
        }

        Ok(Self {
            message_type,
            control_id,
            patient: Some(patient),
        })
    }
}

fn patient_from_pid(pid: &Segment) -> Hl7Result<InboundRecord> {
    let raw_birth = pid.field(7).ok_or(Hl7Error::MissingField("PID-7"))?;
    let birth_date = parse_birth_date(raw_birth).ok_or_else(|| Hl7Error::InvalidField {
        field: "PID-7",
        value: raw_birth.to_owned(),
    })?;

    let mut identifiers = Vec::new();
    for repetition in pid.repetitions(3) {
        match ClinicalIdentifier::parse(repetition) {
            Ok(id) => identifiers.push(id),
            Err(e) => tracing::warn!("ignoring PID-3 repetition '{repetition}': {e}"),
        }
    }

    let demographics = Demographics {
        gender: pid.text(8),
        ssn: pid.text(19),
        first_name: pid.component_text(5, 2),
        middle_name: pid.component_text(5, 3),
        last_name: pid.component_text(5, 1),
        address: pid.component_text(11, 1),
        address_2: pid.component_text(11, 2),
        city: pid.component_text(11, 3),
        country: None,
        post_code: pid.component_text(11, 5),
        country_code: pid.component_text(11, 6),
    };

    let mut record = InboundRecord::new(birth_date);
    record.id = pid.field(2).map(str::to_owned);
    record.identifiers = IdentifierSet::List(identifiers);
    record.demographics = demographics;
    Ok(record)
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD` and timestamps that start with `YYYYMMDD`.
fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            raw.get(..8)
                .filter(|head| head.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y%m%d").ok())
        })
}

fn order_observation(message: &Er7Message) -> ObservationRecord {
    let orc = message.segment("ORC");
    let obr = message.segment("OBR");

    ObservationRecord {
        category: Some(LABORATORY.to_owned()),
        observation: obr.and_then(|s| s.component_text(4, 2)),
        placer_order_number: orc.and_then(|s| s.text(2)),
        filler_order_number: orc.and_then(|s| s.text(3)),
        status: Some(
            orc.and_then(|s| s.text(5))
                .unwrap_or_else(|| DEFAULT_ORDER_STATUS.to_owned()),
        ),
        issued: obr.and_then(|s| s.text(6)),
        ..Default::default()
    }
}

fn result_observation(message: &Er7Message) -> ObservationRecord {
    let orc = message.segment("ORC");
    let obr = message.segment("OBR");

    let status = obr
        .and_then(|s| s.text(25))
        .or_else(|| orc.and_then(|s| s.text(5)))
        .unwrap_or_else(|| DEFAULT_RESULT_STATUS.to_owned());

    let obx: Vec<&Segment> = message.segments("OBX").collect();
    let (value, components) = match obx.as_slice() {
        [] => (None, Vec::new()),
        [single] => (Some(single_value(single)), Vec::new()),
        many => (
            None,
            many.iter()
                .map(|s| ObservationComponent {
                    code_text: s.text(3),
                    result: Some(value_with_units(s)),
                })
                .collect(),
        ),
    };

    ObservationRecord {
        category: Some(LABORATORY.to_owned()),
        observation: obr.and_then(|s| s.component_text(4, 2)),
        placer_order_number: orc.and_then(|s| s.text(2)),
        filler_order_number: orc.and_then(|s| s.text(3)),
        status: Some(status),
        effective_date_time: obr.and_then(|s| s.text(7)),
        issued: obr.and_then(|s| s.text(6)),
        value,
        components,
        ..Default::default()
    }
}

fn single_value(obx: &Segment) -> ObservationValue {
    let value_type = obx.field(2).unwrap_or_default();
    if CODED_VALUE_TYPES.contains(&value_type) {
        ObservationValue::Coded(obx.text(5).unwrap_or_default())
    } else {
        ObservationValue::Quantity(value_with_units(obx))
    }
}

/// `OBX-5 OBX-6`, trimmed when either is empty.
fn value_with_units(obx: &Segment) -> String {
    format!(
        "{} {}",
        obx.text(5).unwrap_or_default(),
        obx.text(6).unwrap_or_default()
    )
    .trim()
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    const MSH: &str = "MSH|^~\\&|LAB|MATER|PAMS|PAMS|202401150930";

    fn message(kind: &str, body: &[&str]) -> String {
        let mut lines = vec![format!("{MSH}||{kind}|CTRL1|T|2.4")];
        lines.extend(body.iter().map(|s| s.to_string()));
        lines.join("\r")
    }

    const PID: &str = "PID|1|a1b2c3d4-e5f6-0102-0304-05060708090a|SYN00001^^^PAS^MR~BAD~SYN0000A^^^PAS^MR||Smith^John^Paul||1980-05-17|M|||1 High St^Flat 2^Leeds^^LS1 1AA^GB||||||||999-12-3456";

    #[test]
    fn test_extracts_patient() {
        let msg = InboundMessage::from_er7(&message("ADT^A01", &[PID])).expect("parse");
        assert_eq!(msg.message_type, MessageType::AdtA01);
        assert_eq!(msg.control_id.as_deref(), Some("CTRL1"));

        let patient = msg.patient.expect("patient");
        assert_eq!(
            patient.id.as_deref(),
            Some("a1b2c3d4-e5f6-0102-0304-05060708090a")
        );
        assert_eq!(patient.birth_date, date(1980, 5, 17));
        let ids: Vec<String> = patient
            .identifiers
            .candidates()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(ids, vec!["SYN00001^^^PAS^MR", "SYN0000A^^^PAS^MR"]);

        let d = &patient.demographics;
        assert_eq!(d.last_name.as_deref(), Some("Smith"));
        assert_eq!(d.first_name.as_deref(), Some("John"));
        assert_eq!(d.middle_name.as_deref(), Some("Paul"));
        assert_eq!(d.gender.as_deref(), Some("M"));
        assert_eq!(d.address_2.as_deref(), Some("Flat 2"));
        assert_eq!(d.city.as_deref(), Some("Leeds"));
        assert_eq!(d.post_code.as_deref(), Some("LS1 1AA"));
        assert_eq!(d.country_code.as_deref(), Some("GB"));
        assert_eq!(d.ssn.as_deref(), Some("999-12-3456"));
        assert!(patient.observations.is_empty());
    }

    #[test]
    fn test_compact_birth_date_and_missing_pid2() {
        let msg = InboundMessage::from_er7(&message(
            "ADT^A01",
            &["PID|1||SYN00001^^^PAS^MR||Doe^Jane||19991231000000|F"],
        ))
        .expect("parse");
        let patient = msg.patient.expect("patient");
        assert_eq!(patient.id, None);
        assert_eq!(patient.birth_date, date(1999, 12, 31));
    }

    #[test]
    fn test_missing_birth_date_is_an_error() {
        let err = InboundMessage::from_er7(&message("ADT^A01", &["PID|1||SYN00001^^^PAS^MR"]))
            .expect_err("should fail");
        assert!(matches!(err, Hl7Error::MissingField("PID-7")));

        let err = InboundMessage::from_er7(&message(
            "ADT^A01",
            &["PID|1||SYN00001^^^PAS^MR||Doe^Jane||17/05/1980"],
        ))
        .expect_err("should fail");
        assert!(matches!(err, Hl7Error::InvalidField { field: "PID-7", .. }));
    }

    #[test]
    fn test_message_without_pid() {
        let msg = InboundMessage::from_er7(&message("ORM^O01", &["ORC|NW|PL-1|FL-1"]))
            .expect("parse");
        assert_eq!(msg.patient, None);
    }

    #[test]
    fn test_order_extraction() {
        let msg = InboundMessage::from_er7(&message(
            "ORM^O01",
            &[PID, "ORC|NW|PL-1|FL-1", "OBR|1|PL-1|FL-1|24325-3^Liver Function Test||202401140800"],
        ))
        .expect("parse");
        let patient = msg.patient.expect("patient");
        let order = &patient.observations[0];
        assert_eq!(order.category.as_deref(), Some("laboratory"));
        assert_eq!(order.observation.as_deref(), Some("Liver Function Test"));
        assert_eq!(order.placer_order_number.as_deref(), Some("PL-1"));
        assert_eq!(order.filler_order_number.as_deref(), Some("FL-1"));
        assert_eq!(order.status.as_deref(), Some("SC"));
        assert_eq!(order.issued.as_deref(), Some("202401140800"));
        assert_eq!(order.subject_reference.as_deref(), Some("SYN00001^^^PAS^MR"));
        assert_eq!(order.value, None);
    }

    #[test]
    fn test_single_obx_result() {
        let msg = InboundMessage::from_er7(&message(
            "ORU^R01",
            &[
                PID,
                "ORC|RE|PL-1|FL-1||CM",
                "OBR|1|PL-1|FL-1|^Glucose||202401140800|202401140900",
                "OBX|1|NM|GLU^Glucose||5.4|mmol/L|||||F",
            ],
        ))
        .expect("parse");
        let result = &msg.patient.expect("patient").observations[0];
        assert_eq!(result.status.as_deref(), Some("CM"));
        assert_eq!(result.effective_date_time.as_deref(), Some("202401140900"));
        assert_eq!(
            result.value,
            Some(ObservationValue::Quantity("5.4 mmol/L".into()))
        );
        assert!(result.components.is_empty());
    }

    #[test]
    fn test_coded_obx_result_and_default_status() {
        let msg = InboundMessage::from_er7(&message(
            "ORU^R01",
            &[
                PID,
                "ORC|RE|PL-2|FL-2",
                "OBR|1|PL-2|FL-2|^Ankle X-ray",
                "OBX|1|TX|R-ANKLE^Ankle X-ray^L||Normal findings, no fracture detected||||||F",
            ],
        ))
        .expect("parse");
        let result = &msg.patient.expect("patient").observations[0];
        assert_eq!(result.status.as_deref(), Some("F"));
        assert_eq!(
            result.value,
            Some(ObservationValue::Coded(
                "Normal findings, no fracture detected".into()
            ))
        );
    }

    #[test]
    fn test_obr25_status_wins() {
        let mut obr = String::from("OBR|1|PL-3|FL-3|^Panel");
        obr.push_str(&"|".repeat(21));
        obr.push('P');
        let msg = InboundMessage::from_er7(&message(
            "ORU^R01",
            &[PID, "ORC|RE|PL-3|FL-3||CM", &obr],
        ))
        .expect("parse");
        let result = &msg.patient.expect("patient").observations[0];
        assert_eq!(result.status.as_deref(), Some("P"));
    }

    #[test]
    fn test_multiple_obx_become_components() {
        let msg = InboundMessage::from_er7(&message(
            "ORU^R01",
            &[
                PID,
                "ORC|RE|PL-4|FL-4",
                "OBR|1|PL-4|FL-4|^Liver Function Test",
                "OBX|1|NM|ALT||32|U/L",
                "OBX|2|NM|AST||28|U/L",
            ],
        ))
        .expect("parse");
        let result = &msg.patient.expect("patient").observations[0];
        assert_eq!(result.value, None);
        assert_eq!(
            result.components,
            vec![
                ObservationComponent {
                    code_text: Some("ALT".into()),
                    result: Some("32 U/L".into()),
                },
                ObservationComponent {
                    code_text: Some("AST".into()),
                    result: Some("28 U/L".into()),
                },
            ]
        );
    }
}
