//! Outbound message builders.
//!
//! Each builder renders a complete ER7 message, segments terminated by CR. The patient is
//! identified in PID-3 by the record's current clinical identifier. Visit numbers and request
//! times are synthetic and drawn from the caller's random source.

use crate::control::ControlIdCounter;
use crate::er7::{escape, Delimiters, MessageType};
use crate::{Hl7Error, Hl7Result};
use chrono::{DateTime, Duration, NaiveDateTime};
use pas_types::{ObservationRecord, ObservationValue, PatientRecord};
use rand::{Rng, RngCore};

const SENDING_APPLICATION: &str = "ULTRA";
const SENDING_FACILITY: &str = "MATER";
const RECEIVING_APPLICATION: &str = "PAMS";
const RECEIVING_FACILITY: &str = "PAMS";
const PROCESSING_ID: &str = "T";
const VERSION_ID: &str = "2.4";

/// Shared state for building a batch of messages.
pub struct MessageContext<'a> {
    pub counter: &'a mut ControlIdCounter,
    /// Message time (MSH-7) and the reference point for synthetic request times.
    pub now: NaiveDateTime,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> MessageContext<'a> {
    pub fn new(counter: &'a mut ControlIdCounter, now: NaiveDateTime, rng: &'a mut dyn RngCore) -> Self {
        Self { counter, now, rng }
    }

    /// A time between one and seven days before `now`, as an HL7 timestamp.
    fn recent_time(&mut self) -> String {
        let days = self.rng.gen_range(1..=7);
        (self.now - Duration::days(days))
            .format("%Y%m%d%H%M")
            .to_string()
    }

    /// Three digits.
    fn visit_number(&mut self) -> String {
        format!("{:03}", self.rng.gen_range(0..1000))
    }

    /// Three digits followed by two uppercase letters.
    fn visit_institution(&mut self) -> String {
        let letters: String = (0..2)
            .map(|_| char::from(b'A' + self.rng.gen_range(0..26u8)))
            .collect();
        format!("{:03}{letters}", self.rng.gen_range(0..1000))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// ADT^A01: MSH, EVN, PID, PV1.
///
/// # Errors
///
/// Returns [`Hl7Error::MissingIdentifier`] if the record has no current identifier.
pub fn adt_a01(record: &PatientRecord, ctx: &mut MessageContext<'_>) -> Hl7Result<String> {
    let message_type = MessageType::AdtA01;
    let pid = pid(record, ctx)?;
    Ok(render(&[
        msh(&message_type, ctx),
        evn(&message_type, ctx),
        pid,
        pv1(ctx),
    ]))
}

/// ORM^O01: MSH, PID, PV1, ORC, OBR.
///
/// # Errors
///
/// Returns [`Hl7Error::MissingIdentifier`] if the record has no current identifier.
pub fn orm_o01(
    record: &PatientRecord,
    order: &ObservationRecord,
    ctx: &mut MessageContext<'_>,
) -> Hl7Result<String> {
    let pid = pid(record, ctx)?;
    Ok(render(&[
        msh(&MessageType::OrmO01, ctx),
        pid,
        pv1(ctx),
        orc("NW", order),
        obr(order, false, ctx),
    ]))
}

/// ORU^R01: MSH, PID, PV1, ORC, OBR, then one OBX for a single value or one per component.
///
/// # Errors
///
/// Returns [`Hl7Error::MissingIdentifier`] if the record has no current identifier.
pub fn oru_r01(
    record: &PatientRecord,
    result: &ObservationRecord,
    ctx: &mut MessageContext<'_>,
) -> Hl7Result<String> {
    let pid = pid(record, ctx)?;
    let mut segments = vec![
        msh(&MessageType::OruR01, ctx),
        pid,
        pv1(ctx),
        orc("RE", result),
        obr(result, true, ctx),
    ];
    segments.extend(obx(result));
    Ok(render(&segments))
}

/// OML^O21: MSH, PID, ORC, OBR.
///
/// # Errors
///
/// Returns [`Hl7Error::MissingIdentifier`] if the record has no current identifier.
pub fn oml_o21(
    record: &PatientRecord,
    order: &ObservationRecord,
    ctx: &mut MessageContext<'_>,
) -> Hl7Result<String> {
    let pid = pid(record, ctx)?;
    Ok(render(&[
        msh(&MessageType::OmlO21, ctx),
        pid,
        orc("NW", order),
        obr(order, false, ctx),
    ]))
}

fn render(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push_str(segment);
        out.push('\r');
    }
    out
}

// ============================================================================
// Segments
// ============================================================================

fn text(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(|v| escape(v, &Delimiters::default()))
        .unwrap_or_default()
}

/// FHIR timestamps are rewritten as `yyyyMMddHHmm`; anything else is passed through.
fn hl7_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.format("%Y%m%d%H%M").to_string(),
        Err(_) => escape(raw, &Delimiters::default()),
    }
}

fn msh(message_type: &MessageType, ctx: &mut MessageContext<'_>) -> String {
    let delimiters = Delimiters::default();
    let control_id = ctx.counter.next_id(ctx.now);
    format!(
        "MSH|{enc}|{SENDING_APPLICATION}|{SENDING_FACILITY}|{RECEIVING_APPLICATION}|{RECEIVING_FACILITY}|{time}||{message_type}|{control_id}|{PROCESSING_ID}|{VERSION_ID}|||AL|NE",
        enc = delimiters.encoding_characters(),
        time = ctx.now.format("%Y%m%d%H%M"),
    )
}

fn evn(message_type: &MessageType, ctx: &mut MessageContext<'_>) -> String {
    let (_, trigger) = message_type.parts();
    format!("EVN|{trigger}|{}", ctx.recent_time())
}

fn pid(record: &PatientRecord, ctx: &mut MessageContext<'_>) -> Hl7Result<String> {
    let identifier = record
        .current_identifier()
        .ok_or_else(|| Hl7Error::MissingIdentifier(record.id.clone()))?;
    let d = &record.demographics;

    let sex = d
        .gender
        .as_deref()
        .and_then(|g| g.chars().next())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default();

    Ok(format!(
        "PID|1||{identifier}||{last}^{first}^{middle}||{birth}|{sex}|||{address}^{address_2}^{city}^^{post_code}^{country_code}|||||||{visit}^{institution}",
        last = text(&d.last_name),
        first = text(&d.first_name),
        middle = text(&d.middle_name),
        birth = record.birth_date.format("%Y-%m-%d"),
        address = text(&d.address),
        address_2 = text(&d.address_2),
        city = text(&d.city),
        post_code = text(&d.post_code),
        country_code = text(&d.country_code),
        visit = ctx.visit_number(),
        institution = ctx.visit_institution(),
    ))
}

fn pv1(ctx: &mut MessageContext<'_>) -> String {
    format!(
        "PV1|1|O|{}||||^ACON|^ANAESTHETICS CONS^^^^^^L|^ANAESTHETICS CONS^^^^^^^AUSHICPR",
        ctx.visit_institution()
    )
}

fn orc(order_control: &str, order: &ObservationRecord) -> String {
    format!(
        "ORC|{order_control}|{}|{}||{}",
        text(&order.placer_order_number),
        text(&order.filler_order_number),
        text(&order.status),
    )
}

fn obr(order: &ObservationRecord, with_status: bool, ctx: &mut MessageContext<'_>) -> String {
    let requested = match order.issued.as_deref() {
        Some(raw) => hl7_timestamp(raw),
        None => ctx.recent_time(),
    };
    let observed = match order.effective_date_time.as_deref() {
        Some(raw) => hl7_timestamp(raw),
        None => ctx.recent_time(),
    };
    let status = if with_status {
        text(&order.status)
    } else {
        String::new()
    };
    let quantity_timing = ctx.recent_time();

    format!(
        "OBR|1|{placer}|{filler}|^{name}||{requested}|{observed}|||||||||WACON^TEST||||||||BI^UHC|{status}||^^^{quantity_timing}^^E",
        placer = text(&order.placer_order_number),
        filler = text(&order.filler_order_number),
        name = text(&order.observation),
    )
}

fn obx(result: &ObservationRecord) -> Vec<String> {
    let line = |set_id: usize, value_type: &str, code: &str, value: &str| {
        format!("OBX|{set_id}|{value_type}|{code}||{value}||||||F")
    };
    let name = text(&result.observation);

    if !result.components.is_empty() {
        return result
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| line(i + 1, "ST", &text(&c.code_text), &text(&c.result)))
            .collect();
    }

    match &result.value {
        Some(ObservationValue::Quantity(q)) => {
            vec![line(1, "ST", &name, &text(&Some(q.clone())))]
        }
        Some(ObservationValue::Coded(c)) => {
            vec![line(1, "TX", &name, &text(&Some(c.clone())))]
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::er7::Er7Message;
    use crate::InboundMessage;
    use chrono::NaiveDate;
    use pas_types::{ClinicalIdentifier, ObservationComponent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .expect("date")
            .and_hms_opt(9, 30, 0)
            .expect("time")
    }

    fn record() -> PatientRecord {
        let birth = NaiveDate::from_ymd_opt(1980, 1, 1).expect("date");
        let mut record = PatientRecord::new("p-0001", birth, 44, now().date());
        record.insert_identifier(
            birth,
            ClinicalIdentifier::parse("SYN0004Z^^^PAS^MR").expect("identifier"),
        );
        record.demographics.first_name = Some("Ann".into());
        record.demographics.last_name = Some("O|Neil".into());
        record.demographics.gender = Some("female".into());
        record.demographics.city = Some("Leeds".into());
        record
    }

    fn order() -> ObservationRecord {
        ObservationRecord {
            observation: Some("Liver Function Test".into()),
            placer_order_number: Some("PL-1".into()),
            filler_order_number: Some("FL-1".into()),
            status: Some("SC".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_adt_a01_segments() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);

        let text = adt_a01(&record(), &mut ctx).expect("build");
        assert!(text.ends_with('\r'));

        let msg = Er7Message::parse(&text).expect("parse");
        let names: Vec<&str> = text
            .split('\r')
            .filter(|s| !s.is_empty())
            .map(|s| &s[..3])
            .collect();
        assert_eq!(names, vec!["MSH", "EVN", "PID", "PV1"]);

        let msh = msg.header();
        assert_eq!(msh.field(3), Some("ULTRA"));
        assert_eq!(msh.field(6), Some("PAMS"));
        assert_eq!(msh.field(7), Some("202401150930"));
        assert_eq!(msh.field(12), Some("2.4"));
        assert_eq!(msh.field(15), Some("AL"));
        assert_eq!(msh.field(16), Some("NE"));
        assert_eq!(msg.message_type(), MessageType::AdtA01);
        assert_eq!(msg.control_id(), Some("202401150930000000"));

        let pid = msg.segment("PID").expect("PID");
        assert_eq!(pid.field(3), Some("SYN0004Z^^^PAS^MR"));
        assert_eq!(pid.component_text(5, 1).as_deref(), Some("O|Neil"));
        assert_eq!(pid.field(7), Some("1980-01-01"));
        assert_eq!(pid.field(8), Some("F"));
        assert_eq!(pid.component(11, 3), Some("Leeds"));
        assert!(pid.component(18, 2).is_some_and(|v| v.len() == 5));

        let evn = msg.segment("EVN").expect("EVN");
        assert_eq!(evn.field(1), Some("A01"));
    }

    #[test]
    fn test_missing_identifier_is_an_error() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);
        let bare = PatientRecord::new("p-0002", now().date(), 0, now().date());

        let err = adt_a01(&bare, &mut ctx).expect_err("should fail");
        assert!(matches!(err, Hl7Error::MissingIdentifier(id) if id == "p-0002"));
    }

    #[test]
    fn test_oml_o21_round_trips_order() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);

        let text = oml_o21(&record(), &order(), &mut ctx).expect("build");
        let inbound = InboundMessage::from_er7(&text).expect("parse");
        assert_eq!(inbound.message_type, MessageType::OmlO21);

        let patient = inbound.patient.expect("patient");
        assert_eq!(patient.birth_date, NaiveDate::from_ymd_opt(1980, 1, 1).expect("date"));
        assert_eq!(patient.demographics.last_name.as_deref(), Some("O|Neil"));
        let parsed = &patient.observations[0];
        assert!(parsed.answers(&order()));
        assert_eq!(parsed.status.as_deref(), Some("SC"));
    }

    #[test]
    fn test_oru_r01_round_trips_result() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(2);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);

        let mut result = order();
        result.status = Some("F".into());
        result.issued = Some("2024-01-14T08:00:00+00:00".into());
        result.value = Some(ObservationValue::Coded("Normal".into()));

        let text = oru_r01(&record(), &result, &mut ctx).expect("build");
        let parsed = InboundMessage::from_er7(&text)
            .expect("parse")
            .patient
            .expect("patient")
            .observations
            .remove(0);
        assert!(parsed.answers(&result));
        assert_eq!(parsed.status.as_deref(), Some("F"));
        assert_eq!(parsed.issued.as_deref(), Some("202401140800"));
        assert_eq!(parsed.value, Some(ObservationValue::Coded("Normal".into())));
    }

    #[test]
    fn test_oru_r01_components() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);

        let mut result = order();
        result.components = vec![
            ObservationComponent {
                code_text: Some("ALT".into()),
                result: Some("32 U/L".into()),
            },
            ObservationComponent {
                code_text: Some("AST".into()),
                result: Some("28 U/L".into()),
            },
        ];

        let text = oru_r01(&record(), &result, &mut ctx).expect("build");
        let parsed = InboundMessage::from_er7(&text)
            .expect("parse")
            .patient
            .expect("patient")
            .observations
            .remove(0);
        assert_eq!(parsed.components, result.components);
    }

    #[test]
    fn test_control_ids_advance_across_messages() {
        let mut counter = ControlIdCounter::new();
        let mut rng = StdRng::seed_from_u64(4);
        let mut ctx = MessageContext::new(&mut counter, now(), &mut rng);

        let first = adt_a01(&record(), &mut ctx).expect("build");
        let second = orm_o01(&record(), &order(), &mut ctx).expect("build");
        let id = |t: &str| {
            Er7Message::parse(t)
                .expect("parse")
                .control_id()
                .map(str::to_owned)
        };
        assert_eq!(id(&first).as_deref(), Some("202401150930000000"));
        assert_eq!(id(&second).as_deref(), Some("202401150930000001"));
    }
}
