//! FHIR `Condition` wire model and translation.

use crate::datatypes::{normalise_timestamp, reference_of, CodeableConceptWire, ReferenceWire};
use pas_types::ConditionRecord;
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ConditionWire {
    pub code: Option<CodeableConceptWire>,

    #[serde(rename = "clinicalStatus")]
    pub clinical_status: Option<CodeableConceptWire>,

    #[serde(rename = "verificationStatus")]
    pub verification_status: Option<CodeableConceptWire>,

    #[serde(rename = "onsetDateTime")]
    pub onset_date_time: Option<String>,

    #[serde(rename = "recordedDate")]
    pub recorded_date: Option<String>,

    #[serde(rename = "abatementDateTime")]
    pub abatement_date_time: Option<String>,

    pub encounter: Option<ReferenceWire>,
    pub subject: Option<ReferenceWire>,
}

/// Converts a condition resource. The abatement time is only kept for resolved conditions.
pub(crate) fn wire_to_domain(wire: ConditionWire) -> ConditionRecord {
    let clinical_status = wire.clinical_status.as_ref().and_then(|c| c.first_code());
    let abatement_time = if clinical_status.as_deref() == Some("resolved") {
        normalise_timestamp(wire.abatement_date_time)
    } else {
        None
    };

    ConditionRecord {
        condition: wire.code.as_ref().and_then(|c| c.display_text()),
        snomed_code: wire.code.as_ref().and_then(|c| c.first_code()),
        clinical_status,
        verification_status: wire.verification_status.as_ref().and_then(|c| c.first_code()),
        onset_date_time: normalise_timestamp(wire.onset_date_time),
        recorded_date: normalise_timestamp(wire.recorded_date),
        abatement_time,
        encounter_reference: reference_of(&wire.encounter),
        subject_reference: reference_of(&wire.subject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(status: &str) -> ConditionWire {
        serde_json::from_str(&format!(
            r#"{{
                "clinicalStatus": {{"coding": [{{"code": "{status}"}}]}},
                "verificationStatus": {{"coding": [{{"code": "confirmed"}}]}},
                "code": {{"coding": [{{"system": "http://snomed.info/sct", "code": "444814009"}}], "text": "Viral sinusitis"}},
                "subject": {{"reference": "urn:uuid:p1"}},
                "encounter": {{"reference": "urn:uuid:e1"}},
                "onsetDateTime": "2015-04-02T09:00:00+01:00",
                "abatementDateTime": "2015-04-20T09:00:00+01:00",
                "recordedDate": "2015-04-02T09:00:00+01:00"
            }}"#
        ))
        .expect("condition wire")
    }

    #[test]
    fn test_resolved_condition_keeps_abatement() {
        let record = wire_to_domain(condition("resolved"));
        assert_eq!(record.condition.as_deref(), Some("Viral sinusitis"));
        assert_eq!(record.snomed_code.as_deref(), Some("444814009"));
        assert_eq!(record.verification_status.as_deref(), Some("confirmed"));
        assert_eq!(
            record.abatement_time.as_deref(),
            Some("2015-04-20T09:00:00+01:00")
        );
        assert_eq!(record.encounter_reference.as_deref(), Some("urn:uuid:e1"));
    }

    #[test]
    fn test_active_condition_drops_abatement() {
        let record = wire_to_domain(condition("active"));
        assert_eq!(record.clinical_status.as_deref(), Some("active"));
        assert_eq!(record.abatement_time, None);
    }
}
