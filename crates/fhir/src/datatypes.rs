//! FHIR datatypes shared by several resources, and helpers for reading them.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

/// Wire representation of a `Coding`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct CodingWire {
    pub code: Option<String>,
    pub display: Option<String>,
}

/// Wire representation of a `CodeableConcept`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct CodeableConceptWire {
    #[serde(default)]
    pub coding: Vec<CodingWire>,
    pub text: Option<String>,
}

impl CodeableConceptWire {
    /// Code of the first coding.
    pub fn first_code(&self) -> Option<String> {
        self.coding.first().and_then(|c| c.code.clone())
    }

    /// Display text, falling back to the first coding's display.
    pub fn display_text(&self) -> Option<String> {
        self.text
            .clone()
            .or_else(|| self.coding.first().and_then(|c| c.display.clone()))
    }
}

/// Wire representation of a `Quantity`.
///
/// The value is kept as a JSON number so that it renders exactly as it was written.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct QuantityWire {
    pub value: Option<serde_json::Number>,
    pub unit: Option<String>,
}

impl QuantityWire {
    /// `<value><unit>` with no separator, for example `7.2mmol/L`.
    pub fn render(&self) -> Option<String> {
        let value = self.value.as_ref()?;
        Some(format!("{value}{}", self.unit.as_deref().unwrap_or_default()))
    }
}

/// Wire representation of a `Reference`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ReferenceWire {
    pub reference: Option<String>,
}

pub(crate) fn reference_of(reference: &Option<ReferenceWire>) -> Option<String> {
    reference.as_ref().and_then(|r| r.reference.clone())
}

/// Normalises a FHIR `dateTime`/`instant` string.
///
/// Full timestamps are re-rendered in RFC 3339; partial dates are passed through unchanged.
pub(crate) fn normalise_timestamp(value: Option<String>) -> Option<String> {
    value.map(|raw| match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => parsed.to_rfc3339(),
        Err(_) => raw,
    })
}

/// Parses a FHIR `date` (`YYYY-MM-DD`).
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_renders_value_and_unit() {
        let q: QuantityWire =
            serde_json::from_str(r#"{"value": 7.2, "unit": "mmol/L"}"#).expect("quantity");
        assert_eq!(q.render().as_deref(), Some("7.2mmol/L"));

        let whole: QuantityWire =
            serde_json::from_str(r#"{"value": 80, "unit": "kg"}"#).expect("quantity");
        assert_eq!(whole.render().as_deref(), Some("80kg"));
    }

    #[test]
    fn test_quantity_without_value_renders_nothing() {
        let q = QuantityWire {
            value: None,
            unit: Some("kg".into()),
        };
        assert_eq!(q.render(), None);
    }

    #[test]
    fn test_normalise_timestamp() {
        assert_eq!(
            normalise_timestamp(Some("2019-01-07T10:15:00+00:00".into())).as_deref(),
            Some("2019-01-07T10:15:00+00:00")
        );
        assert_eq!(
            normalise_timestamp(Some("2019-01-07T10:15:00Z".into())).as_deref(),
            Some("2019-01-07T10:15:00+00:00")
        );
        assert_eq!(
            normalise_timestamp(Some("2019-01".into())).as_deref(),
            Some("2019-01")
        );
        assert_eq!(normalise_timestamp(None), None);
    }

    #[test]
    fn test_display_text_falls_back_to_coding() {
        let concept: CodeableConceptWire = serde_json::from_str(
            r#"{"coding": [{"system": "http://snomed.info/sct", "code": "44054006", "display": "Diabetes"}]}"#,
        )
        .expect("concept");
        assert_eq!(concept.display_text().as_deref(), Some("Diabetes"));
        assert_eq!(concept.first_code().as_deref(), Some("44054006"));
    }
}
