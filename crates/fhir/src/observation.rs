//! FHIR `Observation` wire model and translation.

use crate::datatypes::{
    normalise_timestamp, reference_of, CodeableConceptWire, QuantityWire, ReferenceWire,
};
use pas_types::{ObservationComponent, ObservationRecord, ObservationValue};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ObservationWire {
    pub status: Option<String>,

    #[serde(default)]
    pub category: Vec<CodeableConceptWire>,

    pub code: Option<CodeableConceptWire>,
    pub encounter: Option<ReferenceWire>,
    pub subject: Option<ReferenceWire>,

    #[serde(rename = "effectiveDateTime")]
    pub effective_date_time: Option<String>,

    pub issued: Option<String>,

    #[serde(rename = "valueQuantity")]
    pub value_quantity: Option<QuantityWire>,

    #[serde(rename = "valueCodeableConcept")]
    pub value_codeable_concept: Option<CodeableConceptWire>,

    #[serde(default)]
    pub component: Vec<ComponentWire>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ComponentWire {
    pub code: Option<CodeableConceptWire>,

    #[serde(rename = "valueQuantity")]
    pub value_quantity: Option<QuantityWire>,

    #[serde(rename = "valueCodeableConcept")]
    pub value_codeable_concept: Option<CodeableConceptWire>,

    #[serde(rename = "valueString")]
    pub value_string: Option<String>,
}

/// Converts an observation resource.
///
/// A quantity value takes precedence over a coded one. Order numbers are left empty; the
/// importer mints them.
pub(crate) fn wire_to_domain(wire: ObservationWire) -> ObservationRecord {
    let value = match (&wire.value_quantity, &wire.value_codeable_concept) {
        (Some(q), _) if q.render().is_some() => q.render().map(ObservationValue::Quantity),
        (_, Some(c)) => c.display_text().map(ObservationValue::Coded),
        _ => None,
    };

    let components = wire
        .component
        .iter()
        .map(|c| ObservationComponent {
            code_text: c.code.as_ref().and_then(|code| code.display_text()),
            result: c
                .value_string
                .clone()
                .or_else(|| {
                    c.value_codeable_concept
                        .as_ref()
                        .and_then(|v| v.display_text())
                })
                .or_else(|| c.value_quantity.as_ref().and_then(|q| q.render())),
        })
        .collect();

    ObservationRecord {
        category: wire.category.first().and_then(|c| c.first_code()),
        observation: wire.code.as_ref().and_then(|c| c.display_text()),
        placer_order_number: None,
        filler_order_number: None,
        status: wire.status,
        effective_date_time: normalise_timestamp(wire.effective_date_time),
        issued: normalise_timestamp(wire.issued),
        value,
        encounter_reference: reference_of(&wire.encounter),
        subject_reference: reference_of(&wire.subject),
        components,
    }
}
