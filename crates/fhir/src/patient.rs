//! FHIR `Patient` wire model and translation into an inbound record.

use crate::datatypes::parse_date;
use crate::{FhirError, FhirResult, SSN_SYSTEM};
use pas_types::{Demographics, InboundRecord};
use serde::Deserialize;

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct PatientWire {
    pub id: Option<String>,

    #[serde(rename = "birthDate")]
    pub birth_date: Option<String>,

    pub gender: Option<String>,

    #[serde(default)]
    pub identifier: Vec<IdentifierWire>,

    #[serde(default)]
    pub name: Vec<HumanNameWire>,

    #[serde(default)]
    pub address: Vec<AddressWire>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct IdentifierWire {
    pub system: Option<String>,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct HumanNameWire {
    pub family: Option<String>,

    #[serde(default)]
    pub given: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct AddressWire {
    #[serde(default)]
    pub line: Vec<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "postalCode")]
    pub postal_code: Option<String>,
}

// ============================================================================
// Translation
// ============================================================================

/// Converts a patient resource into an inbound record with no clinical content yet.
///
/// Only the first name and first address are used. The SSN is the value of the first
/// identifier whose system is [`SSN_SYSTEM`].
///
/// # Errors
///
/// Returns [`FhirError::InvalidInput`] if `birthDate` is missing or not `YYYY-MM-DD`.
pub(crate) fn wire_to_inbound(wire: PatientWire) -> FhirResult<InboundRecord> {
    let raw_birth = wire.birth_date.as_deref().ok_or_else(|| {
        FhirError::InvalidInput(format!(
            "Patient {} has no birthDate",
            wire.id.as_deref().unwrap_or("<no id>")
        ))
    })?;
    let birth_date = parse_date(raw_birth).ok_or_else(|| {
        FhirError::InvalidInput(format!("Patient birthDate '{raw_birth}' is not YYYY-MM-DD"))
    })?;

    let ssn = wire
        .identifier
        .iter()
        .find(|i| i.system.as_deref() == Some(SSN_SYSTEM))
        .and_then(|i| i.value.clone());

    let name = wire.name.first();
    let address = wire.address.first();

    let demographics = Demographics {
        gender: wire.gender,
        ssn,
        first_name: name.and_then(|n| n.given.first().cloned()),
        middle_name: name.and_then(|n| n.given.get(1).cloned()),
        last_name: name.and_then(|n| n.family.clone()),
        address: address.and_then(|a| a.line.first().cloned()),
        address_2: address.and_then(|a| a.line.get(1).cloned()),
        city: address.and_then(|a| a.city.clone()),
        country: address.and_then(|a| a.country.clone()),
        post_code: address.and_then(|a| a.postal_code.clone()),
        country_code: None,
    };

    let mut inbound = InboundRecord::new(birth_date);
    inbound.id = wire.id;
    inbound.demographics = demographics;
    Ok(inbound)
}
