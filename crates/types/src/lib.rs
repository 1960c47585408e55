//! Shared domain model for the patient administration store.
//!
//! These types carry no persistence or wire concerns. Boundary crates (`fhir`, `hl7`) translate
//! into them, and `pas-core` maps them to and from stored documents.

pub mod calendar;
mod identifiers;
mod record;

pub use calendar::{age_on, birth_date_window, shift_years, CalendarError};
pub use identifiers::IdentifierSet;
pub use record::{
    ConditionRecord, Demographics, InboundRecord, ObservationComponent, ObservationRecord,
    ObservationValue, PatientRecord,
};

// Re-exported so callers do not need a direct dependency on the codec crate.
pub use pas_identifiers::{ClinicalIdentifier, HexIdentifier, IdentifierError};
