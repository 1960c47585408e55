//! FHIR resource-bundle boundary for the patient administration store.
//!
//! This crate provides **wire models** and **translation helpers** for FHIR R4 JSON bundles as
//! produced by synthetic patient generators:
//! - `Bundle` resources holding `Patient`, `Condition` and `Observation` entries
//!
//! This crate focuses on:
//! - deserialisation of the subset of each resource the store keeps
//! - translation from wire structs into `pas-types` inbound records
//!
//! Inbound bundles carry far more than is extracted here, so the wire structs ignore unknown
//! fields rather than rejecting them. Resource types other than the three above are skipped.

mod bundle;
mod condition;
mod datatypes;
mod observation;
mod patient;

pub use bundle::Bundle;

/// Identifier system for US social security numbers.
pub const SSN_SYSTEM: &str = "http://hl7.org/fhir/sid/us-ssn";

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
