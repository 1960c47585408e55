//! # PAS Core
//!
//! Core business logic for the patient administration store.
//!
//! This crate owns every operation on stored patient records:
//! - issuing clinical identifiers from the contents of the store ([`IdentifierAllocator`])
//! - persisting, finding and merging records ([`RecordStore`])
//! - projecting ages and birth dates as time passes ([`AgeProjection`])
//! - applying inbound HL7 messages ([`MessageReconciler`]) and FHIR bundles ([`importer`])
//! - building outbound messages from stored records ([`producers`])
//!
//! Storage goes through the [`store::DocumentStore`] trait. Wire formats live in the `fhir` and
//! `hl7` crates; this crate only sees their parsed records.
//!
//! **No process concerns**: environment variables, argument parsing and log installation
//! belong in the `pas-cli` binary.

pub mod allocator;
pub mod clock;
pub mod config;
pub mod constants;
pub mod document;
mod error;
pub mod importer;
pub mod producers;
pub mod projection;
pub mod reconciler;
pub mod records;
mod status;
pub mod store;

pub use allocator::{IdentifierAllocator, IdentifierSource};
pub use clock::Clock;
pub use config::{AgeMode, CoreConfig};
pub use error::{PatientError, PatientResult};
pub use importer::ImportSummary;
pub use producers::{ImportMessage, Production};
pub use projection::AgeProjection;
pub use reconciler::MessageReconciler;
pub use records::{RecordStore, Retrieval};
pub use status::StatusCode;
