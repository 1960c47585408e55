//! FHIR `Bundle` parsing.
//!
//! A bundle may hold several patients. Conditions and observations are attached to the most
//! recent `Patient` entry before them; clinical entries that appear before any patient are
//! dropped.

use crate::condition::{self, ConditionWire};
use crate::observation::{self, ObservationWire};
use crate::patient::{self, PatientWire};
use crate::{FhirError, FhirResult};
use pas_types::InboundRecord;
use serde::Deserialize;
use std::path::Path;

/// Bundle operations.
///
/// This is a zero-sized type used for namespacing bundle-related operations.
pub struct Bundle;

impl Bundle {
    /// Parse a bundle from JSON text.
    ///
    /// This uses `serde_path_to_error` to report the path (e.g. `entry.3.resource.birthDate`) of
    /// the field that failed to deserialise.
    ///
    /// # Arguments
    ///
    /// * `json_text` - JSON text expected to represent a `Bundle` resource.
    ///
    /// # Returns
    ///
    /// One [`InboundRecord`] per `Patient` entry, in bundle order, each carrying the conditions
    /// and observations that followed it.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the text is not valid JSON or a field has an unexpected type,
    /// - resourceType is not "Bundle",
    /// - a patient has no usable birth date.
    pub fn parse(json_text: &str) -> FhirResult<Vec<InboundRecord>> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);

        let wire = match serde_path_to_error::deserialize::<_, BundleWire>(&mut deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(FhirError::Translation(format!(
                    "Bundle schema mismatch at {path}: {source}"
                )));
            }
        };

        if wire.resource_type != "Bundle" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Bundle', got '{}'",
                wire.resource_type
            )));
        }

        wire_to_domain(wire)
    }

    /// Read and parse a bundle file.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Io`] if the file cannot be read, otherwise as [`Bundle::parse`].
    pub fn parse_file(path: &Path) -> FhirResult<Vec<InboundRecord>> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct BundleWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(default)]
    entry: Vec<EntryWire>,
}

#[derive(Debug, Deserialize)]
struct EntryWire {
    resource: Option<ResourceWire>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resourceType")]
enum ResourceWire {
    Patient(PatientWire),
    Condition(ConditionWire),
    Observation(ObservationWire),
    #[serde(other)]
    Other,
}

fn wire_to_domain(wire: BundleWire) -> FhirResult<Vec<InboundRecord>> {
    let mut records: Vec<InboundRecord> = Vec::new();
    let mut orphaned = 0usize;

    for resource in wire.entry.into_iter().filter_map(|e| e.resource) {
        match resource {
            ResourceWire::Patient(p) => records.push(patient::wire_to_inbound(p)?),
            ResourceWire::Condition(c) => match records.last_mut() {
                Some(current) => current.conditions.push(condition::wire_to_domain(c)),
                None => orphaned += 1,
            },
            ResourceWire::Observation(o) => match records.last_mut() {
                Some(current) => current.observations.push(observation::wire_to_domain(o)),
                None => orphaned += 1,
            },
            ResourceWire::Other => {}
        }
    }

    if orphaned > 0 {
        tracing::debug!("dropped {orphaned} clinical entries that preceded any Patient");
    }

    Ok(records)
}
