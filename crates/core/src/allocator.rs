//! Clinical identifier allocation.
//!
//! The next identifier is the successor of the greatest one already stored under the
//! configured prefix. Identifiers are fixed width and zero padded, so sorting the stored
//! strings descending finds the greatest without decoding every document.
//!
//! Allocation is read-only. Two processes allocating at once can be handed the same value;
//! [`crate::RecordStore::save`] checks uniqueness before writing and allocates again if it lost
//! the race.

use crate::config::CoreConfig;
use crate::document::FIELD_MAX_IDENTIFIER;
use crate::store::{Direction, DocumentStore, Query};
use crate::{PatientError, PatientResult};
use pas_identifiers::{IdentifierError, BODY_WIDTH, MR_SUFFIX};
use pas_types::ClinicalIdentifier;
use serde_json::Value;
use std::ops::Bound;
use std::sync::Arc;

/// Current-pointer field written by the first schema.
const LEGACY_MAX_FIELD: &str = "max_hl7v2_id";

/// Anything that can hand out fresh clinical identifiers.
pub trait IdentifierSource: Send + Sync {
    /// Returns an identifier not yet issued as far as the source can tell.
    ///
    /// # Errors
    ///
    /// Returns a [`PatientError`] if the source cannot be read or is exhausted.
    fn next_identifier(&self) -> PatientResult<ClinicalIdentifier>;
}

/// Allocates identifiers from the contents of a document store.
pub struct IdentifierAllocator {
    store: Arc<dyn DocumentStore>,
    prefix: String,
}

impl IdentifierAllocator {
    pub fn new(store: Arc<dyn DocumentStore>, cfg: &CoreConfig) -> Self {
        Self {
            store,
            prefix: cfg.identifier_prefix().to_owned(),
        }
    }

    /// The greatest valid identifier stored under this allocator's prefix.
    ///
    /// Both the current `max_identifier` field and the legacy `max_hl7v2_id` field are searched.
    /// A document whose value fails validation is reported as a corrupt identifier and the next
    /// candidate in descending order is tried.
    ///
    /// # Errors
    ///
    /// Returns a [`PatientError`] if the store cannot be queried.
    pub fn greatest_issued(&self) -> PatientResult<Option<ClinicalIdentifier>> {
        let mut greatest = None;
        for field in [FIELD_MAX_IDENTIFIER, LEGACY_MAX_FIELD] {
            let found = self.greatest_in_field(field)?;
            greatest = greatest.max(found);
        }
        Ok(greatest)
    }

    fn greatest_in_field(&self, field: &str) -> PatientResult<Option<ClinicalIdentifier>> {
        let lowest = format!("{}{}{MR_SUFFIX}", self.prefix, "0".repeat(BODY_WIDTH));
        let highest = format!("{}{}{MR_SUFFIX}", self.prefix, "Z".repeat(BODY_WIDTH));
        let query = Query::new()
            .range(
                field,
                Bound::Included(Value::from(lowest)),
                Bound::Included(Value::from(highest)),
            )
            .order_by(field, Direction::Descending);

        for item in self.store.stream(&query)? {
            let (document_id, document) = match item {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("skipping unreadable document while allocating: {e}");
                    continue;
                }
            };

            let raw = document.get(field).and_then(Value::as_str).unwrap_or_default();
            match ClinicalIdentifier::parse(raw) {
                Ok(identifier) => return Ok(Some(identifier)),
                Err(_) => {
                    let corrupt = PatientError::CorruptIdentifier {
                        document_id,
                        value: raw.to_owned(),
                    };
                    tracing::warn!("{corrupt}; trying the next candidate");
                }
            }
        }
        Ok(None)
    }

    /// Returns the successor of the greatest stored identifier, or the seed for this prefix when
    /// nothing has been issued.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::IdentifierOverflow`] if the greatest identifier has no successor,
    /// or a store error if the store cannot be queried.
    pub fn allocate(&self) -> PatientResult<ClinicalIdentifier> {
        let next = match self.greatest_issued()? {
            Some(greatest) => greatest.checked_successor().map_err(|e| match e {
                IdentifierError::Overflow(last) => PatientError::IdentifierOverflow(last),
                other => PatientError::MalformedIdentifier(other),
            })?,
            None => ClinicalIdentifier::seed(&self.prefix)?,
        };
        tracing::debug!("allocated identifier {next}");
        Ok(next)
    }
}

impl IdentifierSource for IdentifierAllocator {
    fn next_identifier(&self) -> PatientResult<ClinicalIdentifier> {
        self.allocate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store_with(docs: &[(&str, Value)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, value) in docs {
            let Value::Object(map) = value.clone() else {
                panic!("test documents must be objects");
            };
            store.upsert(id, map).expect("upsert");
        }
        store
    }

    fn allocator(store: Arc<MemoryStore>) -> IdentifierAllocator {
        IdentifierAllocator::new(store, &CoreConfig::default())
    }

    #[test]
    fn test_empty_store_yields_seed() {
        let alloc = allocator(store_with(&[]));
        assert_eq!(
            alloc.allocate().expect("allocate").to_string(),
            "SYN00000^^^PAS^MR"
        );
    }

    #[test]
    fn test_successor_of_greatest() {
        let alloc = allocator(store_with(&[
            ("p1", json!({"max_identifier": "SYN00009^^^PAS^MR"})),
            ("p2", json!({"max_identifier": "SYN0000Z^^^PAS^MR"})),
            ("p3", json!({"max_identifier": "SYN00001^^^PAS^MR"})),
        ]));
        assert_eq!(
            alloc.allocate().expect("allocate").to_string(),
            "SYN00010^^^PAS^MR"
        );
    }

    #[test]
    fn test_other_prefixes_are_ignored() {
        let alloc = allocator(store_with(&[
            ("p1", json!({"max_identifier": "ZZZ00009^^^PAS^MR"})),
            ("p2", json!({"max_identifier": "SYN00002^^^PAS^MR"})),
        ]));
        assert_eq!(
            alloc.allocate().expect("allocate").to_string(),
            "SYN00003^^^PAS^MR"
        );
    }

    #[test]
    fn test_corrupt_greatest_is_skipped() {
        let alloc = allocator(store_with(&[
            ("p1", json!({"max_identifier": "SYN0000a^^^PAS^MR"})),
            ("p2", json!({"max_identifier": "SYN00004^^^PAS^MR"})),
        ]));
        assert_eq!(
            alloc.allocate().expect("allocate").to_string(),
            "SYN00005^^^PAS^MR"
        );
    }

    #[test]
    fn test_legacy_field_is_considered() {
        let alloc = allocator(store_with(&[
            ("p1", json!({"max_identifier": "SYN00004^^^PAS^MR"})),
            ("p2", json!({"max_hl7v2_id": "SYN00007^^^PAS^MR"})),
        ]));
        assert_eq!(
            alloc.allocate().expect("allocate").to_string(),
            "SYN00008^^^PAS^MR"
        );
    }

    #[test]
    fn test_overflow_is_refused() {
        let alloc = allocator(store_with(&[(
            "p1",
            json!({"max_identifier": "SYNZZZZZ^^^PAS^MR"}),
        )]));
        let err = alloc.allocate().expect_err("overflow");
        assert!(matches!(err, PatientError::IdentifierOverflow(_)));
    }

    #[test]
    fn test_allocation_is_read_only() {
        let store = store_with(&[]);
        let alloc = allocator(store.clone());
        alloc.allocate().expect("allocate");
        alloc.allocate().expect("allocate");
        assert!(store.is_empty());
    }
}
