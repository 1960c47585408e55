//! The record store: persistence, retrieval and reconciliation of patient records.
//!
//! ## Writes
//!
//! [`RecordStore::save`] is the only path to the document store. It refuses to overwrite unless
//! asked, refuses records over the size limit before anything is written, and makes sure a new
//! record carries a current identifier that no other record holds.
//!
//! ## Merges
//!
//! Inbound orders and results are matched to stored records by trying each candidate
//! identifier in turn against every stored identifier layout. Orders append to the matched
//! record's observations; results replace the request they answer, in place.

use crate::allocator::{IdentifierAllocator, IdentifierSource};
use crate::clock::Clock;
use crate::config::{AgeMode, CoreConfig};
use crate::constants::{MAX_ALLOCATION_ATTEMPTS, NIL_RECORD_ID};
use crate::document::{
    content_size, document_to_record, record_to_document, FIELD_AGE, FIELD_BIRTH_DATE, FIELD_ID,
    FIELD_IDENTIFIERS,
};
use crate::projection::AgeProjection;
use crate::status::StatusCode;
use crate::store::{Direction, Document, DocumentStore, Query};
use crate::{PatientError, PatientResult};
use chrono::NaiveDate;
use pas_types::{
    birth_date_window, ClinicalIdentifier, HexIdentifier, IdentifierError, InboundRecord,
    PatientRecord,
};
use rand::RngCore;
use serde_json::Value;
use std::ops::Bound;
use std::sync::Arc;

/// Identifier list field written by the first schema.
const LEGACY_IDENTIFIERS_FIELD: &str = "hl7v2_id";
/// Current-pointer field written by the first schema.
const LEGACY_CURRENT_FIELD: &str = "max_hl7v2_id";

/// Result of asking for a number of records in an age range.
#[derive(Debug)]
pub enum Retrieval {
    Records(Vec<PatientRecord>),
    /// The store holds too few matching records; this many more are needed.
    Shortfall(u64),
}

pub struct RecordStore {
    store: Arc<dyn DocumentStore>,
    identifiers: Arc<dyn IdentifierSource>,
    cfg: Arc<CoreConfig>,
    clock: Clock,
}

impl RecordStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identifiers: Arc<dyn IdentifierSource>,
        cfg: Arc<CoreConfig>,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            identifiers,
            cfg,
            clock,
        }
    }

    /// A record store allocating identifiers from its own documents.
    pub fn with_allocator(store: Arc<dyn DocumentStore>, cfg: Arc<CoreConfig>, clock: Clock) -> Self {
        let allocator = Arc::new(IdentifierAllocator::new(store.clone(), &cfg));
        Self::new(store, allocator, cfg, clock)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn identifiers(&self) -> &dyn IdentifierSource {
        self.identifiers.as_ref()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn exists(&self, id: &str) -> PatientResult<bool> {
        self.store.exists(id)
    }

    /// Loads a record without any age projection.
    pub fn get(&self, id: &str) -> PatientResult<Option<PatientRecord>> {
        self.store
            .get(id)?
            .map(|doc| document_to_record(&doc, self.today()))
            .transpose()
    }

    /// Number of stored records whose age is in `lower..=upper`.
    ///
    /// Masquerade mode trusts the stored `age`. Realistic mode ignores it and filters on the
    /// birth-date window that produces those ages today.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if `lower > upper`, or a store error.
    pub fn count(&self, lower: u32, upper: u32, mode: AgeMode) -> PatientResult<u64> {
        let query = self.age_query(lower, upper, mode)?;
        self.store.count(&query)
    }

    /// Up to `limit` records in the age range, each projected for `mode`.
    ///
    /// Every call runs a fresh query. Dropping the iterator early is safe.
    ///
    /// # Errors
    ///
    /// The outer error is a query failure. Each item fails separately if its document cannot be
    /// migrated or projected.
    pub fn fetch_range(
        &self,
        lower: u32,
        upper: u32,
        mode: AgeMode,
        limit: usize,
    ) -> PatientResult<impl Iterator<Item = PatientResult<PatientRecord>> + '_> {
        let query = self.age_query(lower, upper, mode)?.limit(limit);
        let today = self.today();
        let documents = self.documents(&query)?;

        Ok(documents.map(move |(_, doc)| {
            let mut record = document_to_record(&doc, today)?;
            AgeProjection::project(&mut record, mode, today)?;
            Ok(record)
        }))
    }

    /// Exactly `n` records in the age range, or how many are missing.
    ///
    /// This never waits for more records to appear.
    pub fn retrieve(
        &self,
        lower: u32,
        upper: u32,
        mode: AgeMode,
        n: usize,
    ) -> PatientResult<Retrieval> {
        let available = self.count(lower, upper, mode)?;
        let wanted = n as u64;
        if available < wanted {
            tracing::info!("store only has {available} record(s) aged {lower}..={upper}");
            return Ok(Retrieval::Shortfall(wanted - available));
        }

        let records = self
            .fetch_range(lower, upper, mode, n)?
            .collect::<PatientResult<Vec<_>>>()?;
        Ok(Retrieval::Records(records))
    }

    fn age_query(&self, lower: u32, upper: u32, mode: AgeMode) -> PatientResult<Query> {
        if lower > upper {
            return Err(PatientError::InvalidInput(format!(
                "age range {lower}..={upper} is empty"
            )));
        }

        let query = match mode {
            AgeMode::Masquerade => Query::new().range(
                FIELD_AGE,
                Bound::Included(Value::from(lower)),
                Bound::Included(Value::from(upper)),
            ),
            AgeMode::Realistic => {
                let (earliest, latest) = birth_date_window(lower, upper, self.today())?;
                Query::new().range(
                    FIELD_BIRTH_DATE,
                    Bound::Included(Value::from(earliest.format("%Y-%m-%d").to_string())),
                    Bound::Included(Value::from(latest.format("%Y-%m-%d").to_string())),
                )
            }
        };
        Ok(query)
    }

    /// Matching documents, skipping any the backend could not read.
    fn documents(&self, query: &Query) -> PatientResult<impl Iterator<Item = (String, Document)> + '_> {
        Ok(self.store.stream(query)?.filter_map(|item| match item {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!("skipping unreadable document: {e}");
                None
            }
        }))
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    /// Queries that find a stored record holding `identifier`, one per stored layout.
    fn lookup_queries(identifier: &ClinicalIdentifier) -> [Query; 3] {
        let value = identifier.to_string();
        [
            Query::new().contains(FIELD_IDENTIFIERS, value.clone()),
            Query::new().contains(LEGACY_IDENTIFIERS_FIELD, value.clone()),
            Query::new().eq(LEGACY_CURRENT_FIELD, value),
        ]
    }

    /// Id of a record other than `except_id` that holds `identifier`.
    fn identifier_holder(
        &self,
        identifier: &ClinicalIdentifier,
        except_id: &str,
    ) -> PatientResult<Option<String>> {
        for query in Self::lookup_queries(identifier) {
            if let Some((id, _)) = self.documents(&query)?.find(|(id, _)| id != except_id) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Allocates an identifier no stored record holds.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::ConcurrentModification`] if every attempt returned an identifier
    /// that another record already holds.
    fn allocate_unique(&self, record_id: &str) -> PatientResult<ClinicalIdentifier> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = self.identifiers.next_identifier()?;
            match self.identifier_holder(&candidate, record_id)? {
                None => return Ok(candidate),
                Some(holder) => tracing::warn!(
                    "allocated identifier {candidate} is already held by {holder} (attempt {attempt})"
                ),
            }
        }
        Err(PatientError::ConcurrentModification {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    /// Issues a new identifier for `effective` and makes it current.
    pub fn assign_initial_identifier(
        &self,
        record: &mut PatientRecord,
        effective: NaiveDate,
    ) -> PatientResult<ClinicalIdentifier> {
        let identifier = self.allocate_unique(&record.id)?;
        record.insert_identifier(effective, identifier.clone());
        Ok(identifier)
    }

    /// See [`AgeProjection::reassign_for_age_range`]. New identifiers are checked against
    /// every other stored record before use.
    pub fn reassign_for_age_range(
        &self,
        record: &mut PatientRecord,
        lower: u32,
        upper: u32,
        rng: &mut dyn RngCore,
    ) -> PatientResult<bool> {
        let unique = UniqueIdentifiers {
            records: self,
            record_id: record.id.clone(),
        };
        AgeProjection::reassign_for_age_range(record, lower, upper, &unique, rng, self.today())
    }

    /// Makes sure the record has a current identifier.
    ///
    /// A record not yet stored whose identifier another record holds gets a fresh one. A stored
    /// record keeps its identifiers and the clash is logged.
    fn ensure_unique_identifier(&self, record: &mut PatientRecord, stored: bool) -> PatientResult<()> {
        let (Some(effective), Some(current)) = (
            record.current_effective_date(),
            record.current_identifier().cloned(),
        ) else {
            let effective = record.birth_date;
            let identifier = self.assign_initial_identifier(record, effective)?;
            tracing::debug!("record {} had no identifier; assigned {identifier}", record.id);
            return Ok(());
        };

        let Some(holder) = self.identifier_holder(&current, &record.id)? else {
            return Ok(());
        };
        if stored {
            tracing::warn!(
                "identifier {current} of record {} is also held by {holder}; leaving it in place",
                record.id
            );
        } else {
            tracing::warn!(
                "identifier {current} of record {} is already held by {holder}; allocating another",
                record.id
            );
            self.assign_initial_identifier(record, effective)?;
        }
        Ok(())
    }

    /// The id for a new record whose source gave none: the hex successor of the greatest stored
    /// hex id, or the nil id when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::IdentifierOverflow`] if the greatest id has no successor.
    pub fn next_record_id(&self) -> PatientResult<String> {
        let query = Query::new().order_by(FIELD_ID, Direction::Descending);
        let greatest = self
            .documents(&query)?
            .find_map(|(id, _)| HexIdentifier::parse(&id).ok());

        match greatest {
            Some(hex) => hex
                .successor()
                .map(|next| next.to_string())
                .map_err(|e| match e {
                    IdentifierError::Overflow(last) => PatientError::IdentifierOverflow(last),
                    other => PatientError::MalformedIdentifier(other),
                }),
            None => Ok(NIL_RECORD_ID.to_owned()),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Builds a new record from inbound data, dated today.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if the inbound record has no id.
    pub fn record_from_inbound(&self, inbound: InboundRecord) -> PatientResult<PatientRecord> {
        let id = inbound
            .id
            .clone()
            .ok_or_else(|| PatientError::InvalidInput("inbound record has no id".into()))?;
        Ok(PatientRecord::from_inbound(inbound, id, self.today()))
    }

    /// Writes a record.
    ///
    /// Returns [`StatusCode::Conflict`] if the record exists and `overwrite` is false, and
    /// [`StatusCode::DocumentTooLarge`] if its content is at or over the size limit; nothing is
    /// written in either case. Otherwise a missing identifier is allocated, a new record's
    /// identifier held by another record is replaced, and the document is written.
    ///
    /// # Errors
    ///
    /// Returns a [`PatientError`] for store failures and failed allocation.
    pub fn save(&self, record: &mut PatientRecord, overwrite: bool) -> PatientResult<StatusCode> {
        let exists = self.store.exists(&record.id)?;
        if exists && !overwrite {
            tracing::info!("record {} already exists; not overwriting", record.id);
            return Ok(StatusCode::Conflict);
        }

        let size = content_size(record)?;
        if size >= self.cfg.document_size_limit() {
            tracing::warn!(
                "record {} is {size} bytes, over the {} byte limit; not written",
                record.id,
                self.cfg.document_size_limit()
            );
            return Ok(StatusCode::DocumentTooLarge);
        }

        self.ensure_unique_identifier(record, exists)?;
        let document = record_to_document(record)?;
        self.store.upsert(&record.id, document)?;

        let status = if exists {
            StatusCode::Updated
        } else {
            StatusCode::Created
        };
        tracing::info!("record {} {status}", record.id);
        Ok(status)
    }

    /// First stored record holding any of `candidates`, tried in order.
    pub fn find_by_identifiers(
        &self,
        candidates: &[&ClinicalIdentifier],
    ) -> PatientResult<Option<PatientRecord>> {
        for candidate in candidates {
            for query in Self::lookup_queries(candidate) {
                if let Some((id, doc)) = self.documents(&query.limit(1))?.next() {
                    tracing::debug!("identifier {candidate} matched record {id}");
                    return document_to_record(&doc, self.today()).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Merges an order: its observations are appended to the matching record.
    ///
    /// With no match the inbound record is created, without overwriting.
    pub fn merge_order(&self, incoming: InboundRecord) -> PatientResult<StatusCode> {
        let matched = self.find_by_identifiers(&incoming.identifiers.candidates())?;
        let Some(mut existing) = matched else {
            return self.create_unmatched(incoming);
        };

        tracing::info!(
            "appending {} observation(s) to record {}",
            incoming.observations.len(),
            existing.id
        );
        existing.observations.extend(incoming.observations);
        self.save(&mut existing, true)
    }

    /// Merges a result.
    ///
    /// Each incoming observation replaces, in place, the first stored observation with the same
    /// `(observation, placer, filler)` key. One with no counterpart is appended when
    /// `accept_unmatched` is set and dropped otherwise. If every observation is dropped nothing
    /// is written and [`StatusCode::Discarded`] is returned.
    ///
    /// With no matching record the inbound record is created, whatever `accept_unmatched` says.
    pub fn merge_result(
        &self,
        incoming: InboundRecord,
        accept_unmatched: bool,
    ) -> PatientResult<StatusCode> {
        let matched = self.find_by_identifiers(&incoming.identifiers.candidates())?;
        let Some(mut existing) = matched else {
            return self.create_unmatched(incoming);
        };

        let mut applied = 0usize;
        for result in incoming.observations {
            if let Some(slot) = existing.observations.iter_mut().find(|o| o.answers(&result)) {
                *slot = result;
                applied += 1;
            } else if accept_unmatched {
                tracing::info!("result for record {} has no request; appending", existing.id);
                existing.observations.push(result);
                applied += 1;
            } else {
                tracing::warn!(
                    "discarding result {:?} for record {}: no corresponding request",
                    result.triple_key(),
                    existing.id
                );
            }
        }

        if applied == 0 {
            return Ok(StatusCode::Discarded);
        }
        self.save(&mut existing, true)
    }

    fn create_unmatched(&self, incoming: InboundRecord) -> PatientResult<StatusCode> {
        tracing::debug!("no stored record matches; creating one");
        let mut record = self.record_from_inbound(incoming)?;
        self.save(&mut record, false)
    }
}

/// Allocation for one record that skips identifiers other records already hold.
struct UniqueIdentifiers<'a> {
    records: &'a RecordStore,
    record_id: String,
}

impl IdentifierSource for UniqueIdentifiers<'_> {
    fn next_identifier(&self) -> PatientResult<ClinicalIdentifier> {
        self.records.allocate_unique(&self.record_id)
    }
}
