use crate::{age_on, IdentifierSet};
use chrono::NaiveDate;
use pas_identifiers::ClinicalIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Clinical content
// ============================================================================

/// Demographic fields. Opaque strings with no cross-field rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub gender: Option<String>,
    pub ssn: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub post_code: Option<String>,
    pub country_code: Option<String>,
}

/// One diagnosed condition.
///
/// Timestamps are held as the canonical strings they were received or normalised to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub condition: Option<String>,
    pub snomed_code: Option<String>,
    pub clinical_status: Option<String>,
    pub verification_status: Option<String>,
    pub onset_date_time: Option<String>,
    pub recorded_date: Option<String>,
    pub abatement_time: Option<String>,
    pub encounter_reference: Option<String>,
    pub subject_reference: Option<String>,
}

/// The value of an observation: a measured quantity or a coded concept, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObservationValue {
    /// Rendered quantity, for example `"7.2mmol/L"`.
    Quantity(String),
    /// Display text of a coded concept.
    Coded(String),
}

/// A labelled sub-result of a panel or questionnaire observation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationComponent {
    pub code_text: Option<String>,
    pub result: Option<String>,
}

/// An observation request or result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationRecord {
    pub category: Option<String>,
    /// Display name of what is observed. First element of the triple key.
    pub observation: Option<String>,
    pub placer_order_number: Option<String>,
    pub filler_order_number: Option<String>,
    pub status: Option<String>,
    pub effective_date_time: Option<String>,
    pub issued: Option<String>,
    pub value: Option<ObservationValue>,
    pub encounter_reference: Option<String>,
    pub subject_reference: Option<String>,
    pub components: Vec<ObservationComponent>,
}

impl ObservationRecord {
    /// The `(observation, placer order number, filler order number)` key used to pair a result
    /// with the request it answers.
    pub fn triple_key(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.observation.as_deref(),
            self.placer_order_number.as_deref(),
            self.filler_order_number.as_deref(),
        )
    }

    pub fn answers(&self, other: &ObservationRecord) -> bool {
        self.triple_key() == other.triple_key()
    }
}

// ============================================================================
// Patient record
// ============================================================================

/// The normalised representation of one patient.
///
/// The identifier history maps an effective birth date to the clinical identifier issued while
/// that birth date was active. The current identifier is stored as a key into the history, so
/// it is always one of the history's values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    /// Primary key in the store. Never changes after creation.
    pub id: String,
    identifier_history: BTreeMap<NaiveDate, ClinicalIdentifier>,
    current_key: Option<NaiveDate>,
    pub birth_date: NaiveDate,
    pub age: u32,
    /// Anchor for masquerade-mode date advancement.
    pub creation_date: NaiveDate,
    /// Day the last masquerade projection was applied, if any.
    pub projected_on: Option<NaiveDate>,
    pub demographics: Demographics,
    pub conditions: Vec<ConditionRecord>,
    pub observations: Vec<ObservationRecord>,
}

impl PatientRecord {
    /// Creates a record with no identifiers and no clinical content.
    pub fn new(id: impl Into<String>, birth_date: NaiveDate, age: u32, creation_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            identifier_history: BTreeMap::new(),
            current_key: None,
            birth_date,
            age,
            creation_date,
            projected_on: None,
            demographics: Demographics::default(),
            conditions: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// Builds a new record from inbound data.
    ///
    /// Age and creation date are taken at `today`. The first candidate identifier, if any,
    /// becomes the history entry for the inbound birth date.
    pub fn from_inbound(inbound: InboundRecord, id: impl Into<String>, today: NaiveDate) -> Self {
        let mut record = Self::new(
            id,
            inbound.birth_date,
            age_on(inbound.birth_date, today),
            today,
        );
        if let Some(first) = inbound.identifiers.candidates().first() {
            record.insert_identifier(inbound.birth_date, (*first).clone());
        }
        record.demographics = inbound.demographics;
        record.conditions = inbound.conditions;
        record.observations = inbound.observations;
        record
    }

    pub fn identifier_history(&self) -> &BTreeMap<NaiveDate, ClinicalIdentifier> {
        &self.identifier_history
    }

    /// The identifier for the presently active birth date.
    pub fn current_identifier(&self) -> Option<&ClinicalIdentifier> {
        self.current_key
            .as_ref()
            .and_then(|key| self.identifier_history.get(key))
    }

    /// The effective date the current identifier was issued for.
    pub fn current_effective_date(&self) -> Option<NaiveDate> {
        self.current_key
    }

    pub fn has_identifier(&self) -> bool {
        self.current_identifier().is_some()
    }

    /// All identifiers the record has held, for searching.
    pub fn identifier_set(&self) -> IdentifierSet {
        IdentifierSet::History(self.identifier_history.clone())
    }

    /// Records `identifier` as issued for `effective` and makes it current.
    ///
    /// Returns the identifier previously held for that date, if there was one.
    pub fn insert_identifier(
        &mut self,
        effective: NaiveDate,
        identifier: ClinicalIdentifier,
    ) -> Option<ClinicalIdentifier> {
        let previous = self.identifier_history.insert(effective, identifier);
        self.current_key = Some(effective);
        previous
    }

    /// Makes the history entry for `effective` current. Returns false if there is none.
    pub fn select_identifier(&mut self, effective: NaiveDate) -> bool {
        if self.identifier_history.contains_key(&effective) {
            self.current_key = Some(effective);
            true
        } else {
            false
        }
    }

    /// Replaces the whole history, choosing the current entry.
    ///
    /// The current entry is the one holding `current` if given and present; otherwise the
    /// entry for the record's birth date; otherwise the greatest identifier.
    pub fn restore_identifiers(
        &mut self,
        history: BTreeMap<NaiveDate, ClinicalIdentifier>,
        current: Option<&ClinicalIdentifier>,
    ) {
        let by_value = current.and_then(|wanted| {
            history
                .iter()
                .find(|(_, id)| *id == wanted)
                .map(|(date, _)| *date)
        });
        let by_birth = history
            .contains_key(&self.birth_date)
            .then_some(self.birth_date);
        let by_max = history
            .iter()
            .max_by(|a, b| a.1.cmp(b.1))
            .map(|(date, _)| *date);

        self.current_key = by_value.or(by_birth).or(by_max);
        self.identifier_history = history;
    }
}

// ============================================================================
// Inbound data
// ============================================================================

/// A patient as delivered by a boundary parser, before the store assigns anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRecord {
    /// Source system id, if the message carried one.
    pub id: Option<String>,
    /// Clinical identifiers the message refers to, in search order.
    pub identifiers: IdentifierSet,
    pub birth_date: NaiveDate,
    pub demographics: Demographics,
    pub conditions: Vec<ConditionRecord>,
    pub observations: Vec<ObservationRecord>,
}

impl InboundRecord {
    pub fn new(birth_date: NaiveDate) -> Self {
        Self {
            id: None,
            identifiers: IdentifierSet::default(),
            birth_date,
            demographics: Demographics::default(),
            conditions: Vec::new(),
            observations: Vec::new(),
        }
    }
}
