use chrono::NaiveDate;
use pas_identifiers::ClinicalIdentifier;
use std::collections::BTreeMap;

/// The clinical identifiers an inbound record or stored document refers to.
///
/// Older stored documents and inbound messages carry identifiers in different shapes. Callers
/// use [`IdentifierSet::candidates`] to get one flat, ordered list to search with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentifierSet {
    /// One identifier, for example a legacy `hl7v2_id` string.
    Single(ClinicalIdentifier),
    /// An ordered list, for example the repetitions of PID-3.
    List(Vec<ClinicalIdentifier>),
    /// The effective-date history of a patient record.
    History(BTreeMap<NaiveDate, ClinicalIdentifier>),
}

impl Default for IdentifierSet {
    fn default() -> Self {
        IdentifierSet::List(Vec::new())
    }
}

impl IdentifierSet {
    /// Identifiers in search order with duplicates removed.
    ///
    /// Lists keep their own order; histories are ordered by effective date.
    pub fn candidates(&self) -> Vec<&ClinicalIdentifier> {
        let all: Vec<&ClinicalIdentifier> = match self {
            IdentifierSet::Single(id) => vec![id],
            IdentifierSet::List(ids) => ids.iter().collect(),
            IdentifierSet::History(history) => history.values().collect(),
        };

        let mut out = Vec::with_capacity(all.len());
        for id in all {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        match self {
            IdentifierSet::Single(_) => false,
            IdentifierSet::List(ids) => ids.is_empty(),
            IdentifierSet::History(history) => history.is_empty(),
        }
    }
}
