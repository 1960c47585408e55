//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services in an
//! `Arc`. Library code never reads environment variables while handling records.

use crate::constants::{
    DEFAULT_COLLECTION, DEFAULT_DATA_DIR, DEFAULT_DOCUMENT_SIZE_LIMIT, DEFAULT_IDENTIFIER_PREFIX,
};
use crate::{PatientError, PatientResult};
use pas_identifiers::PREFIX_WIDTH;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How ages are matched and reported when records are read back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgeMode {
    /// The stored age is kept and the birth date moves forward to stay consistent with it.
    #[default]
    Masquerade,
    /// The birth date is kept and the age is recomputed from it.
    Realistic,
}

impl FromStr for AgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "masquerade" => Ok(AgeMode::Masquerade),
            "realistic" => Ok(AgeMode::Realistic),
            other => Err(format!(
                "age mode must be 'masquerade' or 'realistic', got '{other}'"
            )),
        }
    }
}

impl fmt::Display for AgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgeMode::Masquerade => "masquerade",
            AgeMode::Realistic => "realistic",
        })
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    collection: String,
    identifier_prefix: String,
    document_size_limit: usize,
    age_mode: AgeMode,
    accept_unmatched_results: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if:
    /// - `collection` is empty or contains characters outside `[A-Za-z0-9._-]`
    /// - `identifier_prefix` is not three characters of `0-9A-Z`
    /// - `document_size_limit` is zero
    pub fn new(
        data_dir: PathBuf,
        collection: String,
        identifier_prefix: String,
        document_size_limit: usize,
    ) -> PatientResult<Self> {
        let collection = collection.trim().to_owned();
        if collection.is_empty() {
            return Err(PatientError::InvalidInput(
                "collection cannot be empty".into(),
            ));
        }
        if !collection
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(PatientError::InvalidInput(format!(
                "collection may only contain [A-Za-z0-9._-], got '{collection}'"
            )));
        }

        if identifier_prefix.len() != PREFIX_WIDTH
            || !identifier_prefix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
        {
            return Err(PatientError::InvalidInput(format!(
                "identifier prefix must be {PREFIX_WIDTH} characters of 0-9A-Z, got '{identifier_prefix}'"
            )));
        }

        if document_size_limit == 0 {
            return Err(PatientError::InvalidInput(
                "document size limit must be positive".into(),
            ));
        }

        Ok(Self {
            data_dir,
            collection,
            identifier_prefix,
            document_size_limit,
            age_mode: AgeMode::default(),
            accept_unmatched_results: true,
        })
    }

    pub fn with_age_mode(mut self, age_mode: AgeMode) -> Self {
        self.age_mode = age_mode;
        self
    }

    pub fn with_accept_unmatched_results(mut self, accept: bool) -> Self {
        self.accept_unmatched_results = accept;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Directory holding this configuration's collection.
    pub fn collection_dir(&self) -> PathBuf {
        self.data_dir.join(&self.collection)
    }

    pub fn identifier_prefix(&self) -> &str {
        &self.identifier_prefix
    }

    pub fn document_size_limit(&self) -> usize {
        self.document_size_limit
    }

    pub fn age_mode(&self) -> AgeMode {
        self.age_mode
    }

    pub fn accept_unmatched_results(&self) -> bool {
        self.accept_unmatched_results
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            collection: DEFAULT_COLLECTION.to_owned(),
            identifier_prefix: DEFAULT_IDENTIFIER_PREFIX.to_owned(),
            document_size_limit: DEFAULT_DOCUMENT_SIZE_LIMIT,
            age_mode: AgeMode::default(),
            accept_unmatched_results: true,
        }
    }
}
