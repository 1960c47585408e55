use pas_identifiers::IdentifierError;

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    MalformedIdentifier(#[from] IdentifierError),
    #[error("document {document_id} holds an invalid identifier '{value}'")]
    CorruptIdentifier { document_id: String, value: String },
    #[error("identifier allocation raced with another writer {attempts} times")]
    ConcurrentModification { attempts: usize },
    #[error("no identifiers left after {0}")]
    IdentifierOverflow(String),

    #[error("document store I/O failed: {0}")]
    StoreIo(#[from] std::io::Error),
    #[error("failed to serialize document: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize document: {0}")]
    Deserialization(serde_json::Error),
    #[error("malformed document {id}: {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("HL7 error: {0}")]
    Hl7(#[from] hl7::Hl7Error),
}

pub type PatientResult<T> = std::result::Result<T, PatientError>;

impl From<pas_types::CalendarError> for PatientError {
    fn from(e: pas_types::CalendarError) -> Self {
        PatientError::InvalidInput(e.to_string())
    }
}
