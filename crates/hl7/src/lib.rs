//! HL7 v2 (ER7, pipe-delimited) boundary for the patient administration store.
//!
//! This crate covers only what the store needs from the legacy message format:
//! - parsing ER7 text into segments and fields ([`Er7Message`])
//! - extracting the patient and order/result payload of inbound messages ([`InboundMessage`])
//! - building outbound ADT^A01, ORM^O01, ORU^R01 and OML^O21 messages ([`outbound`])
//!
//! Message control ids come from an explicit [`ControlIdCounter`] owned by the caller.

mod control;
mod er7;
mod inbound;
pub mod outbound;

pub use control::ControlIdCounter;
pub use er7::{escape, unescape, Delimiters, Er7Message, MessageType, Segment};
pub use inbound::InboundMessage;
pub use outbound::MessageContext;

/// Errors returned by the `hl7` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum Hl7Error {
    #[error("message is empty")]
    Empty,

    #[error("message must start with an MSH segment, found '{0}'")]
    MissingHeader(String),

    #[error("invalid MSH encoding characters: '{0}'")]
    InvalidDelimiters(String),

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("invalid value in {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("record {0} has no current clinical identifier")]
    MissingIdentifier(String),
}

/// Type alias for Results that can fail with an [`Hl7Error`].
pub type Hl7Result<T> = Result<T, Hl7Error>;
