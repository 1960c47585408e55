//! Clinical identifier codecs.
//!
//! Patient records are cross-referenced by a *clinical identifier*: a medical record number
//! issued by the PAS assigning authority. Two encodings are in use:
//!
//! - **Alphanumeric-carry** ([`ClinicalIdentifier`]): a 3-character prefix, a 5-character body
//!   over `[0-9A-Z]` and the fixed suffix `^^^PAS^MR`, for example `SYN0004Z^^^PAS^MR`.
//! - **Hex-group** ([`HexIdentifier`]): hyphen-delimited hex groups in 8-4-4-4-12 layout, for
//!   example `a1b2c3d4-e5f6-0102-0304-05060708090a`.
//!
//! Both types guarantee their canonical shape once constructed, and both expose a successor
//! operation that is a pure function of the current value and preserves the total length.
//!
//! ## Ordering
//!
//! Bodies are always fixed width and zero-padded, so the lexicographic order of the rendered
//! strings is the same as successor order. Stores rely on this when they sort identifiers
//! descending to find the greatest one issued.

mod clinical;
mod hex;

pub use clinical::{ClinicalIdentifier, BODY_WIDTH, MR_SUFFIX, PREFIX_WIDTH};
pub use hex::HexIdentifier;

/// Error type for identifier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// The input does not have the shape required by its codec.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Every position carried; the successor would wrap to the all-zero value.
    #[error("identifier space exhausted after {0}")]
    Overflow(String),
}

/// Result type for identifier operations.
pub type IdentifierResult<T> = Result<T, IdentifierError>;
