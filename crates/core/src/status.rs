use std::fmt;

/// Outcome of a write or merge that completed without an unexpected failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// A new document was written.
    Created,
    /// An existing document was replaced.
    Updated,
    /// The document exists and overwriting was not allowed. Nothing was written.
    Conflict,
    /// The record is over the size limit. Nothing was written.
    DocumentTooLarge,
    /// The input named no patient to match or create. Nothing was written.
    NoMatch,
    /// A result matched no outstanding request and was dropped. Nothing was written.
    Discarded,
}

impl StatusCode {
    /// True if a document was written.
    pub fn is_written(&self) -> bool {
        matches!(self, StatusCode::Created | StatusCode::Updated)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Created => "created",
            StatusCode::Updated => "updated",
            StatusCode::Conflict => "conflict",
            StatusCode::DocumentTooLarge => "document too large",
            StatusCode::NoMatch => "no match",
            StatusCode::Discarded => "discarded",
        };
        f.write_str(s)
    }
}
