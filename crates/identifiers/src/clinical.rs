//! Alphanumeric-carry clinical identifiers.

use crate::{IdentifierError, IdentifierResult};
use std::{fmt, str::FromStr};

/// Suffix marking a medical-record-number identifier from the PAS assigning authority.
pub const MR_SUFFIX: &str = "^^^PAS^MR";

/// Width of the assigning-system prefix (for example `SYN`).
pub const PREFIX_WIDTH: usize = 3;

/// Width of the incrementing body.
pub const BODY_WIDTH: usize = 5;

const FULL_WIDTH: usize = PREFIX_WIDTH + BODY_WIDTH + MR_SUFFIX.len();

/// A clinical identifier in canonical form: `<prefix:3><body:5>^^^PAS^MR`.
///
/// The prefix is made of uppercase ASCII letters and digits. The body is a fixed-width
/// radix-36 number over the alphabet `0-9A-Z` (digits sort before letters).
///
/// # Construction
/// - [`ClinicalIdentifier::parse`] validates a full identifier string.
/// - [`ClinicalIdentifier::seed`] builds the all-zero identifier for a prefix.
///
/// Once constructed the value is always canonical, so `to_string()` can be written to a
/// store or a message without further checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClinicalIdentifier {
    prefix: String,
    body: String,
}

impl ClinicalIdentifier {
    /// Parses a full identifier string such as `SYN00000^^^PAS^MR`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MalformedIdentifier`] if the length, suffix, prefix or body
    /// alphabet is wrong.
    pub fn parse(input: &str) -> IdentifierResult<Self> {
        if input.len() != FULL_WIDTH || !input.is_ascii() {
            return Err(IdentifierError::MalformedIdentifier(format!(
                "expected {FULL_WIDTH} ASCII characters, got '{input}'"
            )));
        }

        let (head, suffix) = input.split_at(PREFIX_WIDTH + BODY_WIDTH);
        if suffix != MR_SUFFIX {
            return Err(IdentifierError::MalformedIdentifier(format!(
                "expected suffix '{MR_SUFFIX}', got '{input}'"
            )));
        }

        let (prefix, body) = head.split_at(PREFIX_WIDTH);
        Self::from_parts(prefix, body)
    }

    /// Builds an identifier from a prefix and a body.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MalformedIdentifier`] if either part has the wrong width or
    /// contains characters outside `0-9A-Z`.
    pub fn from_parts(prefix: &str, body: &str) -> IdentifierResult<Self> {
        if prefix.len() != PREFIX_WIDTH || !prefix.bytes().all(is_body_char) {
            return Err(IdentifierError::MalformedIdentifier(format!(
                "prefix must be {PREFIX_WIDTH} characters of 0-9A-Z, got '{prefix}'"
            )));
        }
        if body.len() != BODY_WIDTH || !body.bytes().all(is_body_char) {
            return Err(IdentifierError::MalformedIdentifier(format!(
                "body must be {BODY_WIDTH} characters of 0-9A-Z, got '{body}'"
            )));
        }

        Ok(Self {
            prefix: prefix.to_owned(),
            body: body.to_owned(),
        })
    }

    /// The first identifier a prefix can issue: an all-zero body.
    pub fn seed(prefix: &str) -> IdentifierResult<Self> {
        Self::from_parts(prefix, &"0".repeat(BODY_WIDTH))
    }

    /// Returns true if `input` is a canonical clinical identifier.
    pub fn is_canonical(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the next identifier with the same prefix.
    ///
    /// If every body position carries (`ZZZZZ`) the body wraps to `00000`. Use
    /// [`ClinicalIdentifier::checked_successor`] where wrapping must not be issued.
    pub fn successor(&self) -> Self {
        let (body, _wrapped) = successor_body(&self.body);
        Self {
            prefix: self.prefix.clone(),
            body,
        }
    }

    /// Returns the next identifier, refusing to wrap around.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Overflow`] when the body is already `ZZZZZ`.
    pub fn checked_successor(&self) -> IdentifierResult<Self> {
        let (body, wrapped) = successor_body(&self.body);
        if wrapped {
            return Err(IdentifierError::Overflow(self.to_string()));
        }
        Ok(Self {
            prefix: self.prefix.clone(),
            body,
        })
    }
}

fn is_body_char(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'A'..=b'Z')
}

fn increment_char(c: u8) -> u8 {
    match c {
        b'0'..=b'8' | b'A'..=b'Y' => c + 1,
        b'9' => b'A',
        b'Z' => b'0',
        other => other,
    }
}

/// Increments a radix-36 body from the least significant character leftward.
///
/// The scan stops at the first position that did not wrap to `0`; positions further left are
/// untouched. The flag is true when every position wrapped.
fn successor_body(body: &str) -> (String, bool) {
    let mut bytes = body.as_bytes().to_vec();

    for i in (0..bytes.len()).rev() {
        bytes[i] = increment_char(bytes[i]);
        if bytes[i] != b'0' {
            return (String::from_utf8_lossy(&bytes).into_owned(), false);
        }
    }

    (String::from_utf8_lossy(&bytes).into_owned(), true)
}

impl fmt::Display for ClinicalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, self.body, MR_SUFFIX)
    }
}

impl FromStr for ClinicalIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClinicalIdentifier::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ClinicalIdentifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ClinicalIdentifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ClinicalIdentifier::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClinicalIdentifier {
        ClinicalIdentifier::parse(s).expect("valid identifier")
    }

    #[test]
    fn test_parse_valid_identifier() {
        let parsed = id("SYN00000^^^PAS^MR");
        assert_eq!(parsed.prefix(), "SYN");
        assert_eq!(parsed.body(), "00000");
        assert_eq!(parsed.to_string(), "SYN00000^^^PAS^MR");
    }

    #[test]
    fn test_parse_rejects_wrong_suffix() {
        let err = ClinicalIdentifier::parse("SYN00000^^^PAS^XX").expect_err("should reject");
        assert!(matches!(err, IdentifierError::MalformedIdentifier(msg) if msg.contains("suffix")));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(ClinicalIdentifier::parse("SYN0000^^^PAS^MR").is_err());
        assert!(ClinicalIdentifier::parse("SYN000000^^^PAS^MR").is_err());
        assert!(ClinicalIdentifier::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_lowercase_body() {
        assert!(ClinicalIdentifier::parse("SYN0000a^^^PAS^MR").is_err());
        assert!(ClinicalIdentifier::parse("syn00000^^^PAS^MR").is_err());
    }

    #[test]
    fn test_seed_is_all_zero() {
        let seed = ClinicalIdentifier::seed("SYN").expect("valid prefix");
        assert_eq!(seed.to_string(), "SYN00000^^^PAS^MR");
    }

    #[test]
    fn test_seed_rejects_bad_prefix() {
        assert!(ClinicalIdentifier::seed("SY").is_err());
        assert!(ClinicalIdentifier::seed("S-N").is_err());
    }

    #[test]
    fn test_successor_increments_last_digit() {
        assert_eq!(id("SYN00000^^^PAS^MR").successor(), id("SYN00001^^^PAS^MR"));
    }

    #[test]
    fn test_successor_moves_from_digits_to_letters() {
        assert_eq!(id("SYN00009^^^PAS^MR").successor(), id("SYN0000A^^^PAS^MR"));
        assert_eq!(id("SYN0000Y^^^PAS^MR").successor(), id("SYN0000Z^^^PAS^MR"));
    }

    #[test]
    fn test_successor_carries_after_z() {
        assert_eq!(id("SYN0000Z^^^PAS^MR").successor(), id("SYN00010^^^PAS^MR"));
        assert_eq!(id("SYN0ZZZZ^^^PAS^MR").successor(), id("SYN10000^^^PAS^MR"));
        assert_eq!(id("SYN9ZZZZ^^^PAS^MR").successor(), id("SYNA0000^^^PAS^MR"));
    }

    #[test]
    fn test_successor_leaves_left_positions_untouched() {
        assert_eq!(id("ABC7K3ZZ^^^PAS^MR").successor(), id("ABC7K400^^^PAS^MR"));
    }

    #[test]
    fn test_successor_wraps_on_full_overflow() {
        assert_eq!(id("SYNZZZZZ^^^PAS^MR").successor(), id("SYN00000^^^PAS^MR"));
    }

    #[test]
    fn test_checked_successor_refuses_overflow() {
        let err = id("SYNZZZZZ^^^PAS^MR")
            .checked_successor()
            .expect_err("should overflow");
        assert!(matches!(err, IdentifierError::Overflow(_)));
    }

    #[test]
    fn test_successor_is_deterministic_and_fixed_width() {
        let start = id("SYN0A9ZY^^^PAS^MR");
        let a = start.successor();
        let b = start.successor();
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), start.to_string().len());
    }

    #[test]
    fn test_string_order_matches_successor_order() {
        let mut current = id("SYN000ZX^^^PAS^MR");
        for _ in 0..100 {
            let next = current.successor();
            assert!(next.to_string() > current.to_string());
            assert!(next > current);
            current = next;
        }
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let original = id("SYN0004Z^^^PAS^MR");
        let json = serde_json::to_string(&original).expect("serialize");
        assert_eq!(json, "\"SYN0004Z^^^PAS^MR\"");
        let parsed: ClinicalIdentifier = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let result: Result<ClinicalIdentifier, _> = serde_json::from_str("\"not-an-id\"");
        assert!(result.is_err());
    }
}
