//! Grouped hexadecimal identifiers (UUID-shaped strings such as PID-2 patient ids).

use crate::{IdentifierError, IdentifierResult};
use std::{fmt, str::FromStr};

/// Largest number of hex digits an identifier may carry (fits in a `u128`).
const MAX_DIGITS: usize = 32;

/// A hyphen-grouped hexadecimal identifier, for example `a1b2c3d4-e5f6-0102-0304-05060708090a`.
///
/// The group widths are taken from the parsed input and preserved by [`HexIdentifier::successor`].
/// Digits are held in lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HexIdentifier {
    value: u128,
    groups: Vec<usize>,
}

impl HexIdentifier {
    /// Parses a hyphen-grouped hexadecimal string.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MalformedIdentifier`] if a group is empty, a character is not
    /// a hex digit, or there are more than 32 digits.
    pub fn parse(input: &str) -> IdentifierResult<Self> {
        let mut groups = Vec::new();
        let mut digits = String::with_capacity(MAX_DIGITS);

        for group in input.split('-') {
            if group.is_empty() || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(IdentifierError::MalformedIdentifier(format!(
                    "expected hyphen-separated hex groups, got '{input}'"
                )));
            }
            groups.push(group.len());
            digits.push_str(group);
        }

        if digits.len() > MAX_DIGITS {
            return Err(IdentifierError::MalformedIdentifier(format!(
                "more than {MAX_DIGITS} hex digits in '{input}'"
            )));
        }

        let value = u128::from_str_radix(&digits, 16)
            .map_err(|e| IdentifierError::MalformedIdentifier(format!("{input}: {e}")))?;

        Ok(Self { value, groups })
    }

    /// The all-zero identifier in 8-4-4-4-12 layout.
    pub fn nil() -> Self {
        Self {
            value: 0,
            groups: vec![8, 4, 4, 4, 12],
        }
    }

    fn width(&self) -> usize {
        self.groups.iter().sum()
    }

    /// Returns the identifier one greater, keeping the group layout.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Overflow`] if the incremented value no longer fits in the
    /// available digits.
    pub fn successor(&self) -> IdentifierResult<Self> {
        let width = self.width();
        let next = self
            .value
            .checked_add(1)
            .filter(|v| width >= MAX_DIGITS || *v < (1u128 << (4 * width)))
            .ok_or_else(|| IdentifierError::Overflow(self.to_string()))?;

        Ok(Self {
            value: next,
            groups: self.groups.clone(),
        })
    }
}

impl fmt::Display for HexIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:0width$x}", self.value, width = self.width());
        let mut offset = 0;
        for (i, len) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            f.write_str(&digits[offset..offset + len])?;
            offset += len;
        }
        Ok(())
    }
}

impl FromStr for HexIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HexIdentifier::parse(s)
    }
}
