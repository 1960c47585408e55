//! ER7 text parsing.
//!
//! Segments are separated by CR (LF and CRLF are also accepted). Fields are addressed by their
//! HL7 number: `PID-3` is `segment.field(3)`. In MSH the field separator itself is MSH-1, so
//! MSH-2 is the encoding characters and MSH-3 is the first field after them.

use crate::{Hl7Error, Hl7Result};
use std::fmt;

/// The separator and escape characters declared in MSH-1 and MSH-2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// MSH-2 value, for example `^~\&`.
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }
}

/// Escapes delimiter characters in free text so it can be placed in a single component.
///
/// Line breaks are replaced with spaces.
pub fn escape(text: &str, delimiters: &Delimiters) -> String {
    let mut out = String::with_capacity(text.len());
    let esc = delimiters.escape;
    for c in text.chars() {
        let code = match c {
            c if c == delimiters.escape => Some('E'),
            c if c == delimiters.field => Some('F'),
            c if c == delimiters.component => Some('S'),
            c if c == delimiters.repetition => Some('R'),
            c if c == delimiters.subcomponent => Some('T'),
            _ => None,
        };
        match code {
            Some(code) => {
                out.push(esc);
                out.push(code);
                out.push(esc);
            }
            None if c == '\r' || c == '\n' => out.push(' '),
            None => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`]. Unrecognised escape sequences are left as they are.
pub fn unescape(text: &str, delimiters: &Delimiters) -> String {
    let esc = delimiters.escape;
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == esc && i + 2 < chars.len() && chars[i + 2] == esc {
            let replacement = match chars[i + 1] {
                'E' => Some(delimiters.escape),
                'F' => Some(delimiters.field),
                'S' => Some(delimiters.component),
                'R' => Some(delimiters.repetition),
                'T' => Some(delimiters.subcomponent),
                _ => None,
            };
            if let Some(r) = replacement {
                out.push(r);
                i += 3;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

// ============================================================================
// Segments
// ============================================================================

/// One parsed segment. Index 0 holds the segment name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    fields: Vec<String>,
    delimiters: Delimiters,
}

impl Segment {
    pub fn name(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Raw value of field `n`, or `None` if absent or empty.
    pub fn field(&self, n: usize) -> Option<&str> {
        self.fields
            .get(n)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Non-empty repetitions of field `n`.
    pub fn repetitions(&self, n: usize) -> Vec<&str> {
        self.field(n)
            .map(|v| {
                v.split(self.delimiters.repetition)
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw value of component `c` (1-based) of the first repetition of field `n`.
    pub fn component(&self, n: usize, c: usize) -> Option<&str> {
        let first = self.field(n)?.split(self.delimiters.repetition).next()?;
        first
            .split(self.delimiters.component)
            .nth(c.checked_sub(1)?)
            .filter(|v| !v.is_empty())
    }

    /// Field `n` with escape sequences decoded.
    pub fn text(&self, n: usize) -> Option<String> {
        self.field(n).map(|v| unescape(v, &self.delimiters))
    }

    /// Component `c` of field `n` with escape sequences decoded.
    pub fn component_text(&self, n: usize, c: usize) -> Option<String> {
        self.component(n, c).map(|v| unescape(v, &self.delimiters))
    }
}

// ============================================================================
// Message type
// ============================================================================

/// The message types the store consumes or produces, from MSH-9.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    AdtA01,
    OrmO01,
    OruR01,
    OmlO21,
    Other(String),
}

impl MessageType {
    pub fn from_parts(code: &str, trigger: &str) -> Self {
        match (code, trigger) {
            ("ADT", "A01") => MessageType::AdtA01,
            ("ORM", "O01") => MessageType::OrmO01,
            ("ORU", "R01") => MessageType::OruR01,
            ("OML", "O21") => MessageType::OmlO21,
            _ => MessageType::Other(format!("{code}^{trigger}")),
        }
    }

    /// `(message code, trigger event)`, for example `("ADT", "A01")`.
    pub fn parts(&self) -> (String, String) {
        let (code, trigger) = match self {
            MessageType::AdtA01 => ("ADT", "A01"),
            MessageType::OrmO01 => ("ORM", "O01"),
            MessageType::OruR01 => ("ORU", "R01"),
            MessageType::OmlO21 => ("OML", "O21"),
            MessageType::Other(raw) => {
                let mut split = raw.splitn(2, '^');
                let code = split.next().unwrap_or_default().to_owned();
                let trigger = split.next().unwrap_or_default().to_owned();
                return (code, trigger);
            }
        };
        (code.to_owned(), trigger.to_owned())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, trigger) = self.parts();
        write!(f, "{code}^{trigger}")
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A parsed ER7 message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Er7Message {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl Er7Message {
    /// Parses ER7 text.
    ///
    /// # Errors
    ///
    /// Returns an [`Hl7Error`] if the text is empty, does not start with MSH, or declares
    /// unusable encoding characters.
    pub fn parse(text: &str) -> Hl7Result<Self> {
        let mut lines = text
            .split(|c| c == '\r' || c == '\n')
            .filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or(Hl7Error::Empty)?;
        let delimiters = parse_delimiters(header)?;

        let mut segments = vec![parse_header(header, delimiters)];
        for line in lines {
            segments.push(Segment {
                fields: line.split(delimiters.field).map(str::to_owned).collect(),
                delimiters,
            });
        }

        Ok(Self {
            delimiters,
            segments,
        })
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// The MSH segment.
    pub fn header(&self) -> &Segment {
        &self.segments[0]
    }

    /// First segment named `name`.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }

    /// Every segment named `name`, in message order.
    pub fn segments<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.iter().filter(move |s| s.name() == name)
    }

    /// MSH-9 as a [`MessageType`].
    pub fn message_type(&self) -> MessageType {
        let header = self.header();
        MessageType::from_parts(
            header.component(9, 1).unwrap_or_default(),
            header.component(9, 2).unwrap_or_default(),
        )
    }

    /// MSH-10.
    pub fn control_id(&self) -> Option<&str> {
        self.header().field(10)
    }
}

fn parse_delimiters(header: &str) -> Hl7Result<Delimiters> {
    let rest = header
        .strip_prefix("MSH")
        .ok_or_else(|| Hl7Error::MissingHeader(header.chars().take(3).collect()))?;

    let mut chars = rest.chars();
    let field = chars
        .next()
        .ok_or_else(|| Hl7Error::InvalidDelimiters(rest.to_owned()))?;
    let encoding: Vec<char> = chars.take_while(|c| *c != field).collect();

    if encoding.len() < 4 {
        return Err(Hl7Error::InvalidDelimiters(encoding.into_iter().collect()));
    }

    let delimiters = Delimiters {
        field,
        component: encoding[0],
        repetition: encoding[1],
        escape: encoding[2],
        subcomponent: encoding[3],
    };

    let all = [
        delimiters.field,
        delimiters.component,
        delimiters.repetition,
        delimiters.escape,
        delimiters.subcomponent,
    ];
    let distinct = all
        .iter()
        .enumerate()
        .all(|(i, c)| !all[..i].contains(c) && !c.is_alphanumeric());
    if !distinct {
        return Err(Hl7Error::InvalidDelimiters(all.iter().collect()));
    }

    Ok(delimiters)
}

fn parse_header(header: &str, delimiters: Delimiters) -> Segment {
    // "MSH|^~\&|A|B" splits to ["MSH", "^~\&", "A", "B"]; MSH-1 is the separator itself.
    let mut parts = header.split(delimiters.field);
    let mut fields = Vec::new();
    fields.push(parts.next().unwrap_or("MSH").to_owned());
    fields.push(delimiters.field.to_string());
    fields.extend(parts.map(str::to_owned));
    Segment { fields, delimiters }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORU: &str = "MSH|^~\\&|LAB|MATER|PAMS|PAMS|202401150930||ORU^R01^ORU_R01|MSG0001|T|2.4\r\
PID|1|a1b2c3d4-e5f6-0102-0304-05060708090a|SYN00001^^^PAS^MR~SYN0000A^^^PAS^MR||Smith^John^Paul||1980-05-17|M\r\
OBR|1|PL-1|FL-1|^Glucose\r";

    #[test]
    fn test_parses_header_numbering() {
        let msg = Er7Message::parse(ORU).expect("parse");
        let msh = msg.header();
        assert_eq!(msh.field(1), Some("|"));
        assert_eq!(msh.field(2), Some("^~\\&"));
        assert_eq!(msh.field(3), Some("LAB"));
        assert_eq!(msh.field(7), Some("202401150930"));
        assert_eq!(msg.control_id(), Some("MSG0001"));
        assert_eq!(msg.message_type(), MessageType::OruR01);
    }

    #[test]
    fn test_field_repetitions_and_components() {
        let msg = Er7Message::parse(ORU).expect("parse");
        let pid = msg.segment("PID").expect("PID");
        assert_eq!(
            pid.repetitions(3),
            vec!["SYN00001^^^PAS^MR", "SYN0000A^^^PAS^MR"]
        );
        assert_eq!(pid.component(5, 1), Some("Smith"));
        assert_eq!(pid.component(5, 3), Some("Paul"));
        assert_eq!(pid.component(5, 4), None);
        assert_eq!(pid.field(4), None);
        assert_eq!(pid.field(40), None);
    }

    #[test]
    fn test_accepts_lf_line_endings() {
        let text = ORU.replace('\r', "\n");
        let msg = Er7Message::parse(&text).expect("parse");
        assert_eq!(msg.segments("OBR").count(), 1);
    }

    #[test]
    fn test_custom_delimiters() {
        let msg = Er7Message::parse("MSH#$*!%#A#B#C#D#202401010000##ADT$A01#X1\rPID#1##ID1*ID2")
            .expect("parse");
        assert_eq!(msg.delimiters().field, '#');
        assert_eq!(msg.message_type(), MessageType::AdtA01);
        let pid = msg.segment("PID").expect("PID");
        assert_eq!(pid.repetitions(3), vec!["ID1", "ID2"]);
    }

    #[test]
    fn test_rejects_missing_header() {
        assert!(matches!(Er7Message::parse(""), Err(Hl7Error::Empty)));
        assert!(matches!(
            Er7Message::parse("PID|1"),
            Err(Hl7Error::MissingHeader(name)) if name == "PID"
        ));
        assert!(matches!(
            Er7Message::parse("MSH|^~"),
            Err(Hl7Error::InvalidDelimiters(_))
        ));
    }

    #[test]
    fn test_escape_round_trip() {
        let d = Delimiters::default();
        let raw = "Fish & Chips | 50^2 ~ a\\b";
        let escaped = escape(raw, &d);
        assert!(!escaped.contains('|'));
        assert!(!escaped.contains('^'));
        assert_eq!(unescape(&escaped, &d), raw);
    }

    #[test]
    fn test_unescape_leaves_unknown_sequences() {
        let d = Delimiters::default();
        assert_eq!(unescape("a\\H\\b", &d), "a\\H\\b");
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::OmlO21.to_string(), "OML^O21");
        assert_eq!(MessageType::from_parts("SIU", "S12").to_string(), "SIU^S12");
    }
}
