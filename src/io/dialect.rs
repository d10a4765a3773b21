/*!
Describes the line grammar of the text spectrum formats this crate reads.

MGF and MSP share a record-oriented layout: an opening line, header lines of
the form `KEY<separator>value`, peak lines of whitespace separated numbers and
a closing line. A [`Dialect`] captures the differences so that the same
tokenizer, indexer and surgeon code drives both.
*/
use std::fmt::{self, Display};
use std::path::Path;

use crate::spectrum::Charge;

use super::compression::is_gzipped_extension;

/// The header fields the readers make use of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Title,
    Charge,
    PrecursorMass,
    RetentionTime,
    ScanNumber,
    /// A free-text comment carrying `key=value` sub-fields
    Comment,
}

/// How a record is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStart {
    /// A line consisting of exactly this text
    Line(&'static str),
    /// A line starting with this text, the remainder being the record's title
    Prefix(&'static str),
}

/// How a record is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEnd {
    /// A line consisting of exactly this text
    Line(&'static str),
    /// The first blank line, or the end of the input
    BlankLine,
}

/// The classification of a single trimmed line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKind<'a> {
    Blank,
    /// A record opening line. `payload` is the title for dialects that put
    /// the title on the opening line and empty otherwise.
    Start { payload: &'a str },
    End,
    Field(FieldKey, &'a str),
    /// A key the dialect recognizes but whose value is not used
    Ignored,
    /// A `key<separator>value` line with a key outside the dialect's vocabulary
    UnknownKey(&'a str),
    Comment,
    /// Anything else, usually a peak line
    Data(&'a str),
}

impl LineKind<'_> {
    /// Whether this line is part of a record's header block rather than its peak list
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            Self::Field(..) | Self::Ignored | Self::UnknownKey(_) | Self::Comment | Self::Blank
        )
    }
}

/// A text spectrum file dialect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dialect {
    pub name: &'static str,
    /// The file extension, without the leading `.`
    pub extension: &'static str,
    pub start: RecordStart,
    pub end: RecordEnd,
    /// Separates a header key from its value
    pub separator: char,
    /// The text written before a title value when emitting a title line
    pub title_key: &'static str,
    /// The text written before a charge list when emitting a charge line. Dialects
    /// without a charge header cannot have charges injected.
    pub charge_key: Option<&'static str>,
    pub fields: &'static [(&'static str, FieldKey)],
    pub ignored: &'static [&'static str],
    /// Whether title values are percent-encoded
    pub decode_titles: bool,
}

#[cfg(feature = "mgf")]
const MGF_FIELDS: &[(&str, FieldKey)] = &[
    ("TITLE", FieldKey::Title),
    ("CHARGE", FieldKey::Charge),
    ("PEPMASS", FieldKey::PrecursorMass),
    ("RTINSECONDS", FieldKey::RetentionTime),
    ("SCANS", FieldKey::ScanNumber),
];

#[cfg(feature = "mgf")]
const MGF_IGNORED: &[&str] = &[
    "TOLU",
    "TOL",
    "SEQ",
    "COMP",
    "ETAG",
    "TAG",
    "RAWSCANS",
    "INSTRUMENT",
];

#[cfg(feature = "msp")]
const MSP_FIELDS: &[(&str, FieldKey)] = &[
    ("Comment", FieldKey::Comment),
    ("PrecursorMZ", FieldKey::PrecursorMass),
];

#[cfg(feature = "msp")]
const MSP_IGNORED: &[&str] = &["MW", "Num peaks", "Num Peaks"];

impl Dialect {
    /// The Mascot Generic Format, one record per `BEGIN IONS ... END IONS` block
    #[cfg(feature = "mgf")]
    pub const MGF: Dialect = Dialect {
        name: "MGF",
        extension: "mgf",
        start: RecordStart::Line("BEGIN IONS"),
        end: RecordEnd::Line("END IONS"),
        separator: '=',
        title_key: "TITLE=",
        charge_key: Some("CHARGE="),
        fields: MGF_FIELDS,
        ignored: MGF_IGNORED,
        decode_titles: true,
    };

    /// The NIST spectral library format, one record per `Name:` block closed
    /// by a blank line
    #[cfg(feature = "msp")]
    pub const MSP: Dialect = Dialect {
        name: "MSP",
        extension: "msp",
        start: RecordStart::Prefix("Name:"),
        end: RecordEnd::BlankLine,
        separator: ':',
        title_key: "Name: ",
        charge_key: None,
        fields: MSP_FIELDS,
        ignored: MSP_IGNORED,
        decode_titles: true,
    };

    /// Whether the record's title is carried on its opening line. For these
    /// dialects an index offset points at the opening line itself.
    pub fn title_on_start(&self) -> bool {
        matches!(self.start, RecordStart::Prefix(_))
    }

    /// Whether running out of input closes an open record
    pub fn ends_at_eof(&self) -> bool {
        matches!(self.end, RecordEnd::BlankLine)
    }

    /// Classify a single line. Surrounding whitespace, including any line
    /// terminator, is ignored.
    pub fn classify<'a>(&self, line: &'a str) -> LineKind<'a> {
        let line = line.trim();
        if line.is_empty() {
            return match self.end {
                RecordEnd::BlankLine => LineKind::End,
                RecordEnd::Line(_) => LineKind::Blank,
            };
        }
        match self.start {
            RecordStart::Line(text) if line == text => {
                return LineKind::Start { payload: "" };
            }
            RecordStart::Prefix(prefix) => {
                if let Some(rest) = line.strip_prefix(prefix) {
                    return LineKind::Start {
                        payload: rest.trim(),
                    };
                }
            }
            _ => {}
        }
        if let RecordEnd::Line(text) = self.end {
            if line == text {
                return LineKind::End;
            }
        }
        if is_comment(line) {
            return LineKind::Comment;
        }
        let key_shaped = line
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());
        if key_shaped {
            if let Some((key, value)) = line.split_once(self.separator) {
                let key = key.trim();
                if let Some((_, field)) = self.fields.iter().find(|(k, _)| *k == key) {
                    return LineKind::Field(*field, value.trim());
                }
                if self.ignored.contains(&key) {
                    return LineKind::Ignored;
                }
                return LineKind::UnknownKey(key);
            }
        }
        LineKind::Data(line)
    }

    /// Format a header line carrying `title`, without a line terminator
    pub fn format_title_line(&self, title: &str) -> String {
        format!("{}{}", self.title_key, title)
    }

    /// Format a header line listing `charges` joined by ` and `, without a line
    /// terminator. Returns [`None`] if the dialect has no charge header.
    pub fn format_charge_line(&self, charges: &[Charge]) -> Option<String> {
        let key = self.charge_key?;
        let listing: Vec<String> = charges.iter().map(|z| z.to_string()).collect();
        Some(format!("{key}{}", listing.join(" and ")))
    }

    /// Guess the dialect from a file name, looking through a trailing `.gz`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Dialect> {
        let (_, path) = is_gzipped_extension(path.as_ref().to_path_buf());
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        Self::all().into_iter().find(|d| d.extension == ext)
    }

    /// Guess the dialect from the leading bytes of a file
    pub fn from_buffer(buf: &[u8]) -> Option<Dialect> {
        Self::all().into_iter().find(|d| d.appears_in(buf))
    }

    fn appears_in(&self, buf: &[u8]) -> bool {
        match self.start {
            RecordStart::Line(text) => {
                let needle = text.as_bytes();
                buf.windows(needle.len()).any(|window| window == needle)
            }
            RecordStart::Prefix(prefix) => buf
                .split(|b| *b == b'\n')
                .any(|line| line.starts_with(prefix.as_bytes())),
        }
    }

    /// Every dialect compiled into the crate
    pub fn all() -> Vec<Dialect> {
        #[allow(unused_mut)]
        let mut dialects = Vec::new();
        #[cfg(feature = "mgf")]
        dialects.push(Self::MGF);
        #[cfg(feature = "msp")]
        dialects.push(Self::MSP);
        dialects
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Mascot comment lines start with one of `#;!/`
pub fn is_comment(line: &str) -> bool {
    line.starts_with(['#', ';', '!', '/'])
}
