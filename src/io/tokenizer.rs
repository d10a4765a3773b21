/*!
The record state machine shared by streaming extraction and random access.

A reader drives a [`RecordBuilder`] with classified lines while it is inside a
record and converts it into a [`SpectrumRecord`] when the record closes.
*/
use log::warn;

use crate::spectrum::{Charge, PeakMap, PrecursorInfo, RetentionTime, SpectrumRecord};

use super::dialect::{Dialect, FieldKey, LineKind};
use super::error::FormatError;
use super::fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Between records, or before the first one
    Outside,
    InsideRecord,
    Done,
    Error,
}

/// Decode a raw title value for `dialect`, keeping the raw text if it is not
/// properly encoded
pub(crate) fn decode_title_lenient(dialect: &Dialect, raw: &str) -> Result<String, (String, FormatError)> {
    if !dialect.decode_titles {
        return Ok(raw.to_string());
    }
    fields::decode_title(raw).map_err(|err| (raw.to_string(), err))
}

/// Accumulates the fields of the record currently being read
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordBuilder {
    pub title: Option<String>,
    pub scan_number: Option<String>,
    pub mz: f64,
    pub intensity: f64,
    pub charges: Vec<Charge>,
    pub retention_time: Option<RetentionTime>,
    pub peaks: PeakMap,
}

impl RecordBuilder {
    /// Reset the accumulators for a new record. `payload` is the text after the
    /// opening delimiter, the title for dialects that carry it there.
    pub fn start(&mut self, dialect: &Dialect, payload: &str) {
        *self = Self::default();
        if dialect.title_on_start() && !payload.is_empty() {
            self.set_title(dialect, payload);
            if let Some(title) = self.title.as_deref() {
                if let Some(charge) = fields::charge_from_name(title) {
                    self.charges.push(charge);
                }
            }
        }
    }

    fn set_title(&mut self, dialect: &Dialect, raw: &str) {
        let title = match decode_title_lenient(dialect, raw) {
            Ok(title) => title,
            Err((raw, err)) => {
                warn!("{err}, keeping the title as written");
                raw
            }
        };
        self.title = Some(title);
    }

    /// Apply one line read inside the record. Delimiter lines are handled by
    /// the caller and are ignored here.
    pub fn apply(&mut self, dialect: &Dialect, kind: LineKind<'_>) -> Result<(), FormatError> {
        match kind {
            LineKind::Field(key, value) => self.apply_field(dialect, key, value),
            LineKind::Data(line) => {
                if let Some(peak) = fields::parse_peak_line(line) {
                    self.peaks.insert(peak);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply_field(&mut self, dialect: &Dialect, key: FieldKey, value: &str) -> Result<(), FormatError> {
        match key {
            FieldKey::Title => self.set_title(dialect, value),
            FieldKey::Charge => {
                self.charges = fields::parse_charges(value)?;
            }
            FieldKey::PrecursorMass => {
                let (mz, intensity) = fields::parse_precursor_mass(value)
                    .map_err(|e| e.with_title(self.title.as_deref()))?;
                self.mz = mz;
                self.intensity = intensity.unwrap_or_default();
            }
            FieldKey::RetentionTime => match fields::parse_retention_time(value) {
                Ok(rt) => self.retention_time = Some(rt),
                Err(err) => {
                    warn!("{}", err.with_title(self.title.as_deref()));
                    self.retention_time = None;
                }
            },
            FieldKey::ScanNumber => {
                self.scan_number = Some(value.to_string());
            }
            FieldKey::Comment => {
                let comment =
                    fields::parse_comment(value).map_err(|e| e.with_title(self.title.as_deref()))?;
                if let Some(mz) = comment.parent_mz {
                    self.mz = mz;
                }
                if comment.scan_number.is_some() {
                    self.scan_number = comment.scan_number;
                }
            }
        }
        Ok(())
    }

    pub fn into_precursor(self) -> PrecursorInfo {
        PrecursorInfo::new(self.mz, self.intensity, self.charges, self.retention_time)
    }

    pub fn into_record(self, file_name: &str) -> SpectrumRecord {
        let precursor =
            PrecursorInfo::new(self.mz, self.intensity, self.charges, self.retention_time);
        SpectrumRecord::new(
            self.title.unwrap_or_default(),
            self.scan_number,
            precursor,
            self.peaks,
            file_name.to_string(),
        )
    }
}
