use std::path::Path;

use super::{ChargeRangeSource, Completion, FileSurgeon};
use crate::io::dialect::{FieldKey, LineKind};
use crate::io::error::{FormatError, SpectrumFileError, SpectrumFileResult};
use crate::io::fields::parse_peak_line;
use crate::io::progress::ProgressSink;

/// Whether `line` is a peak line, two or three whitespace separated fields
/// starting with a number, whose intensity is exactly zero.
///
/// A peak-shaped line whose intensity cannot be read is an error.
pub fn is_zero_intensity_peak(line: &str) -> Result<bool, FormatError> {
    let fields: Vec<&str> = line.split_ascii_whitespace().collect();
    if !(2..=3).contains(&fields.len()) || fields[0].parse::<f64>().is_err() {
        return Ok(false);
    }
    let intensity: f64 = fields[1]
        .parse()
        .map_err(|_| FormatError::InvalidPeakIntensity {
            line: line.trim().to_string(),
        })?;
    Ok(intensity == 0.0)
}

impl<P: ProgressSink, C: ChargeRangeSource> FileSurgeon<P, C> {
    /// Give every record that reaches its first peak line without a charge
    /// line one listing the configured charge range, inserted just before
    /// that peak line
    pub fn add_missing_charges<Q: AsRef<Path>>(&mut self, path: Q) -> SpectrumFileResult<Completion> {
        let dialect = self.dialect;
        let Some(charge_line) = dialect.format_charge_line(&self.charge_range.charges()) else {
            return Err(SpectrumFileError::UnsupportedOperation {
                operation: "Adding missing charges",
                dialect: dialect.name,
            });
        };
        self.rewrite(path.as_ref(), "Adding missing charges", move |mut record, report| {
            let mut insert_at = None;
            for (i, line) in record.lines.iter().enumerate() {
                let text = line.text();
                match dialect.classify(&text) {
                    LineKind::Field(FieldKey::Charge, _) => break,
                    LineKind::Data(data) if parse_peak_line(data).is_some() => {
                        insert_at = Some(i);
                        break;
                    }
                    _ => {}
                }
            }
            if let Some(at) = insert_at {
                record.insert_line(at, &charge_line);
                report.modified += 1;
            }
            Ok(Some(record))
        })
    }

    /// Drop every peak line inside a record whose intensity is exactly zero.
    /// Other lines are copied unchanged.
    pub fn remove_zero_intensity_peaks<Q: AsRef<Path>>(&mut self, path: Q) -> SpectrumFileResult<Completion> {
        let dialect = self.dialect;
        self.rewrite(path.as_ref(), "Removing zero intensity peaks", move |mut record, report| {
            let before = record.lines.len();
            let mut kept = Vec::with_capacity(before);
            for line in record.lines.drain(..) {
                let zero = match dialect.classify(&line.text()) {
                    LineKind::Data(data) => is_zero_intensity_peak(data)?,
                    _ => false,
                };
                if !zero {
                    kept.push(line);
                }
            }
            let removed = before - kept.len();
            record.lines = kept;
            if removed > 0 {
                report.modified += 1;
                report.lines_removed += removed;
            }
            Ok(Some(record))
        })
    }
}
