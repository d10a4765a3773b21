/*!
Single pass indexing of spectrum files.

An [`IndexAccumulator`] folds classified lines into a [`FileIndex`], which maps
each spectrum title to the byte offset of its record and carries summary
statistics over the whole file. The accumulator does no I/O of its own, the
[`index_stream`] and [`build_index`] drivers feed it.
*/
use std::collections::HashMap;
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::spectrum::Charge;

use super::compression::ensure_uncompressed;
use super::dialect::{Dialect, FieldKey, LineKind};
use super::error::{FormatError, SpectrumFileResult};
use super::fields;
use super::offset_index::{OffsetEntry, OffsetIndex};
use super::progress::{percent_of, ProgressSink};
use super::tokenizer::decode_title_lenient;
use super::utils::{decode_line, file_name_of, last_modified, read_raw_line};

/**
A point-in-time snapshot of a spectrum file: where each titled record starts
and what ranges of values the file covers.

Titles are unique. When a title repeats, the first record keeps it and later
ones are stored as `<title>_<n>`. Any rewrite of the file invalidates the
offsets, so a new index must be built afterwards.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileIndex {
    pub(crate) offsets: OffsetIndex,
    pub(crate) precursor_mz: HashMap<usize, f64>,
    pub(crate) file_name: String,
    pub(crate) rt_range: Option<(f64, f64)>,
    pub(crate) max_precursor_mz: Option<f64>,
    pub(crate) max_precursor_intensity: Option<f64>,
    pub(crate) max_charge: u32,
    pub(crate) max_peak_count: usize,
    pub(crate) peak_picked: bool,
    pub(crate) precursor_charges_missing: bool,
    pub(crate) last_modified: Option<DateTime<Utc>>,
    pub(crate) spectrum_count: usize,
}

impl FileIndex {
    fn new(file_name: String) -> Self {
        Self {
            offsets: OffsetIndex::new(),
            file_name,
            peak_picked: true,
            ..Default::default()
        }
    }

    /// The byte offset stored for `title`
    pub fn offset_of(&self, title: &str) -> Option<u64> {
        self.offsets.offset_of(title)
    }

    /// The 0-based position of the record with `title` among all records of the file
    pub fn spectrum_index_of(&self, title: &str) -> Option<usize> {
        self.offsets.spectrum_index_of(title)
    }

    /// The title and offset of the `position`-th titled record
    pub fn get_index(&self, position: usize) -> Option<(&str, u64)> {
        self.offsets.get_index(position)
    }

    pub fn title_at(&self, position: usize) -> Option<&str> {
        self.get_index(position).map(|(title, _)| title)
    }

    /// The precursor m/z of the record at sequential position `spectrum_index`
    pub fn precursor_mz(&self, spectrum_index: usize) -> Option<f64> {
        self.precursor_mz.get(&spectrum_index).copied()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.offsets.contains(title)
    }

    /// Titles in the order they were first seen
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.offsets.titles()
    }

    /// Titles with their offsets, in the order they were first seen
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.offsets.iter()
    }

    pub fn offsets(&self) -> &OffsetIndex {
        &self.offsets
    }

    /// Titles that occurred more than once, with the number of repeats
    pub fn duplicate_titles(&self) -> &IndexMap<String, usize> {
        self.offsets.repeats()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The smallest retention time seen, or 0 if the file had none
    pub fn min_rt(&self) -> f64 {
        self.rt_range.map(|(lo, _)| lo).unwrap_or_default()
    }

    pub fn max_rt(&self) -> Option<f64> {
        self.rt_range.map(|(_, hi)| hi)
    }

    pub fn rt_range(&self) -> Option<(f64, f64)> {
        self.rt_range
    }

    pub fn max_precursor_mz(&self) -> Option<f64> {
        self.max_precursor_mz
    }

    pub fn max_precursor_intensity(&self) -> Option<f64> {
        self.max_precursor_intensity
    }

    /// The largest charge magnitude listed for any precursor
    pub fn max_charge(&self) -> u32 {
        self.max_charge
    }

    pub fn max_peak_count(&self) -> usize {
        self.max_peak_count
    }

    /// `false` once any peak with an intensity of exactly zero was seen
    pub fn peak_picked(&self) -> bool {
        self.peak_picked
    }

    /// `true` if at least one record had no charge
    pub fn precursor_charges_missing(&self) -> bool {
        self.precursor_charges_missing
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// The number of records, titled or not
    pub fn spectrum_count(&self) -> usize {
        self.spectrum_count
    }

    /// The number of titled records
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Folds the lines of one file into a [`FileIndex`]
#[derive(Debug, Clone)]
pub struct IndexAccumulator {
    dialect: Dialect,
    index: FileIndex,
    inside: bool,
    record_offset: u64,
    current_title: Option<String>,
    charge_seen: bool,
    peak_count: usize,
    messages: Vec<String>,
}

impl IndexAccumulator {
    pub fn new(dialect: Dialect, file_name: String) -> Self {
        Self {
            dialect,
            index: FileIndex::new(file_name),
            inside: false,
            record_offset: 0,
            current_title: None,
            charge_seen: false,
            peak_count: 0,
            messages: Vec::new(),
        }
    }

    /// The number of records started so far
    pub fn spectrum_count(&self) -> usize {
        self.index.spectrum_count
    }

    /// Warnings meant for the user produced since the last call
    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// Fold one classified line. `start` is the offset of the line's first byte
    /// and `end` the offset just past its terminator.
    pub fn push(&mut self, kind: LineKind<'_>, start: u64, end: u64) -> Result<(), FormatError> {
        match kind {
            LineKind::Start { payload } => {
                self.close_record();
                self.inside = true;
                self.charge_seen = false;
                self.peak_count = 0;
                self.current_title = None;
                self.index.spectrum_count += 1;
                if self.dialect.title_on_start() {
                    self.record_offset = start;
                    if !payload.is_empty() {
                        let title = self.register_title(payload);
                        if let Some(charge) = fields::charge_from_name(&title) {
                            self.observe_charges(&[charge]);
                        }
                    }
                } else {
                    self.record_offset = end;
                }
            }
            _ if !self.inside => {}
            LineKind::End => self.close_record(),
            LineKind::Field(key, value) => self.push_field(key, value)?,
            LineKind::Data(line) => {
                if let Some(peak) = fields::parse_peak_line(line) {
                    self.peak_count += 1;
                    if peak.intensity == 0.0 {
                        self.index.peak_picked = false;
                    }
                }
            }
            LineKind::Blank | LineKind::Ignored | LineKind::UnknownKey(_) | LineKind::Comment => {}
        }
        Ok(())
    }

    fn push_field(&mut self, key: FieldKey, value: &str) -> Result<(), FormatError> {
        let title = self.current_title.as_deref();
        match key {
            FieldKey::Title => {
                self.register_title(value);
            }
            FieldKey::Charge => {
                let charges = fields::parse_charges(value)?;
                self.observe_charges(&charges);
            }
            FieldKey::PrecursorMass => {
                let (mz, intensity) =
                    fields::parse_precursor_mass(value).map_err(|e| e.with_title(title))?;
                self.observe_precursor(mz, intensity);
            }
            FieldKey::RetentionTime => {
                let rt = fields::parse_retention_time(value).map_err(|e| e.with_title(title))?;
                self.observe_rt(rt.start());
                self.observe_rt(rt.end());
            }
            FieldKey::Comment => {
                let comment = fields::parse_comment(value).map_err(|e| e.with_title(title))?;
                if let Some(mz) = comment.parent_mz {
                    self.observe_precursor(mz, None);
                }
            }
            FieldKey::ScanNumber => {}
        }
        Ok(())
    }

    /// Store the title of the current record under a unique name and return that name
    fn register_title(&mut self, raw: &str) -> String {
        let decoded = match decode_title_lenient(&self.dialect, raw) {
            Ok(title) => title,
            Err((raw, err)) => {
                let message = format!("{err}, keeping the title as written");
                warn!("{message}");
                self.messages.push(message);
                raw
            }
        };
        let entry = OffsetEntry {
            offset: self.record_offset,
            spectrum_index: self.index.spectrum_count.saturating_sub(1),
        };
        let title = self.index.offsets.insert_unique(&decoded, entry);
        if title != decoded {
            let message = format!(
                "Duplicate spectrum title {decoded} in {}, indexed as {title}",
                self.index.file_name
            );
            warn!("{message}");
            self.messages.push(message);
        }
        self.current_title = Some(title.clone());
        title
    }

    fn observe_charges(&mut self, charges: &[Charge]) {
        self.charge_seen = true;
        if let Some(z) = charges.iter().map(|z| z.magnitude).max() {
            self.index.max_charge = self.index.max_charge.max(z);
        }
    }

    fn observe_precursor(&mut self, mz: f64, intensity: Option<f64>) {
        let spectrum_index = self.index.spectrum_count.saturating_sub(1);
        self.index.precursor_mz.insert(spectrum_index, mz);
        self.index.max_precursor_mz = Some(self.index.max_precursor_mz.map_or(mz, |m| m.max(mz)));
        if let Some(intensity) = intensity {
            self.index.max_precursor_intensity = Some(
                self.index
                    .max_precursor_intensity
                    .map_or(intensity, |m| m.max(intensity)),
            );
        }
    }

    fn observe_rt(&mut self, time: f64) {
        self.index.rt_range = Some(match self.index.rt_range {
            Some((lo, hi)) => (lo.min(time), hi.max(time)),
            None => (time, time),
        });
    }

    fn close_record(&mut self) {
        if !self.inside {
            return;
        }
        self.inside = false;
        self.index.max_peak_count = self.index.max_peak_count.max(self.peak_count);
        if !self.charge_seen {
            self.index.precursor_charges_missing = true;
        }
    }

    /// Close any record the input ended in and return the finished index
    pub fn finish(mut self) -> FileIndex {
        if self.inside {
            if self.dialect.ends_at_eof() {
                self.close_record();
            } else {
                warn!(
                    "{} ends inside a record{}",
                    self.index.file_name,
                    self.current_title
                        .as_deref()
                        .map(|t| format!(" (title: {t})"))
                        .unwrap_or_default()
                );
            }
        }
        self.index
    }
}

/// Index the records read from `reader`, whose first byte is at offset 0.
///
/// `total` is the length of the input in bytes, used to report progress. When
/// `progress` reports cancellation the index of the records read so far is
/// returned.
pub fn index_stream<R: BufRead, P: ProgressSink>(
    mut reader: R,
    dialect: Dialect,
    file_name: String,
    total: Option<u64>,
    mut progress: P,
) -> SpectrumFileResult<FileIndex> {
    match total {
        Some(_) => {
            progress.set_indeterminate(false);
            progress.set_maximum(100);
            progress.set_current(0);
        }
        None => progress.set_indeterminate(true),
    }

    let mut accumulator = IndexAccumulator::new(dialect, file_name);
    let mut buffer: Vec<u8> = Vec::new();
    let mut offset: u64 = 0;
    let mut cancelled = false;

    loop {
        let b = read_raw_line(&mut reader, &mut buffer)?;
        if b == 0 {
            break;
        }
        let start = offset;
        offset += b as u64;

        let line = decode_line(&buffer);
        let kind = dialect.classify(&line);
        if matches!(kind, LineKind::Start { .. }) {
            if progress.is_cancelled() {
                cancelled = true;
                break;
            }
            if let Some(total) = total {
                progress.set_current(percent_of(start, total));
            }
        }
        accumulator.push(kind, start, offset)?;
        for message in accumulator.take_messages() {
            progress.append_message(&message);
        }
    }

    let index = accumulator.finish();
    if cancelled {
        info!(
            "Indexing {} was cancelled after {} spectra",
            index.file_name, index.spectrum_count
        );
    } else if total.is_some() {
        progress.set_current(100);
    }
    debug!(
        "Indexed {} spectra ({} titled) in {}",
        index.spectrum_count,
        index.len(),
        index.file_name
    );
    Ok(index)
}

/// Index the uncompressed spectrum file at `path`.
pub fn build_index<P: AsRef<Path>, S: ProgressSink>(
    path: P,
    dialect: Dialect,
    progress: S,
) -> SpectrumFileResult<FileIndex> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let total = file.metadata()?.len();
    let mut reader = io::BufReader::new(file);
    ensure_uncompressed(&mut reader, path)?;
    let mut index = index_stream(reader, dialect, file_name_of(path), Some(total), progress)?;
    index.last_modified = last_modified(path);
    Ok(index)
}
