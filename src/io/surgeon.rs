/*!
Whole-file rewrites of spectrum files.

Each operation streams the source file record by record into a temporary file
next to it and then replaces the original. Bytes that an operation does not
touch are copied verbatim, including their line terminators. Any
[`FileIndex`](crate::io::FileIndex) built before a rewrite is stale afterwards.
*/
use std::borrow::Cow;
use std::fs;
use std::io::{self, prelude::*, BufReader, BufWriter};
use std::path::Path;

use log::{debug, info, warn};
use tempfile::{NamedTempFile, PathPersistError};

use crate::spectrum::Charge;

use super::compression::ensure_uncompressed;
use super::dialect::{Dialect, FieldKey, LineKind};
use super::error::{ReplaceStage, SpectrumFileError, SpectrumFileResult};
use super::progress::{percent_of, NoProgress, ProgressSink};
use super::tokenizer::decode_title_lenient;
use super::utils::{decode_line, line_ending, read_raw_line};

mod repair;
mod split;
mod titles;

pub use repair::is_zero_intensity_peak;

/// Supplies the charge states injected into records that lack one
pub trait ChargeRangeSource {
    fn min_charge(&self) -> u32;
    fn max_charge(&self) -> u32;

    /// Every charge from the minimum to the maximum, inclusive
    fn charges(&self) -> Vec<Charge> {
        (self.min_charge()..=self.max_charge())
            .map(Charge::positive)
            .collect()
    }
}

/// An inclusive range of positive charge states, `2+` to `4+` by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargeRange {
    pub min: u32,
    pub max: u32,
}

impl ChargeRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }
}

impl Default for ChargeRange {
    fn default() -> Self {
        Self::new(2, 4)
    }
}

impl ChargeRangeSource for ChargeRange {
    fn min_charge(&self) -> u32 {
        self.min
    }

    fn max_charge(&self) -> u32 {
        self.max
    }
}

/// How the rewritten file takes the place of the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReplaceStrategy {
    /// Delete the original, then rename the rewritten file into its place. If
    /// the rename fails the original is gone and the rewritten file is kept
    /// under its temporary name.
    #[default]
    DeleteThenRename,
    /// Rename the rewritten file over the original in one step, where the
    /// platform allows it
    AtomicRename,
}

/// Serializable configuration for a [`FileSurgeon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurgeonOptions {
    pub charge_range: ChargeRange,
    pub replace_strategy: ReplaceStrategy,
}

/// What a rewrite did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurgeryReport {
    /// Records read from the source
    pub records: usize,
    /// Records written with changes
    pub modified: usize,
    /// Records dropped entirely
    pub removed: usize,
    /// Lines dropped from records that were kept
    pub lines_removed: usize,
}

/// The outcome of an operation that can be cancelled between records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T = SurgeryReport> {
    Finished(T),
    /// The operation stopped at a record boundary, the original file was left
    /// untouched and nothing it wrote was kept
    Cancelled,
}

impl<T> Completion<T> {
    pub fn report(&self) -> Option<&T> {
        match self {
            Self::Finished(report) => Some(report),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// One raw line, terminator included
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawLine {
    pub bytes: Vec<u8>,
}

impl RawLine {
    fn from_text(text: &str, ending: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(text.len() + ending.len());
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(ending);
        Self { bytes }
    }

    pub fn text(&self) -> Cow<'_, str> {
        decode_line(&self.bytes)
    }

    pub fn ending(&self) -> &'static [u8] {
        line_ending(&self.bytes)
    }
}

/// The lines of one record, from its opening line through its closing line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawRecord {
    pub lines: Vec<RawLine>,
}

impl RawRecord {
    pub fn byte_len(&self) -> u64 {
        self.lines.iter().map(|l| l.bytes.len() as u64).sum()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for line in self.lines.iter() {
            writer.write_all(&line.bytes)?;
        }
        Ok(())
    }

    /// The position of the line carrying the record's title and the title as written
    pub fn title_line(&self, dialect: &Dialect) -> Option<(usize, String)> {
        self.lines.iter().enumerate().find_map(|(i, line)| {
            let text = line.text();
            match dialect.classify(&text) {
                LineKind::Start { payload } if dialect.title_on_start() && !payload.is_empty() => {
                    Some((i, payload.to_string()))
                }
                LineKind::Field(FieldKey::Title, value) => Some((i, value.to_string())),
                _ => None,
            }
        })
    }

    pub fn decoded_title(&self, dialect: &Dialect) -> Option<String> {
        self.title_line(dialect)
            .map(|(_, raw)| decode_title_or_raw(dialect, &raw))
    }

    /// Replace the text of line `at`, keeping its terminator
    pub fn replace_line(&mut self, at: usize, text: &str) {
        if let Some(line) = self.lines.get_mut(at) {
            *line = RawLine::from_text(text, line.ending());
        }
    }

    /// Insert a line before line `at`, terminated like the line before it
    pub fn insert_line(&mut self, at: usize, text: &str) {
        let ending = at
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(|l| l.ending())
            .unwrap_or(b"\n".as_slice());
        self.lines
            .insert(at.min(self.lines.len()), RawLine::from_text(text, ending));
    }
}

pub(crate) fn decode_title_or_raw(dialect: &Dialect, raw: &str) -> String {
    match decode_title_lenient(dialect, raw) {
        Ok(title) => title,
        Err((raw, err)) => {
            warn!("{err}, keeping the title as written");
            raw
        }
    }
}

#[derive(Debug)]
pub(crate) enum Chunk {
    /// A line outside any record
    Line(RawLine),
    Record(RawRecord),
}

impl Chunk {
    pub fn byte_len(&self) -> u64 {
        match self {
            Self::Line(line) => line.bytes.len() as u64,
            Self::Record(record) => record.byte_len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Start,
    End,
    Other,
}

/// Splits a stream into whole records and the lines between them
pub(crate) struct RecordChunks<R: BufRead> {
    reader: R,
    dialect: Dialect,
    pending: Option<RawLine>,
    consumed: u64,
    buffer: Vec<u8>,
}

impl<R: BufRead> RecordChunks<R> {
    pub fn new(reader: R, dialect: Dialect) -> Self {
        Self {
            reader,
            dialect,
            pending: None,
            consumed: 0,
            buffer: Vec::new(),
        }
    }

    /// Bytes handed out as chunks so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn read_line(&mut self) -> io::Result<Option<RawLine>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let b = read_raw_line(&mut self.reader, &mut self.buffer)?;
        if b == 0 {
            return Ok(None);
        }
        Ok(Some(RawLine {
            bytes: self.buffer.clone(),
        }))
    }

    fn boundary_of(&self, line: &RawLine) -> Boundary {
        match self.dialect.classify(&line.text()) {
            LineKind::Start { .. } => Boundary::Start,
            LineKind::End => Boundary::End,
            _ => Boundary::Other,
        }
    }

    pub fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        let Some(first) = self.read_line()? else {
            return Ok(None);
        };
        if self.boundary_of(&first) != Boundary::Start {
            self.consumed += first.bytes.len() as u64;
            return Ok(Some(Chunk::Line(first)));
        }
        let mut record = RawRecord {
            lines: vec![first],
        };
        while let Some(line) = self.read_line()? {
            match self.boundary_of(&line) {
                Boundary::Start => {
                    debug!("A record started before the previous one ended");
                    self.pending = Some(line);
                    break;
                }
                Boundary::End => {
                    record.lines.push(line);
                    break;
                }
                Boundary::Other => record.lines.push(line),
            }
        }
        self.consumed += record.byte_len();
        Ok(Some(Chunk::Record(record)))
    }
}

/// Move `temp` into the place of `target`
pub(crate) fn replace_file(
    temp: NamedTempFile,
    target: &Path,
    strategy: ReplaceStrategy,
) -> SpectrumFileResult<()> {
    if let Ok(metadata) = fs::metadata(target) {
        if let Err(err) = fs::set_permissions(temp.path(), metadata.permissions()) {
            debug!("Could not copy permissions of {}: {err}", target.display());
        }
    }
    match strategy {
        ReplaceStrategy::AtomicRename => {
            temp.persist(target)
                .map_err(|err| SpectrumFileError::ReplaceFailed {
                    stage: ReplaceStage::Rename,
                    path: target.to_path_buf(),
                    source: err.error,
                })?;
        }
        ReplaceStrategy::DeleteThenRename => {
            let temp = temp.into_temp_path();
            fs::remove_file(target).map_err(|source| SpectrumFileError::ReplaceFailed {
                stage: ReplaceStage::Delete,
                path: target.to_path_buf(),
                source,
            })?;
            temp.persist(target).map_err(|err| {
                let PathPersistError { error, path } = err;
                match path.keep() {
                    Ok(kept) => warn!("The rewritten file was left at {}", kept.display()),
                    Err(keep_err) => warn!("The rewritten file could not be kept: {keep_err}"),
                }
                SpectrumFileError::ReplaceFailed {
                    stage: ReplaceStage::Rename,
                    path: target.to_path_buf(),
                    source: error,
                }
            })?;
        }
    }
    Ok(())
}

/**
Rewrites spectrum files of one [`Dialect`].

```no_run
use mzindex::io::{Dialect, FileSurgeon, ChargeRange};

let mut surgeon = FileSurgeon::new(Dialect::MGF).with_charge_range(ChargeRange::new(2, 3));
surgeon.add_missing_charges("run.mgf")?;
surgeon.remove_duplicate_titles("run.mgf")?;
# Ok::<(), mzindex::io::SpectrumFileError>(())
```
*/
#[derive(Debug, Clone)]
pub struct FileSurgeon<P: ProgressSink = NoProgress, C: ChargeRangeSource = ChargeRange> {
    dialect: Dialect,
    progress: P,
    charge_range: C,
    replace_strategy: ReplaceStrategy,
}

impl FileSurgeon {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            progress: NoProgress,
            charge_range: ChargeRange::default(),
            replace_strategy: ReplaceStrategy::default(),
        }
    }

    pub fn from_options(dialect: Dialect, options: SurgeonOptions) -> Self {
        Self::new(dialect)
            .with_charge_range(options.charge_range)
            .with_replace_strategy(options.replace_strategy)
    }
}

impl<P: ProgressSink, C: ChargeRangeSource> FileSurgeon<P, C> {
    pub fn with_progress<Q: ProgressSink>(self, progress: Q) -> FileSurgeon<Q, C> {
        FileSurgeon {
            dialect: self.dialect,
            progress,
            charge_range: self.charge_range,
            replace_strategy: self.replace_strategy,
        }
    }

    pub fn with_charge_range<D: ChargeRangeSource>(self, charge_range: D) -> FileSurgeon<P, D> {
        FileSurgeon {
            dialect: self.dialect,
            progress: self.progress,
            charge_range,
            replace_strategy: self.replace_strategy,
        }
    }

    pub fn with_replace_strategy(mut self, replace_strategy: ReplaceStrategy) -> Self {
        self.replace_strategy = replace_strategy;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn into_progress(self) -> P {
        self.progress
    }

    /// Stream `path` through `edit` one record at a time and replace it with
    /// the result. Returning `None` from `edit` drops the record.
    fn rewrite<F>(&mut self, path: &Path, operation: &str, mut edit: F) -> SpectrumFileResult<Completion>
    where
        F: FnMut(RawRecord, &mut SurgeryReport) -> SpectrumFileResult<Option<RawRecord>>,
    {
        let file = fs::File::open(path)?;
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        ensure_uncompressed(&mut reader, path)?;
        let mut chunks = RecordChunks::new(reader, self.dialect);

        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut writer = BufWriter::new(NamedTempFile::new_in(directory)?);

        self.progress.set_indeterminate(false);
        self.progress.set_maximum(100);
        self.progress.set_current(0);

        let mut report = SurgeryReport::default();
        while let Some(chunk) = chunks.next_chunk()? {
            match chunk {
                Chunk::Line(line) => writer.write_all(&line.bytes)?,
                Chunk::Record(record) => {
                    if self.progress.is_cancelled() {
                        info!("{operation} on {} was cancelled", path.display());
                        return Ok(Completion::Cancelled);
                    }
                    self.progress.set_current(percent_of(chunks.consumed(), total));
                    report.records += 1;
                    match edit(record, &mut report)? {
                        Some(record) => record.write_to(&mut writer)?,
                        None => report.removed += 1,
                    }
                }
            }
        }

        let temp = writer.into_inner().map_err(|err| err.into_error())?;
        temp.as_file().sync_all()?;
        replace_file(temp, path, self.replace_strategy)?;
        self.progress.set_current(100);
        info!(
            "{operation} on {}: {} records read, {} modified, {} removed",
            path.display(),
            report.records,
            report.modified,
            report.removed
        );
        Ok(Completion::Finished(report))
    }
}
