use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use crate::spectrum::{PrecursorInfo, SpectrumRecord};

use super::compression::{ensure_uncompressed, open_text_stream};
use super::dialect::{Dialect, LineKind};
use super::error::{FormatError, SpectrumFileError, SpectrumFileResult};
use super::index::{index_stream, FileIndex};
use super::progress::NoProgress;
use super::tokenizer::{ParserState, RecordBuilder};
use super::traits::SeekRead;
use super::utils::{decode_line, file_name_of, last_modified, read_raw_line};

/// How much of a record a random access read materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchDepth {
    Full,
    /// Stop at the first peak line
    Precursor,
}

/**
A reader for MGF and MSP spectrum files that supports iteration and, when the
source can seek, random access by byte offset, title or position.

Iteration is permissive: malformed peak lines are skipped and unreadable
retention times are left unset. A record cut off by the end of the input is
dropped unless the dialect closes records at the end of the input.
*/
pub struct SpectrumReaderType<R: io::Read> {
    pub handle: io::BufReader<R>,
    pub state: ParserState,
    /// The error that stopped iteration, if any
    pub error: Option<SpectrumFileError>,
    dialect: Dialect,
    file_name: String,
    index: Option<FileIndex>,
    buffer: Vec<u8>,
}

impl<R: io::Read> SpectrumReaderType<R> {
    /// Create a new, unindexed reader
    pub fn new(file: R, dialect: Dialect) -> Self {
        Self::with_file_name(file, dialect, String::new())
    }

    /// Create a new, unindexed reader labelling its records with `file_name`
    pub fn with_file_name(file: R, dialect: Dialect, file_name: String) -> Self {
        Self {
            handle: io::BufReader::new(file),
            state: ParserState::Outside,
            error: None,
            dialect,
            file_name,
            index: None,
            buffer: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The index built by [`Self::build_index`] or attached with [`Self::set_index`]
    pub fn index(&self) -> Option<&FileIndex> {
        self.index.as_ref()
    }

    pub fn set_index(&mut self, index: FileIndex) {
        self.index = Some(index);
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let b = read_raw_line(&mut self.handle, &mut self.buffer)?;
        if b == 0 {
            Ok(None)
        } else {
            Ok(Some(decode_line(&self.buffer).into_owned()))
        }
    }

    /// Read the next complete record from the stream.
    ///
    /// Returns `Ok(None)` once the input is exhausted.
    pub fn read_next_record(&mut self) -> SpectrumFileResult<Option<SpectrumRecord>> {
        if matches!(self.state, ParserState::Done | ParserState::Error) {
            return Ok(None);
        }
        let dialect = self.dialect;
        let mut builder = RecordBuilder::default();
        loop {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    let pending = self.state == ParserState::InsideRecord;
                    self.state = ParserState::Done;
                    if pending {
                        if dialect.ends_at_eof() {
                            return Ok(Some(builder.into_record(&self.file_name)));
                        }
                        warn!(
                            "End of {} reached inside a record, dropping it{}",
                            self.file_name,
                            builder
                                .title
                                .as_deref()
                                .map(|t| format!(" (title: {t})"))
                                .unwrap_or_default()
                        );
                    }
                    return Ok(None);
                }
                Err(err) => {
                    self.state = ParserState::Error;
                    return Err(err.into());
                }
            };

            match dialect.classify(&line) {
                LineKind::Start { payload } => {
                    if self.state == ParserState::InsideRecord {
                        warn!(
                            "A new record started before the previous one ended, discarding {}",
                            builder.title.as_deref().unwrap_or("an untitled record")
                        );
                    }
                    builder.start(&dialect, payload);
                    self.state = ParserState::InsideRecord;
                }
                LineKind::End => {
                    if self.state == ParserState::InsideRecord {
                        self.state = ParserState::Outside;
                        return Ok(Some(builder.into_record(&self.file_name)));
                    }
                }
                kind => {
                    if self.state == ParserState::InsideRecord {
                        if let Err(err) = builder.apply(&dialect, kind) {
                            self.state = ParserState::Error;
                            return Err(err.into());
                        }
                    }
                }
            }
        }
    }
}

impl<R: io::Read> Iterator for SpectrumReaderType<R> {
    type Item = SpectrumRecord;

    /// Read the next spectrum from the file. Iteration stops at the first
    /// error, which is kept in [`SpectrumReaderType::error`].
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next_record() {
            Ok(record) => record,
            Err(err) => {
                warn!("Stopped reading {}: {err}", self.file_name);
                self.error = Some(err);
                None
            }
        }
    }
}

impl<R: SeekRead> SpectrumReaderType<R> {
    /// Construct a new reader and build its index with [`Self::build_index`]
    pub fn new_indexed(file: R, dialect: Dialect, file_name: String) -> SpectrumFileResult<Self> {
        let mut reader = Self::with_file_name(file, dialect, file_name);
        reader.build_index()?;
        Ok(reader)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.handle.seek(pos)
    }

    /// Move back to the start of the stream and resume iteration from there
    pub fn reset(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0))?;
        self.state = ParserState::Outside;
        self.error = None;
        Ok(())
    }

    /// Scan the whole stream and attach the resulting [`FileIndex`]. The
    /// stream position is restored afterwards.
    pub fn build_index(&mut self) -> SpectrumFileResult<&FileIndex> {
        let start = self.handle.stream_position()?;
        let total = self.handle.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(0))?;
        let index = index_stream(
            &mut self.handle,
            self.dialect,
            self.file_name.clone(),
            Some(total),
            NoProgress,
        );
        self.seek(SeekFrom::Start(start))?;
        let index = index?;
        if index.is_empty() {
            warn!("An index was built but no entries were found")
        }
        Ok(self.index.insert(index))
    }

    fn scan_record_at(&mut self, offset: u64, depth: FetchDepth) -> SpectrumFileResult<RecordBuilder> {
        self.seek(SeekFrom::Start(offset))?;
        let dialect = self.dialect;
        let mut builder = RecordBuilder::default();
        // Dialects with the title on the opening line are indexed at that line
        let mut inside = !dialect.title_on_start();
        loop {
            let Some(line) = self.read_line()? else {
                if inside && dialect.ends_at_eof() {
                    return Ok(builder);
                }
                return Err(FormatError::TruncatedRecord {
                    file_name: self.file_name.clone(),
                    title: builder.title,
                }
                .into());
            };
            match dialect.classify(&line) {
                LineKind::Start { payload } if !inside => {
                    builder.start(&dialect, payload);
                    inside = true;
                }
                LineKind::Start { .. } => {
                    if depth == FetchDepth::Precursor {
                        return Ok(builder);
                    }
                    return Err(FormatError::TruncatedRecord {
                        file_name: self.file_name.clone(),
                        title: builder.title,
                    }
                    .into());
                }
                _ if !inside => {}
                LineKind::End => return Ok(builder),
                LineKind::Data(_) if depth == FetchDepth::Precursor => return Ok(builder),
                kind => builder.apply(&dialect, kind)?,
            }
        }
    }

    /// Read the record whose body starts at `offset`, as stored in a [`FileIndex`].
    ///
    /// Reaching the end of the input, or the opening line of another record,
    /// before the record ends is a [`FormatError::TruncatedRecord`]. The next
    /// record is not read in its place.
    /// [`fetch_precursor`](Self::fetch_precursor) stops at the next opening line
    /// without an error.
    pub fn fetch_spectrum(&mut self, offset: u64) -> SpectrumFileResult<SpectrumRecord> {
        let builder = self.scan_record_at(offset, FetchDepth::Full)?;
        Ok(builder.into_record(&self.file_name))
    }

    /// Read only the precursor description of the record at `offset`, stopping
    /// at its first peak line
    pub fn fetch_precursor(&mut self, offset: u64) -> SpectrumFileResult<PrecursorInfo> {
        let builder = self.scan_record_at(offset, FetchDepth::Precursor)?;
        Ok(builder.into_precursor())
    }

    fn fetch_restoring_position(
        &mut self,
        title: &str,
        offset: u64,
    ) -> SpectrumFileResult<SpectrumRecord> {
        let start = self.handle.stream_position()?;
        let result = self.fetch_spectrum(offset);
        self.seek(SeekFrom::Start(start))?;
        let mut record = result?;
        // Report the de-duplicated title the index knows the record by
        record.title = title.to_string();
        Ok(record)
    }

    /// Retrieve a spectrum by its title in the attached index
    pub fn get_spectrum_by_title(&mut self, title: &str) -> SpectrumFileResult<Option<SpectrumRecord>> {
        let Some(offset) = self.index.as_ref().and_then(|idx| idx.offset_of(title)) else {
            debug!("{title} is not in the index of {}", self.file_name);
            return Ok(None);
        };
        self.fetch_restoring_position(title, offset).map(Some)
    }

    /// Retrieve the `index`-th titled spectrum in the attached index
    pub fn get_spectrum_by_index(&mut self, index: usize) -> SpectrumFileResult<Option<SpectrumRecord>> {
        let Some((title, offset)) = self
            .index
            .as_ref()
            .and_then(|idx| idx.get_index(index))
            .map(|(title, offset)| (title.to_string(), offset))
        else {
            return Ok(None);
        };
        self.fetch_restoring_position(&title, offset).map(Some)
    }

    /// Retrieve only the precursor of the spectrum with `title`
    pub fn get_precursor_by_title(&mut self, title: &str) -> SpectrumFileResult<Option<PrecursorInfo>> {
        let Some(offset) = self.index.as_ref().and_then(|idx| idx.offset_of(title)) else {
            return Ok(None);
        };
        let start = self.handle.stream_position()?;
        let result = self.fetch_precursor(offset);
        self.seek(SeekFrom::Start(start))?;
        result.map(Some)
    }
}

impl SpectrumReaderType<fs::File> {
    /// Open the file at `path`, inferring its dialect from the file name
    /// and then its content
    pub fn open_path<P: AsRef<Path>>(path: P) -> SpectrumFileResult<Self> {
        let path = path.as_ref();
        let dialect = infer_dialect(path)?;
        Self::open_path_as(path, dialect)
    }

    /// Open the file at `path` as `dialect`, without looking at its name or content
    pub fn open_path_as<P: AsRef<Path>>(path: P, dialect: Dialect) -> SpectrumFileResult<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        Ok(Self::with_file_name(file, dialect, file_name_of(path)))
    }

    /// Open the uncompressed file at `path` and index it
    pub fn open_indexed<P: AsRef<Path>>(path: P) -> SpectrumFileResult<Self> {
        let path = path.as_ref();
        let mut reader = Self::open_path(path)?;
        ensure_uncompressed(&mut reader.handle, path)?;
        reader.build_index()?;
        if let Some(index) = reader.index.as_mut() {
            index.last_modified = last_modified(path);
        }
        Ok(reader)
    }
}

pub type SpectrumReader = SpectrumReaderType<fs::File>;

/// Work out which dialect the file at `path` is written in
pub fn infer_dialect<P: AsRef<Path>>(path: P) -> SpectrumFileResult<Dialect> {
    let path = path.as_ref();
    if let Some(dialect) = Dialect::from_path(path) {
        return Ok(dialect);
    }
    let mut stream = open_text_stream(path)?;
    let mut head = Vec::new();
    (&mut stream).take(8192).read_to_end(&mut head)?;
    Dialect::from_buffer(&head).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Could not recognize the spectrum format of {}", path.display()),
        )
        .into()
    })
}

/// Read every spectrum in the file at `path`, decompressing gzipped files on
/// the fly
pub fn read_spectra<P: AsRef<Path>>(path: P) -> SpectrumFileResult<Vec<SpectrumRecord>> {
    let path = path.as_ref();
    let dialect = infer_dialect(path)?;
    read_spectra_as(path, dialect)
}

/// Read every spectrum in the file at `path` as `dialect`
pub fn read_spectra_as<P: AsRef<Path>>(path: P, dialect: Dialect) -> SpectrumFileResult<Vec<SpectrumRecord>> {
    let path = path.as_ref();
    let stream = open_text_stream(path)?;
    let mut reader = SpectrumReaderType::with_file_name(stream, dialect, file_name_of(path));
    let mut records = Vec::new();
    while let Some(record) = reader.read_next_record()? {
        records.push(record);
    }
    debug!("Read {} spectra from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    const MGF: &str = "COM=test file
BEGIN IONS
TITLE=first
PEPMASS=400.5 1000
CHARGE=2+
RTINSECONDS=10
100.0 5.0
200.0 10.0
END IONS

BEGIN IONS
TITLE=second
PEPMASS=500.5
RTINSECONDS=nonsense
# comment
150.0 7.0
garbage line
END IONS
";

    const INDEXED_MGF: &str = "COM=test file
BEGIN IONS
TITLE=first
PEPMASS=400.5 1000
CHARGE=2+
RTINSECONDS=10
100.0 5.0
200.0 10.0
END IONS

BEGIN IONS
TITLE=second
PEPMASS=500.5
RTINSECONDS=25.5
# comment
150.0 7.0
END IONS
";

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_stream() {
        let reader = SpectrumReaderType::new(Cursor::new(MGF), Dialect::MGF);
        let records: Vec<_> = reader.collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "first");
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[0].precursor.rt(), Some(10.0));
        assert_eq!(records[1].title, "second");
        assert_eq!(records[1].precursor.retention_time, None);
        assert!(records[1].precursor.charges.is_empty());
        assert_eq!(records[1].len(), 1);
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_truncated_stream() {
        let text = "BEGIN IONS\nTITLE=a\n100 1\nEND IONS\nBEGIN IONS\nTITLE=b\n100 1\n";
        let mut reader = SpectrumReaderType::new(Cursor::new(text), Dialect::MGF);
        assert_eq!(reader.next().unwrap().title, "a");
        assert!(reader.next().is_none());
        assert!(reader.error.is_none());
        assert_eq!(reader.state, ParserState::Done);
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_stream_error() {
        let text = "BEGIN IONS\nTITLE=a\nCHARGE=x\nEND IONS\n";
        let mut reader = SpectrumReaderType::new(Cursor::new(text), Dialect::MGF);
        assert!(reader.next().is_none());
        assert!(matches!(
            reader.error.as_ref().and_then(|e| e.as_format_error()),
            Some(FormatError::InvalidCharge { .. })
        ));
        assert_eq!(reader.state, ParserState::Error);
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_random_access() -> SpectrumFileResult<()> {
        let mut reader = SpectrumReaderType::new_indexed(
            Cursor::new(INDEXED_MGF.as_bytes()),
            Dialect::MGF,
            "test.mgf".into(),
        )?;
        let index = reader.index().unwrap().clone();
        assert_eq!(index.len(), 2);
        assert_eq!(index.rt_range(), Some((10.0, 25.5)));

        for (title, offset) in index.iter() {
            let record = reader.fetch_spectrum(offset)?;
            assert_eq!(record.title, title);
        }
        reader.reset()?;
        assert_eq!(reader.next().unwrap().title, "first");

        let record = reader.get_spectrum_by_title("second")?.unwrap();
        assert_eq!(record.precursor.mz, 500.5);
        assert_eq!(record.len(), 1);
        assert!(reader.get_spectrum_by_title("third")?.is_none());
        assert_eq!(reader.get_spectrum_by_index(0)?.unwrap().title, "first");

        let precursor = reader.get_precursor_by_title("first")?.unwrap();
        assert_eq!(precursor.mz, 400.5);
        assert_eq!(precursor.intensity, 1000.0);

        // lookups leave iteration where it was
        assert_eq!(reader.next().unwrap().title, "second");
        assert!(reader.next().is_none());
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_fetch_truncated() -> SpectrumFileResult<()> {
        let text = "BEGIN IONS\nTITLE=cut\n100 1\n";
        let mut reader = SpectrumReaderType::with_file_name(
            Cursor::new(text.as_bytes()),
            Dialect::MGF,
            "cut.mgf".into(),
        );
        let err = reader.fetch_spectrum(11).unwrap_err();
        assert_eq!(
            err.as_format_error(),
            Some(&FormatError::TruncatedRecord {
                file_name: "cut.mgf".into(),
                title: Some("cut".into())
            })
        );
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_fetch_stops_at_next_start() -> SpectrumFileResult<()> {
        let text = "BEGIN IONS\nTITLE=open\nPEPMASS=300.1\n100 1\nBEGIN IONS\nTITLE=next\n100 2\nEND IONS\n";
        let mut reader = SpectrumReaderType::with_file_name(
            Cursor::new(text.as_bytes()),
            Dialect::MGF,
            "open.mgf".into(),
        );
        let err = reader.fetch_spectrum(11).unwrap_err();
        assert_eq!(
            err.as_format_error(),
            Some(&FormatError::TruncatedRecord {
                file_name: "open.mgf".into(),
                title: Some("open".into())
            })
        );
        assert_eq!(reader.fetch_precursor(11)?.mz, 300.1);
        assert_eq!(reader.fetch_spectrum(53)?.title, "next");
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_fetch_precursor_stops_at_peaks() -> SpectrumFileResult<()> {
        // The charge after the peak list is never reached
        let text = "BEGIN IONS\nTITLE=p\nPEPMASS=300.1\n; note\n100 1\nCHARGE=3+\nEND IONS\n";
        let mut reader = SpectrumReaderType::new(Cursor::new(text.as_bytes()), Dialect::MGF);
        let precursor = reader.fetch_precursor(11)?;
        assert_eq!(precursor.mz, 300.1);
        assert!(precursor.charges.is_empty());
        let record = reader.fetch_spectrum(11)?;
        assert_eq!(record.precursor.max_charge(), Some(3));
        Ok(())
    }

    #[cfg(feature = "msp")]
    #[test_log::test]
    fn test_msp_stream_and_fetch() -> SpectrumFileResult<()> {
        let text = "Name: AAK/2\nComment: Parent=300.2 Scan=5\nNum peaks: 2\n100.1\t10\n200.2\t20\n\nName: CCK/3\nNum peaks: 1\n300.3\t30\n";
        let records: Vec<_> =
            SpectrumReaderType::new(Cursor::new(text), Dialect::MSP).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title, "CCK/3");
        assert_eq!(records[1].precursor.max_charge(), Some(3));

        let mut reader = SpectrumReaderType::new_indexed(
            Cursor::new(text.as_bytes()),
            Dialect::MSP,
            "lib.msp".into(),
        )?;
        let offset = reader.index().unwrap().offset_of("CCK/3").unwrap();
        let record = reader.fetch_spectrum(offset)?;
        assert_eq!(record.title, "CCK/3");
        assert_eq!(record.len(), 1);
        let precursor = reader.fetch_precursor(0)?;
        assert_eq!(precursor.mz, 300.2);
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_open_indexed_rejects_gzip() -> SpectrumFileResult<()> {
        use crate::io::surgeon::test::write_gzipped_fixture;

        let dir = tempfile::tempdir()?;
        let path = write_gzipped_fixture(dir.path(), "run.mgf", INDEXED_MGF)?;
        match SpectrumReader::open_indexed(&path) {
            Err(SpectrumFileError::IOError(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("indexed a gzipped file"),
        }
        // Streaming still decompresses on the fly
        assert_eq!(read_spectra(&path)?.len(), 2);
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_open_with_explicit_dialect() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spectra.dat");
        fs::write(&path, INDEXED_MGF)?;

        let records = read_spectra_as(&path, Dialect::MGF)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file_name, "spectra.dat");

        let mut reader = SpectrumReader::open_path_as(&path, Dialect::MGF)?;
        assert_eq!(reader.dialect().name, "MGF");
        reader.build_index()?;
        assert_eq!(reader.get_spectrum_by_title("second")?.map(|r| r.len()), Some(1));
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_read_spectra_path() -> SpectrumFileResult<()> {
        let records = read_spectra("test/data/small.mgf")?;
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.file_name == "small.mgf"));
        Ok(())
    }
}
