use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::debug;

use super::{decode_title_or_raw, ChargeRangeSource, Completion, FileSurgeon};
use crate::io::error::SpectrumFileResult;
use crate::io::progress::ProgressSink;

impl<P: ProgressSink, C: ChargeRangeSource> FileSurgeon<P, C> {
    /// Keep only the first record with each decoded title. Records without a
    /// title are always kept.
    pub fn remove_duplicate_titles<Q: AsRef<Path>>(&mut self, path: Q) -> SpectrumFileResult<Completion> {
        let dialect = self.dialect;
        let mut seen: HashSet<String> = HashSet::new();
        self.rewrite(path.as_ref(), "Removing duplicate titles", move |record, _| {
            match record.decoded_title(&dialect) {
                Some(title) if seen.contains(&title) => {
                    debug!("Dropping a repeat of {title}");
                    Ok(None)
                }
                Some(title) => {
                    seen.insert(title);
                    Ok(Some(record))
                }
                None => Ok(Some(record)),
            }
        })
    }

    /// Give every repeat of a title a ` (<n>)` suffix, starting from ` (2)`,
    /// so that all records are kept under unique titles
    pub fn rename_duplicate_titles<Q: AsRef<Path>>(&mut self, path: Q) -> SpectrumFileResult<Completion> {
        let dialect = self.dialect;
        let mut seen: HashSet<String> = HashSet::new();
        let mut counters: HashMap<String, usize> = HashMap::new();
        self.rewrite(path.as_ref(), "Renaming duplicate titles", move |mut record, report| {
            let Some((at, raw)) = record.title_line(&dialect) else {
                return Ok(Some(record));
            };
            let title = decode_title_or_raw(&dialect, &raw);
            if !seen.contains(&title) {
                seen.insert(title);
                return Ok(Some(record));
            }
            let counter = counters.entry(title.clone()).or_insert(1);
            let suffix = loop {
                *counter += 1;
                let suffix = format!(" ({counter})");
                if !seen.contains(&format!("{title}{suffix}")) {
                    break suffix;
                }
            };
            debug!("Renaming a repeat of {title} with suffix{suffix}");
            seen.insert(format!("{title}{suffix}"));
            // The suffix decodes to itself, so append it to the title as written
            record.replace_line(at, &dialect.format_title_line(&format!("{raw}{suffix}")));
            report.modified += 1;
            Ok(Some(record))
        })
    }

    /// Give every record without a title one of the form `Spectrum <n>`,
    /// where `n` starts at the record's 1-based position and is raised until
    /// it does not collide with any title seen so far
    pub fn add_missing_titles<Q: AsRef<Path>>(&mut self, path: Q) -> SpectrumFileResult<Completion> {
        let dialect = self.dialect;
        let mut seen: HashSet<String> = HashSet::new();
        let mut position = 0usize;
        self.rewrite(path.as_ref(), "Adding missing titles", move |mut record, report| {
            position += 1;
            if let Some(title) = record.decoded_title(&dialect) {
                seen.insert(title);
                return Ok(Some(record));
            }
            let mut n = position;
            let title = loop {
                let title = format!("Spectrum {n}");
                if !seen.contains(&title) {
                    break title;
                }
                n += 1;
            };
            let line = dialect.format_title_line(&title);
            if dialect.title_on_start() {
                record.replace_line(0, &line);
            } else {
                record.insert_line(1, &line);
            }
            seen.insert(title);
            report.modified += 1;
            Ok(Some(record))
        })
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use crate::io::dialect::Dialect;
    use crate::io::error::SpectrumFileResult;
    use crate::io::index::build_index;
    use crate::io::progress::NoProgress;
    use crate::io::surgeon::test::write_fixture;
    use crate::io::surgeon::{Completion, FileSurgeon, SurgeryReport};

    const DUPLICATED: &str = "COM=library
BEGIN IONS
TITLE=A
100 1
END IONS
BEGIN IONS
TITLE=B
100 2
END IONS
BEGIN IONS
TITLE=A
100 3
END IONS

BEGIN IONS
TITLE=A
100 4
END IONS
";

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_remove_duplicates_idempotent() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(dir.path(), "dups.mgf", DUPLICATED)?;
        let mut surgeon = FileSurgeon::new(Dialect::MGF);

        let completion = surgeon.remove_duplicate_titles(&path)?;
        assert_eq!(
            completion,
            Completion::Finished(SurgeryReport {
                records: 4,
                removed: 2,
                ..Default::default()
            })
        );
        let once = fs::read(&path)?;
        assert_eq!(
            String::from_utf8_lossy(&once),
            "COM=library\nBEGIN IONS\nTITLE=A\n100 1\nEND IONS\nBEGIN IONS\nTITLE=B\n100 2\nEND IONS\n\n"
        );

        surgeon.remove_duplicate_titles(&path)?;
        assert_eq!(fs::read(&path)?, once);
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_rename_duplicates() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(dir.path(), "dups.mgf", DUPLICATED)?;
        FileSurgeon::new(Dialect::MGF).rename_duplicate_titles(&path)?;

        let index = build_index(&path, Dialect::MGF, NoProgress)?;
        assert_eq!(
            index.titles().collect::<Vec<_>>(),
            vec!["A", "B", "A (2)", "A (3)"]
        );
        assert!(index.duplicate_titles().is_empty());
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_add_missing_titles() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let text = "BEGIN IONS\r\n100 1\r\nEND IONS\r\nBEGIN IONS\r\nTITLE=Spectrum 3\r\nEND IONS\r\nBEGIN IONS\r\nEND IONS\r\n";
        let path = write_fixture(dir.path(), "untitled.mgf", text)?;
        let completion = FileSurgeon::new(Dialect::MGF).add_missing_titles(&path)?;
        assert_eq!(completion.report().map(|r| r.modified), Some(2));
        assert_eq!(
            fs::read_to_string(&path)?,
            "BEGIN IONS\r\nTITLE=Spectrum 1\r\n100 1\r\nEND IONS\r\nBEGIN IONS\r\nTITLE=Spectrum 3\r\nEND IONS\r\nBEGIN IONS\r\nTITLE=Spectrum 4\r\nEND IONS\r\n"
        );
        Ok(())
    }

    #[cfg(feature = "msp")]
    #[test_log::test]
    fn test_msp_titles() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let text = "Name: AAK/2\n100\t1\n\nName: AAK/2\n100\t2\n\nName:\n100\t3\n";
        let path = write_fixture(dir.path(), "lib.msp", text)?;
        let mut surgeon = FileSurgeon::new(Dialect::MSP);
        surgeon.add_missing_titles(&path)?;
        surgeon.rename_duplicate_titles(&path)?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "Name: AAK/2\n100\t1\n\nName: AAK/2 (2)\n100\t2\n\nName: Spectrum 3\n100\t3\n"
        );
        Ok(())
    }
}
