use std::fs;
use std::io::{prelude::*, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::info;

use super::{ChargeRangeSource, Chunk, Completion, FileSurgeon, RecordChunks};
use crate::io::compression::ensure_uncompressed;
use crate::io::error::SpectrumFileResult;
use crate::io::index::{build_index, FileIndex};
use crate::io::progress::{percent_of, NoProgress, ProgressSink};
use crate::io::utils::shard_path;

impl<P: ProgressSink, C: ChargeRangeSource> FileSurgeon<P, C> {
    /**
    Copy the records of `path` into consecutive shards named `<stem>_<n>.<ext>`
    next to it, leaving the source untouched.

    A new shard is started once the current one would exceed
    `max_spectra_per_part` records, unless what is left of the source is no
    more than half of what the current shard already holds, in which case the
    remainder is appended to the current shard instead. Lines outside records
    stay with the shard they were read into.

    Each shard is indexed after it is written and the indices are returned in
    shard order. If cancelled, every shard written so far is deleted. A
    gzipped source is rejected before any shard is created.
    */
    pub fn split_file<Q: AsRef<Path>>(
        &mut self,
        path: Q,
        max_spectra_per_part: usize,
    ) -> SpectrumFileResult<Completion<Vec<FileIndex>>> {
        let path = path.as_ref();
        let max_spectra_per_part = max_spectra_per_part.max(1);
        let file = fs::File::open(path)?;
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        ensure_uncompressed(&mut reader, path)?;
        let mut chunks = RecordChunks::new(reader, self.dialect);

        let mut shards: Vec<PathBuf> = vec![shard_path(path, 1)];
        let mut writer = BufWriter::new(fs::File::create(&shards[0])?);
        let mut in_shard = 0usize;
        let mut bytes_since_split = 0u64;

        self.progress.set_indeterminate(false);
        self.progress.set_maximum(100);
        self.progress.set_current(0);

        while let Some(chunk) = chunks.next_chunk()? {
            let unread = total.saturating_sub(chunks.consumed() - chunk.byte_len());
            match chunk {
                Chunk::Line(line) => {
                    writer.write_all(&line.bytes)?;
                    bytes_since_split += line.bytes.len() as u64;
                }
                Chunk::Record(record) => {
                    if self.progress.is_cancelled() {
                        info!("Splitting {} was cancelled", path.display());
                        drop(writer);
                        for shard in shards.iter() {
                            fs::remove_file(shard)?;
                        }
                        return Ok(Completion::Cancelled);
                    }
                    self.progress.set_current(percent_of(chunks.consumed(), total));
                    in_shard += 1;
                    if in_shard > max_spectra_per_part && unread > bytes_since_split / 2 {
                        writer.flush()?;
                        let next = shard_path(path, shards.len() + 1);
                        writer = BufWriter::new(fs::File::create(&next)?);
                        shards.push(next);
                        // The record that triggered the split is the first of the new shard
                        in_shard = 1;
                        bytes_since_split = 0;
                    }
                    record.write_to(&mut writer)?;
                    bytes_since_split += record.byte_len();
                }
            }
        }
        writer.flush()?;
        drop(writer);

        let indices = shards
            .iter()
            .map(|shard| build_index(shard, self.dialect, NoProgress))
            .collect::<SpectrumFileResult<Vec<_>>>()?;
        self.progress.set_current(100);
        info!(
            "Split {} into {} parts holding {} spectra",
            path.display(),
            indices.len(),
            indices.iter().map(|i| i.spectrum_count()).sum::<usize>()
        );
        Ok(Completion::Finished(indices))
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use crate::io::dialect::Dialect;
    use crate::io::error::SpectrumFileResult;
    use crate::io::index::build_index;
    use crate::io::progress::NoProgress;
    use crate::io::error::SpectrumFileError;
    use crate::io::progress::test::RecordingProgress;
    use crate::io::surgeon::test::{write_fixture, write_gzipped_fixture};
    use crate::io::surgeon::{Completion, FileSurgeon};

    fn make_records(n: usize) -> String {
        let mut text = String::from("COM=split me\n");
        for i in 0..n {
            text.push_str(&format!(
                "BEGIN IONS\nTITLE=s{i}\nPEPMASS={}.5\nCHARGE=2+\n100 1\n200 2\nEND IONS\n",
                400 + i
            ));
        }
        text
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_split_counts() -> SpectrumFileResult<()> {
        for (n, k) in [(10, 3), (10, 5), (7, 10), (1, 1), (12, 4)] {
            let dir = tempfile::tempdir()?;
            let path = write_fixture(dir.path(), "run.mgf", &make_records(n))?;
            let original = build_index(&path, Dialect::MGF, NoProgress)?;

            let Completion::Finished(shards) = FileSurgeon::new(Dialect::MGF).split_file(&path, k)?
            else {
                panic!("split of {n} records was cancelled");
            };
            let total: usize = shards.iter().map(|s| s.spectrum_count()).sum();
            assert_eq!(total, original.spectrum_count());

            for (i, shard) in shards.iter().enumerate() {
                let shard_path = dir.path().join(format!("run_{}.mgf", i + 1));
                assert_eq!(shard.file_name(), format!("run_{}.mgf", i + 1));
                let text = fs::read_to_string(&shard_path)?;
                let starts = text.lines().filter(|l| l.trim() == "BEGIN IONS").count();
                assert_eq!(shard.spectrum_count(), starts);
                assert!(shard.spectrum_count() <= k || i + 1 == shards.len());
            }
            assert_eq!(fs::read_to_string(&path)?, make_records(n));
        }
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_split_avoids_small_tail() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(dir.path(), "run.mgf", &make_records(7))?;
        let Completion::Finished(shards) = FileSurgeon::new(Dialect::MGF).split_file(&path, 3)? else {
            panic!("split was cancelled");
        };
        let counts: Vec<usize> = shards.iter().map(|s| s.spectrum_count()).collect();
        assert_eq!(counts, vec![3, 4]);
        assert_eq!(shards[1].titles().next(), Some("s3"));
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_split_cancelled_leaves_no_shards() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(dir.path(), "run.mgf", &make_records(10))?;
        let progress = RecordingProgress {
            cancel_after: Some(5),
            ..Default::default()
        };
        let mut surgeon = FileSurgeon::new(Dialect::MGF).with_progress(progress);
        let completion = surgeon.split_file(&path, 3)?;
        assert!(completion.is_cancelled());
        assert_eq!(surgeon.progress().polls.get(), 6);
        for i in 1..=4 {
            assert!(!dir.path().join(format!("run_{i}.mgf")).exists());
        }
        assert_eq!(fs::read_to_string(&path)?, make_records(10));
        Ok(())
    }

    #[cfg(feature = "mgf")]
    #[test_log::test]
    fn test_split_rejects_gzip() -> SpectrumFileResult<()> {
        let dir = tempfile::tempdir()?;
        let path = write_gzipped_fixture(dir.path(), "run.mgf", &make_records(4))?;
        let err = FileSurgeon::new(Dialect::MGF).split_file(&path, 2).unwrap_err();
        assert!(matches!(err, SpectrumFileError::IOError(_)));
        assert!(!dir.path().join("run_1.mgf").exists());
        Ok(())
    }

    #[cfg(feature = "msp")]
    #[test_log::test]
    fn test_split_msp() -> SpectrumFileResult<()> {
        let mut text = String::new();
        for i in 0..5 {
            text.push_str(&format!(
                "Name: pep{i}/2\nPrecursorMZ: {}.25\nNum peaks: 2\n100\t1\n200\t2\n\n",
                500 + i
            ));
        }
        let dir = tempfile::tempdir()?;
        let path = write_fixture(dir.path(), "lib.msp", &text)?;
        let Completion::Finished(shards) = FileSurgeon::new(Dialect::MSP).split_file(&path, 2)? else {
            panic!("split was cancelled");
        };
        let counts: Vec<usize> = shards.iter().map(|s| s.spectrum_count()).collect();
        assert_eq!(counts, vec![2, 3]);
        assert_eq!(shards[1].file_name(), "lib_2.msp");
        assert_eq!(shards[1].titles().next(), Some("pep2/2"));
        let second = fs::read_to_string(dir.path().join("lib_2.msp"))?;
        assert!(second.starts_with("Name: pep2/2\n"));
        assert_eq!(second.matches("Name: ").count(), 3);
        assert_eq!(fs::read_to_string(&path)?, text);
        Ok(())
    }
}
