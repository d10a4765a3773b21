use std::fs;
use std::io::{self, prelude::*, BufReader};
use std::path;

use flate2::bufread::MultiGzDecoder;

pub fn is_gzipped(header: &[u8]) -> bool {
    header.starts_with(b"\x1f\x8b")
}

pub fn is_gzipped_extension(path: path::PathBuf) -> (bool, path::PathBuf) {
    if let Some(ext) = path.extension() {
        if ext.to_ascii_lowercase() == "gz" {
            (true, path.with_extension(""))
        } else {
            (false, path)
        }
    } else {
        (false, path)
    }
}

/// Fail with [`io::ErrorKind::InvalidInput`] if the stream behind `reader`
/// starts with a gzip header. Byte offsets into a compressed file cannot be
/// used to seek or to rewrite it.
pub(crate) fn ensure_uncompressed<R: BufRead>(reader: &mut R, path: &path::Path) -> io::Result<()> {
    if is_gzipped(reader.fill_buf()?) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} is compressed, random access requires an uncompressed file",
                path.display()
            ),
        ));
    }
    Ok(())
}

/// Open `path` for sequential reading, transparently decompressing it if
/// the content is gzipped.
///
/// The returned stream cannot seek, so it is only suitable for streaming
/// extraction.
pub fn open_text_stream<P: AsRef<path::Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let mut handle = BufReader::new(fs::File::open(path)?);
    let header = handle.fill_buf()?;
    if is_gzipped(header) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(handle))))
    } else {
        Ok(Box::new(handle))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    #[test]
    fn test_open_gzipped() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("spectra.mgf.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path)?, Compression::default());
        encoder.write_all(b"BEGIN IONS\nEND IONS\n")?;
        encoder.finish()?;

        assert!(is_gzipped_extension(path.clone()).0);
        let mut text = String::new();
        open_text_stream(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, "BEGIN IONS\nEND IONS\n");
        Ok(())
    }

    #[test]
    fn test_open_plain() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("spectra.mgf");
        fs::write(&path, "BEGIN IONS\n")?;
        let mut text = String::new();
        open_text_stream(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, "BEGIN IONS\n");
        assert!(!is_gzipped_extension(path).0);
        Ok(())
    }
}
