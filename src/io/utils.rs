use std::borrow::Cow;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Read one raw line including its terminator into `buffer`, replacing its
/// previous contents. Returns the number of bytes consumed, zero at the end
/// of the input.
pub(crate) fn read_raw_line<R: BufRead>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<usize> {
    buffer.clear();
    reader.read_until(b'\n', buffer)
}

/// Decode a raw line, replacing any invalid UTF-8
pub(crate) fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}

/// The terminator used by `raw`, falling back to `\n` for an unterminated
/// final line
pub(crate) fn line_ending(raw: &[u8]) -> &'static [u8] {
    if raw.ends_with(b"\r\n") {
        b"\r\n"
    } else {
        b"\n"
    }
}

/// The final component of `path`, used to label records and errors
pub fn file_name_of<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The modification time of the file at `path`, if the platform reports one
pub fn last_modified<P: AsRef<Path>>(path: P) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Name the `part`-th shard of `path` as `<stem>_<part>.<ext>` in the same directory
pub(crate) fn shard_path(path: &Path, part: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{part}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{part}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_helpers() -> io::Result<()> {
        let mut reader = io::Cursor::new(b"BEGIN IONS\r\nEND IONS".to_vec());
        let mut buffer = Vec::new();
        assert_eq!(read_raw_line(&mut reader, &mut buffer)?, 12);
        assert_eq!(line_ending(&buffer), b"\r\n");
        assert_eq!(decode_line(&buffer).trim(), "BEGIN IONS");
        assert_eq!(read_raw_line(&mut reader, &mut buffer)?, 8);
        assert_eq!(line_ending(&buffer), b"\n");
        assert_eq!(read_raw_line(&mut reader, &mut buffer)?, 0);
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn test_paths() {
        assert_eq!(file_name_of("data/run.mgf"), "run.mgf");
        assert_eq!(
            shard_path(Path::new("data/run.mgf"), 3),
            PathBuf::from("data/run_3.mgf")
        );
        assert_eq!(shard_path(Path::new("run"), 1), PathBuf::from("run_1"));
    }
}
