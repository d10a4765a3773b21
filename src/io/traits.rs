use std::io;

/// A byte source that supports random access, required for fetching records
/// by offset
pub trait SeekRead: io::Read + io::Seek {}
impl<T: io::Read + io::Seek> SeekRead for T {}
