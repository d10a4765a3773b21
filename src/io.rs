//! Reading, indexing and rewriting MGF and MSP spectrum files.
//!
//! Both formats are handled by the same engine, parameterized by a [`Dialect`].
//!

pub(crate) mod compression;
pub mod dialect;
pub mod error;
pub mod fields;
pub mod index;
mod offset_index;
pub mod progress;
pub mod reader;
pub mod surgeon;
pub(crate) mod tokenizer;
pub(crate) mod traits;
mod utils;

pub use crate::io::compression::open_text_stream;
pub use crate::io::dialect::{Dialect, FieldKey, LineKind, RecordEnd, RecordStart};
pub use crate::io::error::{FormatError, ReplaceStage, SpectrumFileError, SpectrumFileResult};
pub use crate::io::index::{build_index, index_stream, FileIndex, IndexAccumulator};
pub use crate::io::offset_index::{OffsetEntry, OffsetIndex};
pub use crate::io::progress::{CancellationToken, LogProgress, NoProgress, ProgressSink};
pub use crate::io::reader::{
    infer_dialect, read_spectra, read_spectra_as, SpectrumReader, SpectrumReaderType,
};
pub use crate::io::surgeon::{
    ChargeRange, ChargeRangeSource, Completion, FileSurgeon, ReplaceStrategy, SurgeonOptions,
    SurgeryReport,
};
pub use crate::io::tokenizer::ParserState;
pub use crate::io::traits::SeekRead;
pub use crate::io::utils::{file_name_of, last_modified};
