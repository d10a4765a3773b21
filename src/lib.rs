//! Streaming extraction, random-access indexing and repair of MGF and MSP
//! tandem mass spectrometry files.
//!
//! ```no_run
//! use mzindex::prelude::*;
//! use mzindex::io::{build_index, Dialect, NoProgress, SpectrumReader};
//!
//! let index = build_index("run.mgf", Dialect::MGF, NoProgress)?;
//! let mut reader = SpectrumReader::open_path("run.mgf")?;
//! reader.set_index(index);
//! if let Some(spectrum) = reader.get_spectrum_by_title("scan=1")? {
//!     println!("{} has {} peaks", spectrum.title(), spectrum.len());
//! }
//! # Ok::<(), SpectrumFileError>(())
//! ```
pub mod io;
pub mod prelude;
pub mod spectrum;

pub use crate::io::{build_index, read_spectra, Dialect, FileIndex, FileSurgeon, SpectrumReader};

pub use crate::spectrum::{Charge, Peak, PeakMap, PrecursorInfo, RetentionTime, SpectrumRecord};
