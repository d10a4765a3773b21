//! The value types produced by reading spectrum files: peaks, precursor
//! descriptions and whole spectrum records.
pub mod peak;
pub mod precursor;
pub mod record;

pub use crate::spectrum::peak::{Peak, PeakIter, PeakMap};
pub use crate::spectrum::precursor::{Charge, Polarity, PrecursorInfo, RetentionTime};
pub use crate::spectrum::record::SpectrumRecord;
