pub use crate::io::{
    ChargeRangeSource, FormatError, ProgressSink, SeekRead, SpectrumFileError, SpectrumFileResult,
};
pub use crate::spectrum::{Charge, Peak, PeakMap, PrecursorInfo, RetentionTime, SpectrumRecord};
pub use std::io::prelude::*;
