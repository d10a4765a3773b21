use super::peak::PeakMap;
use super::precursor::PrecursorInfo;

/// A single MS/MS spectrum read from an MGF or MSP file.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrumRecord {
    /// The decoded spectrum title
    pub title: String,
    pub scan_number: Option<String>,
    pub precursor: PrecursorInfo,
    pub peaks: PeakMap,
    /// The name of the file the record was read from
    pub file_name: String,
}

impl SpectrumRecord {
    pub fn new(
        title: String,
        scan_number: Option<String>,
        precursor: PrecursorInfo,
        peaks: PeakMap,
        file_name: String,
    ) -> Self {
        Self {
            title,
            scan_number,
            precursor,
            peaks,
            file_name,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn precursor(&self) -> &PrecursorInfo {
        &self.precursor
    }

    pub fn peaks(&self) -> &PeakMap {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}
