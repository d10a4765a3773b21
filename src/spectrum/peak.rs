use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use ordered_float::OrderedFloat;

/// A single centroided fragment peak as read from a peak line.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Self { mz, intensity }
    }
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Peak({}, {})", self.mz, self.intensity)
    }
}

/**
The peaks of one spectrum, keyed by m/z.

Peak lines are not guaranteed to be sorted or unique in the source file. Inserting
a peak at an m/z that is already present replaces the earlier peak, and iteration
always proceeds in ascending m/z order.
*/
#[derive(Default, Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<Peak>", into = "Vec<Peak>")
)]
pub struct PeakMap {
    peaks: BTreeMap<OrderedFloat<f64>, Peak>,
}

impl PeakMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `peak`, returning the peak it displaced if one was already
    /// stored at the same m/z
    pub fn insert(&mut self, peak: Peak) -> Option<Peak> {
        self.peaks.insert(OrderedFloat(peak.mz), peak)
    }

    #[inline]
    pub fn get(&self, mz: f64) -> Option<&Peak> {
        self.peaks.get(&OrderedFloat(mz))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn clear(&mut self) {
        self.peaks.clear()
    }

    pub fn iter(&self) -> PeakIter<'_> {
        PeakIter {
            inner: self.peaks.values(),
        }
    }

    /// The most intense peak, if there are any peaks
    pub fn base_peak(&self) -> Option<&Peak> {
        self.iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }

    /// The total ion current of the spectrum
    pub fn tic(&self) -> f64 {
        self.iter().map(|p| p.intensity).sum()
    }

    pub fn mzs(&self) -> Vec<f64> {
        self.iter().map(|p| p.mz).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.iter().map(|p| p.intensity).collect()
    }
}

/// Iterate over the peaks of a [`PeakMap`] in ascending m/z order
pub struct PeakIter<'a> {
    inner: btree_map::Values<'a, OrderedFloat<f64>, Peak>,
}

impl<'a> Iterator for PeakIter<'a> {
    type Item = &'a Peak;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for PeakIter<'_> {}

impl<'a> IntoIterator for &'a PeakMap {
    type Item = &'a Peak;
    type IntoIter = PeakIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Peak> for PeakMap {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        let mut peaks = Self::new();
        iter.into_iter().for_each(|p| {
            peaks.insert(p);
        });
        peaks
    }
}

impl From<Vec<Peak>> for PeakMap {
    fn from(value: Vec<Peak>) -> Self {
        value.into_iter().collect()
    }
}

impl From<PeakMap> for Vec<Peak> {
    fn from(value: PeakMap) -> Self {
        value.peaks.into_values().collect()
    }
}

impl Extend<Peak> for PeakMap {
    fn extend<T: IntoIterator<Item = Peak>>(&mut self, iter: T) {
        iter.into_iter().for_each(|p| {
            self.insert(p);
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut peaks = PeakMap::new();
        assert!(peaks.insert(Peak::new(200.0, 5.0)).is_none());
        peaks.insert(Peak::new(100.0, 10.0));
        let replaced = peaks.insert(Peak::new(200.0, 7.0)).unwrap();
        assert_eq!(replaced.intensity, 5.0);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks.get(200.0).unwrap().intensity, 7.0);
        assert_eq!(peaks.mzs(), vec![100.0, 200.0]);
    }

    #[test]
    fn test_summaries() {
        let peaks: PeakMap = [
            Peak::new(101.5, 20.0),
            Peak::new(99.0, 30.0),
            Peak::new(150.25, 50.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(peaks.base_peak().unwrap().mz, 150.25);
        assert!((peaks.tic() - 100.0).abs() < 1e-9);
        assert_eq!(peaks.iter().len(), 3);
        assert!(PeakMap::new().base_peak().is_none());
    }
}
