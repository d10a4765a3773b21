use std::fmt::{self, Display};

/// The sign of an ion's charge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl Polarity {
    pub fn sign(&self) -> i32 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Positive => '+',
            Self::Negative => '-',
        }
    }
}

/// A charge state hypothesis for a precursor ion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Charge {
    pub polarity: Polarity,
    pub magnitude: u32,
}

impl Charge {
    pub const fn new(polarity: Polarity, magnitude: u32) -> Self {
        Self {
            polarity,
            magnitude,
        }
    }

    pub const fn positive(magnitude: u32) -> Self {
        Self::new(Polarity::Positive, magnitude)
    }

    pub const fn negative(magnitude: u32) -> Self {
        Self::new(Polarity::Negative, magnitude)
    }

    /// The charge as a signed integer
    pub fn value(&self) -> i32 {
        self.polarity.sign() * self.magnitude as i32
    }
}

impl Default for Charge {
    fn default() -> Self {
        Self::positive(1)
    }
}

/// Formats as the suffixed notation used in charge headers, e.g. `2+`
impl Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.polarity.as_char())
    }
}

/**
The chromatographic elution time of a spectrum, in seconds. Some writers report
the interval over which the precursor was observed rather than a single
time point.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RetentionTime {
    Point(f64),
    Window { start: f64, end: f64 },
}

impl RetentionTime {
    /// The earliest time covered
    pub fn start(&self) -> f64 {
        match self {
            Self::Point(t) => *t,
            Self::Window { start, .. } => *start,
        }
    }

    /// The latest time covered
    pub fn end(&self) -> f64 {
        match self {
            Self::Point(t) => *t,
            Self::Window { end, .. } => *end,
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Self::Window { .. })
    }
}

impl Display for RetentionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point(t) => write!(f, "{t}"),
            Self::Window { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Describes the precursor ion that was fragmented to produce a spectrum
pub struct PrecursorInfo {
    pub mz: f64,
    pub intensity: f64,
    /// Every charge state listed for the precursor. May be empty when the
    /// source record did not carry a charge.
    pub charges: Vec<Charge>,
    /// Absent when the record had no retention time or it could not be read
    pub retention_time: Option<RetentionTime>,
}

impl PrecursorInfo {
    pub fn new(
        mz: f64,
        intensity: f64,
        charges: Vec<Charge>,
        retention_time: Option<RetentionTime>,
    ) -> Self {
        Self {
            mz,
            intensity,
            charges,
            retention_time,
        }
    }

    /// The single retention time point, if the precursor was not given a window
    pub fn rt(&self) -> Option<f64> {
        match self.retention_time {
            Some(RetentionTime::Point(t)) => Some(t),
            _ => None,
        }
    }

    /// The retention time window bounds, if the precursor was given one
    pub fn rt_window(&self) -> Option<(f64, f64)> {
        match self.retention_time {
            Some(RetentionTime::Window { start, end }) => Some((start, end)),
            _ => None,
        }
    }

    pub fn max_charge(&self) -> Option<u32> {
        self.charges.iter().map(|z| z.magnitude).max()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_charge_display() {
        assert_eq!(Charge::positive(2).to_string(), "2+");
        assert_eq!(Charge::negative(3).to_string(), "3-");
        assert_eq!(Charge::negative(3).value(), -3);
        assert_eq!(Charge::default(), Charge::positive(1));
    }

    #[test]
    fn test_rt_representation() {
        let prec = PrecursorInfo::new(
            500.0,
            0.0,
            vec![Charge::positive(2), Charge::positive(3)],
            Some(RetentionTime::Window {
                start: 10.0,
                end: 20.0,
            }),
        );
        assert_eq!(prec.rt(), None);
        assert_eq!(prec.rt_window(), Some((10.0, 20.0)));
        assert_eq!(prec.max_charge(), Some(3));
        assert_eq!(prec.retention_time.unwrap().to_string(), "10-20");
        assert!(prec.retention_time.is_some_and(|rt| rt.is_window()));
        assert!(!RetentionTime::Point(5.0).is_window());
        assert_eq!(RetentionTime::Window { start: 1.5, end: 3.0 }.end(), 3.0);

        let prec = PrecursorInfo {
            retention_time: Some(RetentionTime::Point(121.25)),
            ..Default::default()
        };
        assert_eq!(prec.rt(), Some(121.25));
        assert_eq!(prec.rt_window(), None);
        assert_eq!(prec.max_charge(), None);
    }
}
