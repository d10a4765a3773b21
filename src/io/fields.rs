//! Parsers for the values of individual header and peak lines.
use std::sync::LazyLock;

use regex::Regex;

use crate::spectrum::{Charge, Peak, Polarity, RetentionTime};

use super::error::FormatError;

/// Parse a charge header value such as `2+ and 3+`, `2,3+` or `Mr`.
///
/// Tokens are separated by ` and ` or `,`. Tokens equal to `Mr` are skipped. If no
/// charge remains, a single default charge of `1+` is returned.
pub fn parse_charges(value: &str) -> Result<Vec<Charge>, FormatError> {
    let mut charges = Vec::new();
    for piece in value.split(" and ") {
        for token in piece.split(',') {
            let token = token.trim();
            if token.is_empty() || token.eq_ignore_ascii_case("Mr") {
                continue;
            }
            charges.push(parse_charge(token)?);
        }
    }
    if charges.is_empty() {
        charges.push(Charge::default());
    }
    Ok(charges)
}

/// Parse a single charge token, e.g. `2+`, `3-` or `2`
pub fn parse_charge(token: &str) -> Result<Charge, FormatError> {
    let invalid = || FormatError::InvalidCharge {
        token: token.to_string(),
    };
    let (tail_sign, value) = if let Some(stripped) = token.strip_suffix('+') {
        (Some(Polarity::Positive), stripped)
    } else if let Some(stripped) = token.strip_suffix('-') {
        (Some(Polarity::Negative), stripped)
    } else {
        (None, token)
    };
    let value = value.trim();

    if tail_sign.is_some() && (value.starts_with('-') || value.starts_with('+')) {
        return Err(invalid());
    }

    let z: i64 = value.parse().map_err(|_| invalid())?;
    let polarity = match tail_sign {
        Some(polarity) => polarity,
        None if z < 0 => Polarity::Negative,
        None => Polarity::Positive,
    };
    let magnitude = u32::try_from(z.unsigned_abs()).map_err(|_| invalid())?;
    Ok(Charge::new(polarity, magnitude))
}

/// Parse a retention time header value.
///
/// A single value is a time point and may be wrapped as an ISO 8601 duration,
/// `PT121.25S`. Two values separated by `-` form a window.
pub fn parse_retention_time(value: &str) -> Result<RetentionTime, FormatError> {
    let invalid = || FormatError::InvalidRetentionTime {
        raw: value.to_string(),
        title: None,
    };
    let mut segments: Vec<&str> = value.trim().split('-').collect();
    while segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    match segments.as_slice() {
        [point] => {
            let point = point.trim();
            let point = point
                .strip_prefix("PT")
                .and_then(|s| s.strip_suffix('S'))
                .unwrap_or(point);
            point
                .parse::<f64>()
                .map(RetentionTime::Point)
                .map_err(|_| invalid())
        }
        [start, end] if !start.is_empty() => {
            let start = start.trim().parse::<f64>().map_err(|_| invalid())?;
            let end = end.trim().parse::<f64>().map_err(|_| invalid())?;
            Ok(RetentionTime::Window { start, end })
        }
        _ => Err(invalid()),
    }
}

/// Parse a precursor mass header value, `<mz> [<intensity> [<charge>]]`. Anything
/// after the intensity is ignored.
pub fn parse_precursor_mass(value: &str) -> Result<(f64, Option<f64>), FormatError> {
    let invalid = || FormatError::InvalidPrecursorMass {
        raw: value.to_string(),
        title: None,
    };
    let mut parts = value.split_ascii_whitespace();
    let mz = parts
        .next()
        .ok_or_else(invalid)?
        .parse::<f64>()
        .map_err(|_| invalid())?;
    let intensity = match parts.next() {
        Some(token) => Some(token.parse::<f64>().map_err(|_| invalid())?),
        None => None,
    };
    Ok((mz, intensity))
}

static COMMENT_PARENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)Parent=(\S+)").unwrap());
static COMMENT_SCAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)Scan=(\S+)").unwrap());

/// The sub-fields of an MSP `Comment:` line that describe the precursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentFields {
    pub parent_mz: Option<f64>,
    pub scan_number: Option<String>,
}

/// Extract the `Parent=` and `Scan=` sub-fields of a comment value
pub fn parse_comment(value: &str) -> Result<CommentFields, FormatError> {
    let parent_mz = match COMMENT_PARENT.captures(value) {
        Some(caps) => {
            let raw = &caps[1];
            Some(
                raw.parse::<f64>()
                    .map_err(|_| FormatError::InvalidPrecursorMass {
                        raw: raw.to_string(),
                        title: None,
                    })?,
            )
        }
        None => None,
    };
    let scan_number = COMMENT_SCAN
        .captures(value)
        .map(|caps| caps[1].trim_matches('"').to_string());
    Ok(CommentFields {
        parent_mz,
        scan_number,
    })
}

/// Read the charge from the `/<z>` suffix of an MSP spectrum name, as in `PEPTIDEK/2`
pub fn charge_from_name(name: &str) -> Option<Charge> {
    let (_, suffix) = name.rsplit_once('/')?;
    let end = suffix
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(suffix.len());
    suffix[..end].parse::<u32>().ok().map(Charge::positive)
}

/// Decode a percent-encoded title where `+` stands for a space.
///
/// Fails on a `%` that is not followed by two hexadecimal digits. Byte sequences
/// that are not valid UTF-8 are replaced.
pub fn decode_title(raw: &str) -> Result<String, FormatError> {
    if !raw.contains(['%', '+']) {
        return Ok(raw.to_string());
    }
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' => {
                let (hi, lo) = match (bytes.get(i + 1), bytes.get(i + 2)) {
                    (Some(hi), Some(lo)) => (*hi, *lo),
                    _ => {
                        return Err(FormatError::InvalidTitleEncoding {
                            raw: raw.to_string(),
                        })
                    }
                };
                match (hex_value(hi), hex_value(lo)) {
                    (Some(hi), Some(lo)) => decoded.push(hi << 4 | lo),
                    _ => {
                        return Err(FormatError::InvalidTitleEncoding {
                            raw: raw.to_string(),
                        })
                    }
                }
                i += 3;
            }
            b => {
                decoded.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parse a peak line of at least two whitespace separated numbers, `<mz> <intensity> ...`.
/// Returns [`None`] for anything else.
pub fn parse_peak_line(line: &str) -> Option<Peak> {
    let mut it = line.split_ascii_whitespace();
    let mz = it.next()?.parse::<f64>().ok()?;
    let intensity = it.next()?.parse::<f64>().ok()?;
    Some(Peak::new(mz, intensity))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_charges() {
        assert_eq!(
            parse_charges("2+ and 3+").unwrap(),
            vec![Charge::positive(2), Charge::positive(3)]
        );
        assert_eq!(
            parse_charges("2,3+").unwrap(),
            vec![Charge::positive(2), Charge::positive(3)]
        );
        assert_eq!(parse_charges("Mr").unwrap(), vec![Charge::positive(1)]);
        assert_eq!(parse_charges("mr").unwrap(), vec![Charge::positive(1)]);
        assert_eq!(parse_charges("").unwrap(), vec![Charge::positive(1)]);
        assert_eq!(
            parse_charges("2- and 1-").unwrap(),
            vec![Charge::negative(2), Charge::negative(1)]
        );
        assert_eq!(parse_charges("-3").unwrap(), vec![Charge::negative(3)]);
    }

    #[test]
    fn test_parse_charges_invalid() {
        assert_eq!(
            parse_charges("2+ and x+").unwrap_err(),
            FormatError::InvalidCharge { token: "x+".into() }
        );
        assert!(parse_charges("-2+").is_err());
    }

    #[test]
    fn test_parse_retention_time() {
        assert_eq!(
            parse_retention_time("121.25").unwrap(),
            RetentionTime::Point(121.25)
        );
        assert_eq!(
            parse_retention_time("10-20").unwrap(),
            RetentionTime::Window {
                start: 10.0,
                end: 20.0
            }
        );
        assert_eq!(
            parse_retention_time("PT121.250000S").unwrap(),
            RetentionTime::Point(121.25)
        );
        assert!(matches!(
            parse_retention_time("abc"),
            Err(FormatError::InvalidRetentionTime { raw, .. }) if raw == "abc"
        ));
        assert!(parse_retention_time("-5").is_err());
        assert!(parse_retention_time("1-2-3").is_err());
    }

    #[test]
    fn test_parse_precursor_mass() {
        assert_eq!(parse_precursor_mass("512.25").unwrap(), (512.25, None));
        assert_eq!(
            parse_precursor_mass("512.25 1030.5 2+").unwrap(),
            (512.25, Some(1030.5))
        );
        assert!(parse_precursor_mass("").is_err());
        assert!(parse_precursor_mass("512.25 much").is_err());
    }

    #[test]
    fn test_parse_comment() {
        let fields =
            parse_comment("Single Pep=Tryptic Parent=451.24 Mods=0 Scan=1774").unwrap();
        assert_eq!(fields.parent_mz, Some(451.24));
        assert_eq!(fields.scan_number.as_deref(), Some("1774"));

        let fields = parse_comment("Consensus spectrum").unwrap();
        assert_eq!(fields, CommentFields::default());
        assert!(parse_comment("Parent=abc").is_err());
    }

    #[test]
    fn test_charge_from_name() {
        assert_eq!(charge_from_name("AAGIK/2"), Some(Charge::positive(2)));
        assert_eq!(charge_from_name("AAGIK/3_1(0,M,Oxidation)"), Some(Charge::positive(3)));
        assert_eq!(charge_from_name("AAGIK"), None);
    }

    #[test]
    fn test_decode_title() {
        assert_eq!(decode_title("plain title").unwrap(), "plain title");
        assert_eq!(decode_title("a%20b+c").unwrap(), "a b c");
        assert_eq!(decode_title("caf%C3%A9").unwrap(), "café");
        assert!(decode_title("100%").is_err());
        assert!(decode_title("%zz").is_err());
    }

    #[test]
    fn test_parse_peak_line() {
        assert_eq!(parse_peak_line("100.5 20"), Some(Peak::new(100.5, 20.0)));
        assert_eq!(
            parse_peak_line("100.5\t20\t2+"),
            Some(Peak::new(100.5, 20.0))
        );
        assert_eq!(parse_peak_line("100.5"), None);
        assert_eq!(parse_peak_line("peaks follow"), None);
    }
}
