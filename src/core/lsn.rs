use super::{Result, RouterError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SEGMENT_DELIMITER: char = '/';
const MAX_SEGMENT_DIGITS: usize = 8;

/// A position in the replicated write-ahead log.
///
/// Printed by the datastore as two hexadecimal numbers of up to 8 digits each,
/// separated by a slash, for example `16/B374D848`. Positions are ordered by
/// the high segment first and the low segment second.
///
/// The original text is kept for logging and round-trips through `Display`.
/// Equality and ordering only look at the numeric segments, so `0/0A` and
/// `0/A` are the same position.
#[derive(Debug, Clone)]
pub struct LogPosition {
    high: u32,
    low: u32,
    text: String,
}

impl LogPosition {
    /// Build a position from its numeric segments.
    ///
    /// The text form uses upper-case hex without padding, as the datastore prints it.
    pub fn new(high: u32, low: u32) -> Self {
        Self {
            high,
            low,
            text: format!("{:X}{}{:X}", high, SEGMENT_DELIMITER, low),
        }
    }

    /// Parse the textual `HIGH/LOW` form.
    ///
    /// # Examples
    ///
    /// ```
    /// use lsn_router::LogPosition;
    ///
    /// let pos = LogPosition::parse("16/B374D848").unwrap();
    /// assert_eq!(pos.high(), 0x16);
    /// assert_eq!(pos.low(), 0xB374_D848);
    /// assert_eq!(pos.to_string(), "16/B374D848");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let segments: Vec<&str> = text.split(SEGMENT_DELIMITER).collect();
        if segments.len() != 2 {
            return Err(RouterError::FormatError(format!(
                "log position '{}' must have exactly two segments separated by '{}'",
                text, SEGMENT_DELIMITER
            )));
        }

        let high = parse_segment(text, segments[0])?;
        let low = parse_segment(text, segments[1])?;

        Ok(Self {
            high,
            low,
            text: text.to_string(),
        })
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    /// The text this position was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The position as a single 64-bit byte offset (`high << 32 | low`).
    pub fn as_u64(&self) -> u64 {
        (u64::from(self.high) << 32) | u64::from(self.low)
    }

    /// Number of bytes `other` trails behind `self`, zero if it does not.
    pub fn byte_lag(&self, other: &LogPosition) -> u64 {
        self.as_u64().saturating_sub(other.as_u64())
    }

    /// Lexicographic comparison of the `(high, low)` segments.
    pub fn compare(&self, other: &LogPosition) -> Ordering {
        (self.high, self.low).cmp(&(other.high, other.low))
    }
}

fn parse_segment(text: &str, segment: &str) -> Result<u32> {
    if segment.is_empty()
        || segment.len() > MAX_SEGMENT_DIGITS
        || !segment.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(RouterError::FormatError(format!(
            "log position '{}' has invalid hex segment '{}'",
            text, segment
        )));
    }

    u32::from_str_radix(segment, 16).map_err(|e| {
        RouterError::FormatError(format!(
            "log position '{}' has invalid hex segment '{}': {}",
            text, segment, e
        ))
    })
}

impl PartialEq for LogPosition {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for LogPosition {}

impl PartialOrd for LogPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for LogPosition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.high.hash(state);
        self.low.hash(state);
    }
}

impl FromStr for LogPosition {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for LogPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for LogPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let pos = LogPosition::parse("16/B374D848").unwrap();
        assert_eq!(pos.high(), 0x16);
        assert_eq!(pos.low(), 0xB374D848);
        assert_eq!(pos.as_str(), "16/B374D848");
    }

    #[test]
    fn test_display_round_trips_original_text() {
        for text in ["0/0", "0/16B3748", "FFFFFFFF/FFFFFFFF", "a/00000b", "16/B374D848"] {
            let pos: LogPosition = text.parse().unwrap();
            assert_eq!(pos.to_string(), text);
        }
    }

    #[test]
    fn test_wrong_segment_count() {
        for text in ["", "16", "16B374D848", "1/2/3", "/"] {
            let err = LogPosition::parse(text).unwrap_err();
            assert!(err.is_format_error(), "{text:?} should fail with FormatError");
        }
    }

    #[test]
    fn test_invalid_hex_segment() {
        for text in ["G/0", "0/xyz", "0/", "/0", "-1/0", "+1/0", "0/ 1", "123456789/0"] {
            let err = LogPosition::parse(text).unwrap_err();
            assert!(err.is_format_error(), "{text:?} should fail with FormatError");
        }
    }

    #[test]
    fn test_high_segment_dominates() {
        let a = LogPosition::new(1, 0);
        let b = LogPosition::new(0, 999_999);
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert!(b < a);
    }

    #[test]
    fn test_low_segment_breaks_ties() {
        let a = LogPosition::new(0, 99);
        let b = LogPosition::new(0, 100);
        assert!(a < b);
        assert_eq!(b.compare(&b.clone()), Ordering::Equal);
    }

    #[test]
    fn test_equality_ignores_text_padding() {
        let a = LogPosition::parse("0/0A").unwrap();
        let b = LogPosition::parse("0/a").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_ordering_matches_u64_value() {
        let positions = [
            LogPosition::new(0, 0),
            LogPosition::new(0, u32::MAX),
            LogPosition::new(1, 0),
            LogPosition::new(1, 1),
            LogPosition::new(u32::MAX, 0),
        ];
        for a in &positions {
            for b in &positions {
                assert_eq!(a.cmp(b), a.as_u64().cmp(&b.as_u64()));
            }
        }
    }

    #[test]
    fn test_byte_lag() {
        let primary = LogPosition::new(1, 10);
        let replica = LogPosition::new(0, u32::MAX);
        assert_eq!(primary.byte_lag(&replica), 11);
        assert_eq!(replica.byte_lag(&primary), 0);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let pos = LogPosition::parse("16/B374D848").unwrap();
        let json = serde_json::to_string(&pos).unwrap();
        assert_eq!(json, "\"16/B374D848\"");

        let back: LogPosition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
        assert!(serde_json::from_str::<LogPosition>("\"nope\"").is_err());
    }
}
