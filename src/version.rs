//! OSGi version and version-range arithmetic
//!
//! Implements the `major.minor.micro.qualifier` version ordering used by
//! bundle metadata, and version ranges in the `[low,high)` interval notation.
//!
//! # Algorithm
//!
//! 1. Versions compare numerically on major, minor, micro
//! 2. Ties break on the qualifier with plain string ordering; an absent
//!    qualifier orders before any qualifier ("1.0.0" < "1.0.0.alpha")
//! 3. Omitted trailing segments default to 0 for comparison ("1.0" == "1.0.0")
//!    but are remembered so the version prints back exactly as written
//! 4. A range compares Equal to any version (or floor-only range) that falls
//!    inside its bounds, honoring inclusive/exclusive edges; two ranges order
//!    structurally on (low, low edge, high, high edge)
//!
//! # Examples
//!
//! ```
//! use obr_repo_index::version::{Version, VersionRange};
//! use std::cmp::Ordering;
//!
//! let range = VersionRange::parse("[1.0,2.0)").unwrap();
//! assert!(range.includes(&Version::parse("1.5.0").unwrap()));
//! assert!(!range.includes(&Version::parse("2.0.0").unwrap()));
//!
//! let floor = VersionRange::parse("1.5").unwrap();
//! assert_eq!(floor.to_string(), "1.5");
//! assert_eq!(range.compare(&floor), Ordering::Equal);
//! ```
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{ObrError, Result};

/// A parsed OSGi version: up to three numeric segments plus a qualifier.
#[derive(Debug, Clone)]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: String,
    /// Numeric segments spelled out in the source text, for display.
    segments: u8,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
            segments: 3,
        }
    }

    /// Parse `N(.N(.N(.qualifier)?)?)?`, qualifier over `[A-Za-z0-9_-]`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ObrError::InvalidVersion("empty version string".into()));
        }
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() > 4 {
            return Err(ObrError::InvalidVersion(format!(
                "{text}: too many segments"
            )));
        }

        let major = Self::numeric_segment(parts[0], text)?;
        let minor = match parts.get(1) {
            Some(p) => Self::numeric_segment(p, text)?,
            None => 0,
        };
        let micro = match parts.get(2) {
            Some(p) => Self::numeric_segment(p, text)?,
            None => 0,
        };
        let qualifier = match parts.get(3) {
            Some(p) => {
                if p.is_empty()
                    || !p
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(ObrError::InvalidVersion(format!(
                        "{text}: invalid qualifier \"{p}\""
                    )));
                }
                p.to_string()
            }
            None => String::new(),
        };

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
            segments: parts.len().min(3) as u8,
        })
    }

    fn numeric_segment(part: &str, full: &str) -> Result<u32> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObrError::InvalidVersion(format!(
                "{full}: non-numeric segment \"{part}\""
            )));
        }
        part.parse::<u32>()
            .map_err(|_| ObrError::InvalidVersion(format!("{full}: segment out of range")))
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn micro(&self) -> u32 {
        self.micro
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }
}

impl FromStr for Version {
    type Err = ObrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if self.segments >= 2 {
            write!(f, ".{}", self.minor)?;
        }
        if self.segments >= 3 {
            write!(f, ".{}", self.micro)?;
        }
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

// "1.0" and "1.0.0" are the same version; the segment count is display-only.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.micro == other.micro
            && self.qualifier == other.qualifier
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.micro.hash(state);
        self.qualifier.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.micro.cmp(&other.micro) {
            Ordering::Equal => {}
            other => return other,
        }
        self.qualifier.cmp(&other.qualifier)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A version constraint: either a single floor version ("1.0" means 1.0 or
/// higher) or a bounded interval ("[1.0,2.0)").
///
/// Equality and hashing cover the bounds and both edge flags, so `[1.0,2.0)`
/// and `[1.0,2.0]` are distinct ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    low: Version,
    high: Option<Version>,
    include_low: bool,
    include_high: bool,
}

impl VersionRange {
    /// Parse either a bare version or `[low,high]`/`(low,high)`/mixed forms.
    ///
    /// A bounded range with `low >= high` is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let first = text.as_bytes().first().copied();
        if first != Some(b'[') && first != Some(b'(') {
            return Ok(Self {
                low: Version::parse(text)?,
                high: None,
                include_low: true,
                include_high: true,
            });
        }

        let include_low = first == Some(b'[');
        let include_high = match text.as_bytes().last() {
            Some(b']') => true,
            Some(b')') => false,
            _ => {
                return Err(ObrError::InvalidVersionRange(format!(
                    "{text}: missing closing bracket"
                )))
            }
        };
        let inner = &text[1..text.len() - 1];
        let (lo, hi) = inner.split_once(',').ok_or_else(|| {
            ObrError::InvalidVersionRange(format!("{text}: missing comma separator"))
        })?;
        if hi.contains(',') {
            return Err(ObrError::InvalidVersionRange(format!(
                "{text}: more than two bounds"
            )));
        }

        let low = Version::parse(lo)?;
        let high = Version::parse(hi)?;
        if low >= high {
            return Err(ObrError::InvalidVersionRange(format!(
                "{text}: floor {low} is not below ceiling {high}"
            )));
        }

        Ok(Self {
            low,
            high: Some(high),
            include_low,
            include_high,
        })
    }

    pub fn is_range(&self) -> bool {
        self.high.is_some()
    }

    pub fn low(&self) -> &Version {
        &self.low
    }

    pub fn high(&self) -> Option<&Version> {
        self.high.as_ref()
    }

    pub fn include_low(&self) -> bool {
        self.include_low
    }

    pub fn include_high(&self) -> bool {
        self.include_high
    }

    /// Does a concrete version satisfy this constraint? A floor-only range
    /// accepts the floor and anything above it.
    pub fn includes(&self, version: &Version) -> bool {
        match &self.high {
            None => *version >= self.low,
            Some(high) => {
                Self::position(version, &self.low, self.include_low, high, self.include_high)
                    == Ordering::Equal
            }
        }
    }

    /// Three-way comparison between ranges, the single entry point a resolver
    /// uses both for sorting and for satisfaction tests.
    ///
    /// When exactly one side is a bounded interval, the other side's floor is
    /// checked against its bounds: Equal means contained, Less/Greater give
    /// the position outside. Two bounded intervals order structurally; two
    /// floors order by version. Containment-as-Equal is not transitive, so
    /// this is deliberately not an `Ord` implementation.
    pub fn compare(&self, other: &VersionRange) -> Ordering {
        match (&self.high, &other.high) {
            (None, None) => self.low.cmp(&other.low),
            (None, Some(high)) => Self::position(
                &self.low,
                &other.low,
                other.include_low,
                high,
                other.include_high,
            ),
            (Some(high), None) => Self::position(
                &other.low,
                &self.low,
                self.include_low,
                high,
                self.include_high,
            )
            .reverse(),
            (Some(self_high), Some(other_high)) => {
                match self.low.cmp(&other.low) {
                    Ordering::Equal => {}
                    other => return other,
                }
                // An inclusive floor starts earlier than an exclusive one.
                match (self.include_low, other.include_low) {
                    (true, false) => return Ordering::Less,
                    (false, true) => return Ordering::Greater,
                    _ => {}
                }
                match self_high.cmp(other_high) {
                    Ordering::Equal => {}
                    other => return other,
                }
                // An exclusive ceiling ends earlier than an inclusive one.
                match (self.include_high, other.include_high) {
                    (false, true) => Ordering::Less,
                    (true, false) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
        }
    }

    /// Position of `version` relative to the `[low,high]` bounds.
    fn position(
        version: &Version,
        low: &Version,
        include_low: bool,
        high: &Version,
        include_high: bool,
    ) -> Ordering {
        match version.cmp(low) {
            Ordering::Less => return Ordering::Less,
            Ordering::Equal if !include_low => return Ordering::Less,
            _ => {}
        }
        match version.cmp(high) {
            Ordering::Greater => Ordering::Greater,
            Ordering::Equal if !include_high => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

impl Default for VersionRange {
    /// The degenerate "0" floor used when bundle metadata omits a version.
    fn default() -> Self {
        Self {
            low: Version {
                major: 0,
                minor: 0,
                micro: 0,
                qualifier: String::new(),
                segments: 1,
            },
            high: None,
            include_low: true,
            include_high: true,
        }
    }
}

impl FromStr for VersionRange {
    type Err = ObrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.high {
            None => write!(f, "{}", self.low),
            Some(high) => write!(
                f,
                "{}{},{}{}",
                if self.include_low { '[' } else { '(' },
                self.low,
                high,
                if self.include_high { ']' } else { ')' },
            ),
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment_counts() {
        let v = Version::parse("2").unwrap();
        assert_eq!((v.major(), v.minor(), v.micro()), (2, 0, 0));

        let v = Version::parse("1.5").unwrap();
        assert_eq!((v.major(), v.minor(), v.micro()), (1, 5, 0));

        let v = Version::parse("1.5.17.beta-2_x").unwrap();
        assert_eq!((v.major(), v.minor(), v.micro()), (1, 5, 17));
        assert_eq!(v.qualifier(), "beta-2_x");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("a.b").is_err());
        assert!(Version::parse("1.-2").is_err());
        assert!(Version::parse("1.2.3.4.5").is_err());
        assert!(Version::parse("1.2.3.").is_err());
        assert!(Version::parse("1.2.3.qu!al").is_err());
        assert!(Version::parse("1..2").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["0", "2", "1.0", "1.5.17", "1.2.3.rc1"] {
            assert_eq!(Version::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_version_ordering() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0") < v("1.0.1"));
        assert!(v("1.10") > v("1.2"));
        // A qualified version orders after the bare release
        assert!(v("1.0.0") < v("1.0.0.alpha"));
        assert!(v("1.0.0.alpha") < v("1.0.0.beta"));
        // Omitted segments are zeros
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0"));
    }

    #[test]
    fn test_floor_round_trip() {
        for text in ["1", "1.0", "1.2.3", "2.0.0.SNAPSHOT"] {
            let range = VersionRange::parse(text).unwrap();
            assert!(!range.is_range());
            assert_eq!(range.to_string(), text);
        }
    }

    #[test]
    fn test_range_parse() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.is_range());
        assert!(range.include_low());
        assert!(!range.include_high());
        assert_eq!(range.to_string(), "[1.0,2.0)");

        // Whitespace around bounds is tolerated, display is normalized
        let range = VersionRange::parse("( 1.0 , 2.0 ]").unwrap();
        assert!(!range.include_low());
        assert!(range.include_high());
        assert_eq!(range.to_string(), "(1.0,2.0]");
    }

    #[test]
    fn test_range_rejects_malformed() {
        assert!(VersionRange::parse("[1.0").is_err());
        assert!(VersionRange::parse("[1.0]").is_err());
        assert!(VersionRange::parse("[1.0,2.0,3.0]").is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("[1.0,1.0]").is_err());
        assert!(VersionRange::parse("(1.0.0,1.0)").is_err());
    }

    #[test]
    fn test_containment() {
        let range = VersionRange::parse("[1.0,2.0]").unwrap();
        let floor = |s: &str| VersionRange::parse(s).unwrap();

        assert_eq!(range.compare(&floor("1.0")), Ordering::Equal);
        assert_eq!(range.compare(&floor("1.5")), Ordering::Equal);
        assert_eq!(range.compare(&floor("2.0")), Ordering::Equal);
        // Floor below the range is Less, and the range sits above it
        assert_eq!(floor("0.9").compare(&range), Ordering::Less);
        assert_eq!(range.compare(&floor("0.9")), Ordering::Greater);
        assert_eq!(floor("2.1").compare(&range), Ordering::Greater);

        let exclusive = VersionRange::parse("(1.0,2.0)").unwrap();
        assert_eq!(exclusive.compare(&floor("1.0")), Ordering::Greater);
        assert_eq!(exclusive.compare(&floor("2.0")), Ordering::Less);
        assert_eq!(exclusive.compare(&floor("1.0.1")), Ordering::Equal);
    }

    #[test]
    fn test_floor_comparison() {
        let floor = |s: &str| VersionRange::parse(s).unwrap();
        assert_eq!(floor("1.5").compare(&floor("1.0")), Ordering::Greater);
        assert_eq!(floor("1.0").compare(&floor("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_includes() {
        let v = |s: &str| Version::parse(s).unwrap();

        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.includes(&v("1.0")));
        assert!(range.includes(&v("1.9.9")));
        assert!(!range.includes(&v("2.0")));
        assert!(!range.includes(&v("0.9")));

        // A floor accepts anything at or above it
        let floor = VersionRange::parse("1.5").unwrap();
        assert!(floor.includes(&v("1.5")));
        assert!(floor.includes(&v("3.0")));
        assert!(!floor.includes(&v("1.4")));
    }

    #[test]
    fn test_bracket_style_distinguishes_ranges() {
        let half_open = VersionRange::parse("[1.0,2.0)").unwrap();
        let closed = VersionRange::parse("[1.0,2.0]").unwrap();
        assert_ne!(half_open, closed);
        assert_eq!(half_open, VersionRange::parse("[1.0,2.0)").unwrap());
    }

    #[test]
    fn test_range_structural_ordering() {
        let r = |s: &str| VersionRange::parse(s).unwrap();
        assert_eq!(r("[1.0,2.0)").compare(&r("[1.0,2.0)")), Ordering::Equal);
        assert_eq!(r("[1.0,2.0)").compare(&r("[1.5,2.0)")), Ordering::Less);
        assert_eq!(r("[1.0,2.0)").compare(&r("(1.0,2.0)")), Ordering::Less);
        assert_eq!(r("[1.0,2.0)").compare(&r("[1.0,2.0]")), Ordering::Less);
        assert_eq!(r("[1.0,3.0)").compare(&r("[1.0,2.0)")), Ordering::Greater);
    }

    #[test]
    fn test_default_is_zero_floor() {
        let range = VersionRange::default();
        assert!(!range.is_range());
        assert_eq!(range.to_string(), "0");
        assert!(range.includes(&Version::parse("0.0.1").unwrap()));
    }
}
