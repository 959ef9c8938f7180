//! Protocol version numbers exchanged with the XFS manager and providers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An XFS version number such as `3.30`.
///
/// On the wire a version is packed into a 16-bit word with the major number
/// in the low byte and the minor number in the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct XfsVersion {
    major: u8,
    minor: u8,
}

impl XfsVersion {
    /// Release 3.00.
    pub const V3_00: Self = Self::new(3, 0);
    /// Release 3.10.
    pub const V3_10: Self = Self::new(3, 10);
    /// Release 3.20.
    pub const V3_20: Self = Self::new(3, 20);
    /// Release 3.30.
    pub const V3_30: Self = Self::new(3, 30);

    /// Builds a version from its components.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Unpacks a version from its wire representation.
    #[must_use]
    pub const fn from_word(word: u16) -> Self {
        let [major, minor] = word.to_le_bytes();
        Self { major, minor }
    }

    /// Packs the version into its wire representation.
    #[must_use]
    pub const fn to_word(self) -> u16 {
        u16::from_le_bytes([self.major, self.minor])
    }

    /// Major version component.
    #[must_use]
    pub const fn major(self) -> u8 {
        self.major
    }

    /// Minor version component.
    #[must_use]
    pub const fn minor(self) -> u8 {
        self.minor
    }
}

impl fmt::Display for XfsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

impl FromStr for XfsVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (major, minor) = trimmed
            .split_once('.')
            .ok_or_else(|| VersionParseError::MissingSeparator(input.to_owned()))?;
        let parse = |part: &str| {
            part.parse::<u8>()
                .map_err(|_| VersionParseError::InvalidComponent(input.to_owned()))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl TryFrom<String> for XfsVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<XfsVersion> for String {
    fn from(value: XfsVersion) -> Self {
        value.to_string()
    }
}

/// An inclusive range of acceptable versions, written `3.00-3.30` in
/// configuration files, environment variables, and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    /// Lowest acceptable version.
    pub low: XfsVersion,
    /// Highest acceptable version.
    pub high: XfsVersion,
}

impl VersionRange {
    /// Releases 3.00 through 3.30.
    pub const SUPPORTED: Self = Self {
        low: XfsVersion::V3_00,
        high: XfsVersion::V3_30,
    };

    /// Builds a range, rejecting inverted bounds.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError::InvertedRange`] when `low` exceeds `high`.
    pub fn new(low: XfsVersion, high: XfsVersion) -> Result<Self, VersionParseError> {
        if low > high {
            return Err(VersionParseError::InvertedRange { low, high });
        }
        Ok(Self { low, high })
    }

    /// Returns `true` when `version` lies within the range.
    #[must_use]
    pub fn contains(&self, version: XfsVersion) -> bool {
        self.low <= version && version <= self.high
    }

    /// Packs the range into the 32-bit form passed to `WFSStartUp` and
    /// `WFSOpen`: high version in the low word, low version in the high word.
    #[must_use]
    pub const fn to_dword(self) -> u32 {
        ((self.low.to_word() as u32) << 16) | self.high.to_word() as u32
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::SUPPORTED
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    /// Parses `3.00-3.30`, or a single version meaning an exact match.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.split_once('-') {
            Some((low, high)) => Self::new(low.parse()?, high.parse()?),
            None => {
                let exact: XfsVersion = input.parse()?;
                Ok(Self {
                    low: exact,
                    high: exact,
                })
            }
        }
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing versions from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The text had no `.` between major and minor numbers.
    #[error("version '{0}' must be written as MAJOR.MINOR")]
    MissingSeparator(String),
    /// A component was not a number in `0..=255`.
    #[error("version '{0}' has a non-numeric component")]
    InvalidComponent(String),
    /// The lower bound exceeded the upper bound.
    #[error("version range {low}-{high} is inverted")]
    InvertedRange {
        /// Requested lower bound.
        low: XfsVersion,
        /// Requested upper bound.
        high: XfsVersion,
    },
}
