//! Version triples as reported by embedded version resources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionTriple {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl VersionTriple {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Build a triple from the two file-version words of a fixed file info block.
    ///
    /// The most significant word holds `major << 16 | minor`, the least
    /// significant word holds `patch << 16 | build`. The build number is dropped.
    pub fn from_file_version(ms: u32, ls: u32) -> Self {
        Self {
            major: (ms >> 16) as u16,
            minor: ms as u16,
            patch: (ls >> 16) as u16,
        }
    }

    /// Packed representation used by the vendor's version-number query
    pub fn packed(&self) -> i32 {
        make_version(self.major, self.minor, self.patch)
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error returned when a version string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version string: {0:?}")]
pub struct ParseVersionError(pub String);

impl FromStr for VersionTriple {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = clean_version_string(s);
        let parsed =
            semver::Version::parse(&clean).map_err(|_| ParseVersionError(s.to_string()))?;

        let narrow = |v: u64| u16::try_from(v).map_err(|_| ParseVersionError(s.to_string()));
        Ok(Self {
            major: narrow(parsed.major)?,
            minor: narrow(parsed.minor)?,
            patch: narrow(parsed.patch)?,
        })
    }
}

/// Strip a leading `v`/`V` and pad two-component versions with a zero patch
fn clean_version_string(version: &str) -> String {
    let v = version.trim();
    let v = v.strip_prefix(['v', 'V']).unwrap_or(v);

    if v.split('.').count() == 2 {
        format!("{}.0", v)
    } else {
        v.to_string()
    }
}

/// Pack a version the way the vendor header's `AGS_MAKE_VERSION` macro does
pub const fn make_version(major: u16, minor: u16, patch: u16) -> i32 {
    ((major as i32) << 22) | ((minor as i32) << 12) | patch as i32
}
