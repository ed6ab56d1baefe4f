//! Known binary revisions of the vendor extension API
//!
//! Releases are not binary compatible with each other, not even across minor
//! versions. Every revision fixes the size of the device record array element
//! and of the DX11 returned-params block. Variants are declared in release
//! order, so `<`/`>=` comparisons between revisions are meaningful.

use serde::{Serialize, Serializer};
use std::fmt;
use std::mem::size_of;
use std::str::FromStr;
use thiserror::Error;

use crate::abi::{
    DeviceInfo511, DeviceInfo520, DeviceInfo540, DeviceInfo541, DeviceInfo542, DeviceInfo600,
    Dx11ReturnedParams511, Dx11ReturnedParams520, Dx11ReturnedParams600,
};
use crate::display::DisplayAbi;
use crate::version::VersionTriple;

/// One of the mutually incompatible binary layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Revision {
    V5_1_1,
    V5_2_0,
    V5_2_1,
    V5_3_0,
    V5_4_0,
    V5_4_1,
    V5_4_2,
    V6_0_0,
    V6_0_1,
}

/// Static description of a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionInfo {
    pub version: VersionTriple,
    /// Size of one device record
    pub record_size: usize,
    /// Size of the DX11 returned-params block
    pub returned_params_size: usize,
}

const fn info(major: u16, minor: u16, patch: u16, record_size: usize, returned_params_size: usize) -> RevisionInfo {
    RevisionInfo {
        version: VersionTriple::new(major, minor, patch),
        record_size,
        returned_params_size,
    }
}

static REVISIONS: [RevisionInfo; Revision::COUNT] = [
    info(5, 1, 1, size_of::<DeviceInfo511>(), size_of::<Dx11ReturnedParams511>()),
    info(5, 2, 0, size_of::<DeviceInfo520>(), size_of::<Dx11ReturnedParams520>()),
    info(5, 2, 1, size_of::<DeviceInfo520>(), size_of::<Dx11ReturnedParams520>()),
    info(5, 3, 0, size_of::<DeviceInfo520>(), size_of::<Dx11ReturnedParams520>()),
    info(5, 4, 0, size_of::<DeviceInfo540>(), size_of::<Dx11ReturnedParams520>()),
    info(5, 4, 1, size_of::<DeviceInfo541>(), size_of::<Dx11ReturnedParams520>()),
    info(5, 4, 2, size_of::<DeviceInfo542>(), size_of::<Dx11ReturnedParams520>()),
    info(6, 0, 0, size_of::<DeviceInfo600>(), size_of::<Dx11ReturnedParams600>()),
    info(6, 0, 1, size_of::<DeviceInfo600>(), size_of::<Dx11ReturnedParams600>()),
];

impl Revision {
    pub const COUNT: usize = 9;

    pub const ALL: [Revision; Revision::COUNT] = [
        Revision::V5_1_1,
        Revision::V5_2_0,
        Revision::V5_2_1,
        Revision::V5_3_0,
        Revision::V5_4_0,
        Revision::V5_4_1,
        Revision::V5_4_2,
        Revision::V6_0_0,
        Revision::V6_0_1,
    ];

    /// Revision assumed whenever detection cannot decide.
    ///
    /// A 5.4.1 update shipped a module with no file version info, so that is
    /// the most likely candidate when the version resource is missing.
    pub const FALLBACK: Revision = Revision::V5_4_1;

    /// Position of this revision in release order
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn info(self) -> &'static RevisionInfo {
        &REVISIONS[self.index()]
    }

    pub fn version(self) -> VersionTriple {
        self.info().version
    }

    pub fn record_size(self) -> usize {
        self.info().record_size
    }

    pub fn returned_params_size(self) -> usize {
        self.info().returned_params_size
    }

    /// Display layout that callers built against this revision expect
    pub fn display_abi(self) -> DisplayAbi {
        if self >= Revision::V6_0_0 {
            DisplayAbi::Native
        } else {
            DisplayAbi::Legacy
        }
    }

    /// Exact match of a version triple against the revision table
    pub fn from_version(version: VersionTriple) -> Option<Revision> {
        Revision::ALL
            .iter()
            .copied()
            .find(|rev| rev.version() == version)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.version(), f)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown revision: {0}")]
pub struct UnknownRevision(pub String);

impl FromStr for Revision {
    type Err = UnknownRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<VersionTriple>()
            .ok()
            .and_then(Revision::from_version)
            .ok_or_else(|| UnknownRevision(s.to_string()))
    }
}
