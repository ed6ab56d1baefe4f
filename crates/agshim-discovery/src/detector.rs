//! Binary revision detection
//!
//! Callers never say which release of the vendor headers they were built
//! against. The only evidence is the file version embedded in the shim module
//! they load, so detection locates that module on disk, copies it to a
//! temporary file, reads the fixed file info from the copy, and looks the
//! version up in the revision table.
//!
//! Detection never fails. Any problem along the way (module not found, copy
//! failed, no version resource, unknown version) selects
//! [`Revision::FALLBACK`]. A wrong guess gives the caller a wrong layout, so
//! every fallback is logged with its cause.

use agshim_core::{Revision, VersionTriple};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default file name of the shim module
pub const DEFAULT_MODULE_NAME: &str = "amd_ags_x64.dll";

/// Signature opening a `VS_FIXEDFILEINFO` block
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXED_FILE_INFO_STRUC_VERSION: u32 = 0x0001_0000;
const FIXED_FILE_INFO_LEN: usize = 52;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Module {0} is not loaded")]
    ModuleNotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("No version resource in module")]
    NoVersionResource,
    #[error("Version {0} does not match any known revision")]
    UnknownVersion(VersionTriple),
}

/// Finds the on-disk path of the shim module
pub trait ModuleLocator {
    fn locate(&self) -> Result<PathBuf, DetectError>;
}

/// Reads the file version triple of a module on disk
pub trait VersionResourceReader {
    fn read_version(&self, path: &Path) -> Result<VersionTriple, DetectError>;
}

/// Locates a module by name among the current process's file mappings
#[derive(Debug, Clone)]
pub struct ProcMapsLocator {
    pub module_name: String,
    pub maps_path: PathBuf,
}

impl ProcMapsLocator {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            maps_path: PathBuf::from("/proc/self/maps"),
        }
    }
}

impl ModuleLocator for ProcMapsLocator {
    fn locate(&self) -> Result<PathBuf, DetectError> {
        let maps = fs::read_to_string(&self.maps_path)?;
        find_mapped_module(&maps, &self.module_name)
            .ok_or_else(|| DetectError::ModuleNotFound(self.module_name.clone()))
    }
}

/// Find `module_name` in `/proc/<pid>/maps` content, matching case-insensitively
fn find_mapped_module(maps: &str, module_name: &str) -> Option<PathBuf> {
    // Format: "7f1c2a000000-7f1c2a021000 r--p 00000000 08:01 1234  /path/to/module.dll"
    maps.lines().find_map(|line| {
        let path = mapped_path(line)?;
        let file_name = Path::new(path).file_name()?.to_str()?;
        file_name
            .eq_ignore_ascii_case(module_name)
            .then(|| PathBuf::from(path))
    })
}

/// Pathname column of a maps line; it runs to the end of the line and may contain spaces
fn mapped_path(line: &str) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..5 {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    let path = rest.trim_end();
    let path = path.strip_suffix(" (deleted)").unwrap_or(path);
    (!path.is_empty()).then_some(path)
}

/// Always reports the same path
#[derive(Debug, Clone)]
pub struct FixedPathLocator(pub PathBuf);

impl ModuleLocator for FixedPathLocator {
    fn locate(&self) -> Result<PathBuf, DetectError> {
        if self.0.is_file() {
            Ok(self.0.clone())
        } else {
            Err(DetectError::ModuleNotFound(self.0.display().to_string()))
        }
    }
}

/// Reads the fixed file info block of a PE version resource
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedFileInfoReader;

impl VersionResourceReader for FixedFileInfoReader {
    fn read_version(&self, path: &Path) -> Result<VersionTriple, DetectError> {
        let bytes = fs::read(path)?;
        find_fixed_file_info(&bytes).ok_or(DetectError::NoVersionResource)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let word = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Scan for a complete fixed file info block and return its file version
pub fn find_fixed_file_info(bytes: &[u8]) -> Option<VersionTriple> {
    // Resource data is DWORD aligned, and so is the block inside it.
    (0..bytes.len().saturating_sub(FIXED_FILE_INFO_LEN - 1))
        .step_by(4)
        .find_map(|at| {
            if read_u32(bytes, at)? != FIXED_FILE_INFO_SIGNATURE
                || read_u32(bytes, at + 4)? != FIXED_FILE_INFO_STRUC_VERSION
            {
                return None;
            }
            let ms = read_u32(bytes, at + 8)?;
            let ls = read_u32(bytes, at + 12)?;
            Some(VersionTriple::from_file_version(ms, ls))
        })
}

/// Detector settings
#[derive(Debug, Clone, Serialize)]
pub struct DetectorConfig {
    /// File name of the shim module to look for among loaded modules
    pub module_name: String,
    /// Explicit module path, bypassing the loaded-module lookup
    pub module_path: Option<PathBuf>,
    /// Skip detection entirely and use this revision
    pub force_revision: Option<Revision>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            module_name: DEFAULT_MODULE_NAME.to_string(),
            module_path: None,
            force_revision: None,
        }
    }
}

/// How a detection result was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Module version matched a known revision
    Matched,
    /// Revision came from configuration
    Forced,
    /// Detection failed somewhere and the fallback was used
    Fallback,
}

/// Outcome of one detection run
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub revision: Revision,
    pub source: DetectionSource,
    pub module_path: Option<PathBuf>,
    /// File version read from the module, even when it matched nothing
    pub file_version: Option<VersionTriple>,
    /// SHA-256 of the module copy
    pub sha256: Option<String>,
    /// Why the fallback was used
    pub reason: Option<String>,
}

impl Detection {
    fn fallback() -> Self {
        Self {
            revision: Revision::FALLBACK,
            source: DetectionSource::Fallback,
            module_path: None,
            file_version: None,
            sha256: None,
            reason: None,
        }
    }
}

pub struct VersionDetector {
    locator: Box<dyn ModuleLocator>,
    reader: Box<dyn VersionResourceReader>,
    force_revision: Option<Revision>,
}

impl VersionDetector {
    pub fn new(locator: Box<dyn ModuleLocator>, reader: Box<dyn VersionResourceReader>) -> Self {
        Self {
            locator,
            reader,
            force_revision: None,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        let locator: Box<dyn ModuleLocator> = match &config.module_path {
            Some(path) => Box::new(FixedPathLocator(path.clone())),
            None => Box::new(ProcMapsLocator::new(config.module_name.clone())),
        };
        let mut detector = Self::new(locator, Box::new(FixedFileInfoReader));
        detector.force_revision = config.force_revision;
        detector
    }

    pub fn with_forced_revision(mut self, revision: Option<Revision>) -> Self {
        self.force_revision = revision;
        self
    }

    /// Determine the revision the caller expects. Never fails.
    pub fn detect(&self) -> Detection {
        if let Some(revision) = self.force_revision {
            info!(revision = %revision, "Using configured interface revision");
            return Detection {
                source: DetectionSource::Forced,
                revision,
                ..Detection::fallback()
            };
        }

        let mut detection = Detection::fallback();
        let outcome = self
            .probe(&mut detection)
            .and_then(|version| Revision::from_version(version).ok_or(DetectError::UnknownVersion(version)));

        match outcome {
            Ok(revision) => {
                detection.revision = revision;
                detection.source = DetectionSource::Matched;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = %Revision::FALLBACK,
                    "Unable to determine interface revision, using fallback"
                );
                detection.reason = Some(e.to_string());
            }
        }

        info!(
            revision = %detection.revision,
            source = ?detection.source,
            "Using interface revision {}",
            detection.revision
        );
        detection
    }

    /// Copy the module aside, fingerprint it and read its version from the copy.
    ///
    /// The copy is deleted when this returns, on every path.
    fn probe(&self, detection: &mut Detection) -> Result<VersionTriple, DetectError> {
        let path = self.locator.locate()?;
        debug!(path = %path.display(), "Located shim module");
        detection.module_path = Some(path.clone());

        let mut copy = tempfile::Builder::new()
            .prefix("agshim-")
            .suffix(".dll")
            .tempfile()?;
        let mut source = File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            copy.write_all(&buf[..n])?;
        }
        copy.flush()?;

        let sha256 = hex::encode(hasher.finalize());
        debug!(sha256 = %sha256, copy = %copy.path().display(), "Copied shim module");
        detection.sha256 = Some(sha256);

        let version = self.reader.read_version(copy.path())?;
        debug!(version = %version, "Found module file version");
        detection.file_version = Some(version);
        Ok(version)
    }
}
