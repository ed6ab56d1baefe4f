//! Error taxonomy and vendor status codes

use std::fmt;
use thiserror::Error;

/// Status codes understood by callers of the vendor API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReturnCode {
    Success = 0,
    Failure = 1,
    InvalidArgs = 2,
    OutOfMemory = 3,
    MissingD3dDll = 4,
    LegacyDriver = 5,
    NoAmdDriverInstalled = 6,
    ExtensionNotSupported = 7,
    AdlFailure = 8,
    DxFailure = 9,
}

/// A raw `HRESULT` returned by a downstream graphics library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgsError {
    #[error("Invalid arguments")]
    InvalidArguments,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Graphics backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Could not load downstream library {0}")]
    MissingDownstreamLibrary(String),
    #[error("Device creation failed, hr {0}")]
    DeviceCreationFailed(HResult),
    #[error("Extension not supported")]
    ExtensionNotSupported,
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

impl AgsError {
    /// Status code reported to the caller for this error
    pub fn code(&self) -> ReturnCode {
        match self {
            AgsError::InvalidArguments => ReturnCode::InvalidArgs,
            AgsError::OutOfMemory => ReturnCode::OutOfMemory,
            AgsError::BackendUnavailable(_) => ReturnCode::Failure,
            AgsError::MissingDownstreamLibrary(_) => ReturnCode::MissingD3dDll,
            AgsError::DeviceCreationFailed(_) => ReturnCode::DxFailure,
            AgsError::ExtensionNotSupported => ReturnCode::ExtensionNotSupported,
            AgsError::Layout(_) => ReturnCode::Failure,
        }
    }
}

impl From<AllocError> for AgsError {
    fn from(_: AllocError) -> Self {
        AgsError::OutOfMemory
    }
}

impl<T> From<Result<T, AgsError>> for ReturnCode {
    fn from(result: Result<T, AgsError>) -> Self {
        match result {
            Ok(_) => ReturnCode::Success,
            Err(e) => e.code(),
        }
    }
}

/// A block allocation could not be satisfied
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to allocate {requested} bytes")]
pub struct AllocError {
    pub requested: usize,
}

/// Misuse of the layout table through a record view
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("field {field} is {expected} bytes wide, value is {actual}")]
    WidthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("field {field} at offset {offset} does not fit a {record_len}-byte record")]
    OutOfBounds {
        field: &'static str,
        offset: usize,
        record_len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AgsError::InvalidArguments.code() as i32, 2);
        assert_eq!(AgsError::OutOfMemory.code() as i32, 3);
        assert_eq!(AgsError::MissingDownstreamLibrary("d3d11".into()).code() as i32, 4);
        assert_eq!(AgsError::DeviceCreationFailed(HResult(-1)).code(), ReturnCode::DxFailure);
        assert_eq!(ReturnCode::from(Ok::<(), AgsError>(())), ReturnCode::Success);
        assert_eq!(
            ReturnCode::from(Err::<(), _>(AgsError::BackendUnavailable("no icd".into()))),
            ReturnCode::Failure
        );
    }

    #[test]
    fn test_hresult_display() {
        assert_eq!(HResult(0x8007000Eu32 as i32).to_string(), "0x8007000e");
        assert!(HResult(0x8007000Eu32 as i32).is_failure());
        assert!(!HResult(0).is_failure());
    }
}
