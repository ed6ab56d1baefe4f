//! Agshim - Multi-revision AGS compatibility shim
//!
//! Callers built against any of the supported vendor header revisions get
//! device records in the binary layout they expect:
//! - [`Runtime`] is the process-scoped service object the host creates once
//! - [`Context`] owns one enumeration and releases it on drop
//! - [`entry`] holds the vendor API entry points in both init shapes
//! - [`passthrough`] forwards device creation to the real D3D runtimes

pub mod context;
pub mod entry;
pub mod library;
pub mod passthrough;
pub mod runtime;

pub use context::{AdapterSummary, Context};
pub use entry::DriverVersionResult;
pub use library::{Downstream, DownstreamLoader, DynamicLoader, LibraryError};
pub use passthrough::{Dx11DeviceCreationParams, Dx12DeviceCreationParams, Dx12ReturnedParams, Guid};
pub use runtime::Runtime;
