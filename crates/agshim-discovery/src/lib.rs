//! Agshim Discovery - Revision detection and adapter enumeration
//!
//! This crate provides the parts of the shim that talk to the outside world:
//! - Version detection from the shim module's embedded file version
//! - A graphics backend abstraction for physical adapter enumeration
//! - OS display enumeration, with an `xrandr` implementation
//! - The enumerator that fills revision-sized device records

pub mod backend;
pub mod detector;
pub mod display_source;
pub mod displays;
pub mod enumerator;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;
pub mod xrandr;

pub use backend::{
    AdapterProperties, BackendError, BackendInstance, FakeAdapter, FakeBackend, GraphicsBackend,
    MemoryHeap, MemoryProperties, NoAdapters, MEMORY_HEAP_DEVICE_LOCAL,
};
pub use detector::{
    Detection, DetectionSource, DetectorConfig, FixedFileInfoReader, FixedPathLocator, ModuleLocator,
    ProcMapsLocator, VersionDetector, VersionResourceReader, DEFAULT_MODULE_NAME,
};
pub use display_source::{
    DisplayDevice, DisplayError, DisplayMode, DisplaySnapshot, DisplaySource, MonitorInfo, NoDisplays,
};
pub use enumerator::{Enumeration, Enumerator};
#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuBackend;
pub use xrandr::XrandrDisplaySource;
