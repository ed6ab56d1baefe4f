//! Agshim Core - Revision table, binary layouts, and record accessors
//!
//! This crate provides the foundational pieces of the AGS compatibility shim:
//! - The table of known binary revisions and their record sizes
//! - `#[repr(C)]` shapes of every published device/display/returned-params layout
//! - The per-field layout table, including the bitfield escape hatch
//! - Byte views over opaque device records with checked typed access
//! - The display record codec for the native and truncated legacy layouts
//! - Block allocation with an allocation-tracking harness
//! - The error taxonomy and vendor return codes

use std::ffi::CStr;

pub mod abi;
pub mod alloc;
pub mod display;
pub mod error;
pub mod layout;
pub mod record;
pub mod revision;
pub mod version;

pub use alloc::{Allocator, Block, SystemAllocator, TrackingAllocator};
pub use display::{DisplayAbi, DisplayRect, DisplayRecord};
pub use error::{AgsError, AllocError, HResult, LayoutError, ReturnCode};
pub use layout::{DeviceField, FieldKind, Placement};
pub use record::{DeviceRecord, DeviceRecordMut, FieldValue};
pub use revision::{Revision, RevisionInfo, UnknownRevision};
pub use version::{make_version, VersionTriple};

/// PCI vendor id of the vendor whose extension API this shim re-implements.
pub const TARGET_VENDOR_ID: u32 = 0x1002;

/// Driver version string reported through both public info shapes.
pub const DRIVER_VERSION: &CStr = c"21.30.25.05-211005a-372402E-RadeonSoftware";

/// Software package version reported through both public info shapes.
pub const SOFTWARE_VERSION: &CStr = c"21.10.2";
