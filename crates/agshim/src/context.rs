//! Context lifecycle
//!
//! A [`Context`] is the aggregate handed back to the caller by the init entry
//! points: the detected revision plus everything one enumeration allocated.
//! Dropping it releases the display arrays, the device array and the property
//! arrays, in that order.

use agshim_core::{AgsError, DeviceField, DeviceRecord, DisplayRecord, Revision};
use agshim_discovery::{Detection, Enumeration, Enumerator};
use serde::Serialize;
use std::ffi::c_void;
use tracing::{debug, info};

use crate::runtime::Runtime;

pub struct Context {
    detection: Detection,
    enumeration: Enumeration,
}

impl Context {
    /// Detect the caller's revision and enumerate adapters for it.
    ///
    /// Nothing is left allocated when this fails.
    pub fn create(runtime: &Runtime) -> Result<Box<Context>, AgsError> {
        Self::with_detection(runtime, runtime.detect())
    }

    /// Enumerate for an already detected revision
    pub fn with_detection(runtime: &Runtime, detection: Detection) -> Result<Box<Context>, AgsError> {
        let enumeration = Enumerator::new(runtime.backend(), runtime.displays(), runtime.allocator())
            .enumerate(detection.revision)?;
        let context = Box::new(Context {
            detection,
            enumeration,
        });
        info!(
            revision = %context.revision(),
            devices = context.device_count(),
            "Context created"
        );
        Ok(context)
    }

    pub fn revision(&self) -> Revision {
        self.detection.revision
    }

    /// Packed version of the revision this context was built for
    pub fn version_number(&self) -> i32 {
        self.detection.revision.version().packed()
    }

    pub fn detection(&self) -> &Detection {
        &self.detection
    }

    pub fn device_count(&self) -> usize {
        self.enumeration.device_count()
    }

    /// Device array as published through the public info shapes
    pub fn devices_ptr(&self) -> *mut c_void {
        self.enumeration.devices_addr() as *mut c_void
    }

    pub fn enumeration(&self) -> &Enumeration {
        &self.enumeration
    }

    pub fn adapters(&self) -> Vec<AdapterSummary> {
        (0..self.device_count())
            .filter_map(|i| {
                let record = self.enumeration.device(i)?;
                let name = self
                    .enumeration
                    .adapter_properties()
                    .get(i)
                    .map(|p| p.name())
                    .unwrap_or_default();
                Some(AdapterSummary::read(name, &record, self.enumeration.displays_of(i)))
            })
            .collect()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        debug!(revision = %self.revision(), devices = self.device_count(), "Destroying context");
    }
}

/// Decoded view of one device record
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSummary {
    pub name: String,
    pub vendor_id: i32,
    pub device_id: i32,
    /// `None` where the revision has no such field
    pub architecture_version: Option<i32>,
    pub asic_family: Option<i32>,
    pub is_primary: bool,
    pub local_memory_bytes: u64,
    pub displays: Vec<DisplayRecord>,
}

impl AdapterSummary {
    fn read(name: String, record: &DeviceRecord<'_>, displays: Vec<DisplayRecord>) -> Self {
        let int = |field| record.get::<i32>(field).ok().flatten();
        Self {
            name,
            vendor_id: int(DeviceField::VendorId).unwrap_or(0),
            device_id: int(DeviceField::DeviceId).unwrap_or(0),
            architecture_version: int(DeviceField::ArchitectureVersion),
            asic_family: int(DeviceField::AsicFamily),
            is_primary: int(DeviceField::IsPrimaryDevice).unwrap_or(0) != 0,
            local_memory_bytes: record
                .get::<u64>(DeviceField::LocalMemoryInBytes)
                .ok()
                .flatten()
                .unwrap_or(0),
            displays,
        }
    }
}
