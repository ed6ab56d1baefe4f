//! Adapter and display enumeration into revision-sized device records
//!
//! The enumerator queries the backend once, copies adapter properties into
//! caller-visible blocks, and fills one zeroed device record per adapter
//! through the layout table. Display arrays hang off each record.
//!
//! An [`Enumeration`] owns every block it hands out. Dropping it releases the
//! display arrays (found by walking the device records with the layout table),
//! then the device array, then the property arrays.

use agshim_core::abi::{ARCHITECTURE_GCN, ASIC_FAMILY_GCN4};
use agshim_core::record::{records, records_mut};
use agshim_core::{
    AgsError, Allocator, Block, DeviceField, DeviceRecord, DeviceRecordMut, DisplayAbi,
    DisplayRecord, Revision, TARGET_VENDOR_ID,
};
use std::collections::HashMap;
use std::mem::{offset_of, size_of};
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

use crate::backend::{AdapterProperties, GraphicsBackend, MemoryProperties};
use crate::displays::DisplayScanner;
use crate::display_source::DisplaySource;

/// Devices, properties and displays produced by one enumeration
pub struct Enumeration {
    allocator: Rc<dyn Allocator>,
    revision: Revision,
    devices: Option<Block>,
    properties: Option<Block>,
    memory_properties: Option<Block>,
    /// Display arrays keyed by the address stored in their device record
    displays: HashMap<usize, Block>,
}

impl Enumeration {
    fn new(allocator: Rc<dyn Allocator>, revision: Revision) -> Self {
        Self {
            allocator,
            revision,
            devices: None,
            properties: None,
            memory_properties: None,
            displays: HashMap::new(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn device_count(&self) -> usize {
        self.devices
            .as_ref()
            .map(|b| b.len() / self.revision.record_size())
            .unwrap_or(0)
    }

    /// Address of the device array as published to callers
    pub fn devices_addr(&self) -> usize {
        self.devices.as_ref().map(Block::addr).unwrap_or(0)
    }

    /// Raw device array, `device_count() * revision().record_size()` bytes
    pub fn device_bytes(&self) -> &[u8] {
        self.devices.as_ref().map(Block::as_bytes).unwrap_or(&[])
    }

    pub fn device(&self, index: usize) -> Option<DeviceRecord<'_>> {
        records(self.device_bytes(), self.revision).nth(index)
    }

    pub fn adapter_properties(&self) -> &[AdapterProperties] {
        self.properties
            .as_ref()
            .map(|b| bytemuck::cast_slice(b.as_bytes()))
            .unwrap_or(&[])
    }

    pub fn memory_properties(&self) -> &[MemoryProperties] {
        self.memory_properties
            .as_ref()
            .map(|b| bytemuck::cast_slice(b.as_bytes()))
            .unwrap_or(&[])
    }

    /// Decode the displays attached to device `index`
    pub fn displays_of(&self, index: usize) -> Vec<DisplayRecord> {
        let Some(record) = self.device(index) else {
            return Vec::new();
        };
        let count = record
            .get::<i32>(DeviceField::NumDisplays)
            .ok()
            .flatten()
            .unwrap_or(0)
            .max(0) as usize;
        let addr = record
            .get::<usize>(DeviceField::Displays)
            .ok()
            .flatten()
            .unwrap_or(0);
        let Some(block) = self.displays.get(&addr) else {
            return Vec::new();
        };

        let abi = self.revision.display_abi();
        block
            .as_bytes()
            .chunks_exact(abi.record_size())
            .take(count)
            .filter_map(|slot| DisplayRecord::decode(slot, abi))
            .collect()
    }

    /// Number of display arrays currently owned
    pub fn display_array_count(&self) -> usize {
        self.displays.len()
    }
}

impl Drop for Enumeration {
    fn drop(&mut self) {
        if let Some(devices) = self.devices.take() {
            for record in records(devices.as_bytes(), self.revision) {
                let addr = record
                    .get::<usize>(DeviceField::Displays)
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                if let Some(block) = self.displays.remove(&addr) {
                    self.allocator.release(block);
                }
            }
            self.allocator.release(devices);
        }

        // Arrays not yet linked into a record when a build step failed
        for (_, block) in self.displays.drain() {
            self.allocator.release(block);
        }

        if let Some(block) = self.properties.take() {
            self.allocator.release(block);
        }
        if let Some(block) = self.memory_properties.take() {
            self.allocator.release(block);
        }
        trace!(revision = %self.revision, "Enumeration released");
    }
}

/// Runs one enumeration against a backend and a display source
pub struct Enumerator<'a> {
    backend: &'a dyn GraphicsBackend,
    displays: &'a dyn DisplaySource,
    allocator: Rc<dyn Allocator>,
}

impl<'a> Enumerator<'a> {
    pub fn new(
        backend: &'a dyn GraphicsBackend,
        displays: &'a dyn DisplaySource,
        allocator: Rc<dyn Allocator>,
    ) -> Self {
        Self {
            backend,
            displays,
            allocator,
        }
    }

    /// Enumerate adapters into records of `revision`.
    ///
    /// Zero adapters is a success with an empty, non-null device array. On
    /// failure every block allocated by this call has been released.
    pub fn enumerate(&self, revision: Revision) -> Result<Enumeration, AgsError> {
        let mut result = Enumeration::new(self.allocator.clone(), revision);

        {
            let instance = self.backend.create_instance().map_err(|e| {
                warn!(backend = self.backend.name(), error = %e, "Backend instance creation failed");
                AgsError::BackendUnavailable(e.to_string())
            })?;

            let count = instance.physical_device_count().map_err(|e| {
                warn!(backend = self.backend.name(), error = %e, "Physical device enumeration failed");
                AgsError::BackendUnavailable(e.to_string())
            })?;
            debug!(backend = self.backend.name(), count, "Enumerated physical devices");

            let mut properties = self.allocator.allocate(count * size_of::<AdapterProperties>())?;
            for (i, slot) in bytemuck::cast_slice_mut::<u8, AdapterProperties>(properties.as_bytes_mut())
                .iter_mut()
                .enumerate()
            {
                *slot = instance.adapter_properties(i);
            }
            result.properties = Some(properties);

            let mut memory = self.allocator.allocate(count * size_of::<MemoryProperties>())?;
            for (i, slot) in bytemuck::cast_slice_mut::<u8, MemoryProperties>(memory.as_bytes_mut())
                .iter_mut()
                .enumerate()
            {
                *slot = instance.memory_properties(i);
            }
            result.memory_properties = Some(memory);
        }

        let count = result.adapter_properties().len();
        let mut devices = self.allocator.allocate(count * revision.record_size())?;
        let filled = self.fill_records(&mut result, &mut devices);
        result.devices = Some(devices);
        filled?;

        info!(
            revision = %revision,
            devices = count,
            displays = result.display_array_count(),
            "Enumeration complete"
        );
        Ok(result)
    }

    fn fill_records(&self, result: &mut Enumeration, devices: &mut Block) -> Result<(), AgsError> {
        let revision = result.revision;
        let props_addr = result.properties.as_ref().map(Block::addr).unwrap_or(0);
        let adapters: Vec<AdapterProperties> = result.adapter_properties().to_vec();
        let memory: Vec<MemoryProperties> = result.memory_properties().to_vec();
        let scanner = DisplayScanner::new(self.displays, self.allocator.as_ref());

        for (i, mut record) in records_mut(devices.as_bytes_mut(), revision).enumerate() {
            let props = &adapters[i];
            let local_memory = memory[i].device_local_bytes();
            let name = props.name();
            trace!(
                device = %name,
                vendor_id = format_args!("{:#06x}", props.vendor_id),
                device_id = format_args!("{:#06x}", props.device_id),
                local_memory,
                "Filling device record"
            );

            // The adapter string points into the property array, which
            // lives exactly as long as the device array.
            let name_addr = props_addr
                + i * size_of::<AdapterProperties>()
                + offset_of!(AdapterProperties, device_name);
            record.set::<usize>(DeviceField::AdapterString, name_addr)?;
            record.set::<i32>(DeviceField::VendorId, props.vendor_id as i32)?;
            record.set::<i32>(DeviceField::DeviceId, props.device_id as i32)?;
            if props.vendor_id == TARGET_VENDOR_ID {
                record.set::<i32>(DeviceField::ArchitectureVersion, ARCHITECTURE_GCN)?;
                record.set::<i32>(DeviceField::AsicFamily, ASIC_FAMILY_GCN4)?;
            }
            record.set::<u64>(DeviceField::LocalMemoryInBytes, local_memory)?;
            if i == 0 {
                record.set::<i32>(DeviceField::IsPrimaryDevice, 1)?;
            }

            self.attach_displays(result, &mut record, &scanner, &name)?;
        }
        Ok(())
    }

    fn attach_displays(
        &self,
        result: &mut Enumeration,
        record: &mut DeviceRecordMut<'_>,
        scanner: &DisplayScanner<'_>,
        adapter_name: &str,
    ) -> Result<(), AgsError> {
        let scan = scanner.scan(adapter_name);
        let Some(native) = scan.block else {
            return Ok(());
        };

        let block = match result.revision.display_abi() {
            DisplayAbi::Native => native,
            DisplayAbi::Legacy => {
                let legacy = scanner.truncate_to_legacy(&native, scan.count);
                self.allocator.release(native);
                match legacy {
                    Some(block) => block,
                    None => return Ok(()),
                }
            }
        };

        let addr = block.addr();
        result.displays.insert(addr, block);
        record.set::<i32>(DeviceField::NumDisplays, scan.count as i32)?;
        record.set::<usize>(DeviceField::Displays, addr)?;
        debug!(adapter = %adapter_name, displays = scan.count, "Attached displays");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FakeAdapter, FakeBackend, MEMORY_HEAP_DEVICE_LOCAL};
    use crate::display_source::{DisplayMode, DisplaySnapshot, NoDisplays};
    use agshim_core::{DisplayRect, TrackingAllocator};
    use std::ffi::CStr;

    const RADEON: &str = "AMD Radeon RX 6800";
    const GEFORCE: &str = "NVIDIA GeForce RTX 3070";

    fn two_adapters() -> FakeBackend {
        FakeBackend::new(vec![
            FakeAdapter::new(RADEON, TARGET_VENDOR_ID, 0x73bf)
                .with_heap(256 << 20, 0)
                .with_heap(16 << 30, MEMORY_HEAP_DEVICE_LOCAL),
            FakeAdapter::new(GEFORCE, 0x10de, 0x2484).with_heap(8 << 30, MEMORY_HEAP_DEVICE_LOCAL),
        ])
    }

    fn mode(width: i32, height: i32, refresh_rate: f32) -> DisplayMode {
        DisplayMode {
            width,
            height,
            refresh_rate,
        }
    }

    fn rect(offset_x: i32, width: i32, height: i32) -> DisplayRect {
        DisplayRect {
            offset_x,
            offset_y: 0,
            width,
            height,
        }
    }

    fn desk() -> DisplaySnapshot {
        DisplaySnapshot::new()
            .with_output(
                "DP-1",
                RADEON,
                Some("DELL U2719D"),
                true,
                rect(0, 2560, 1440),
                vec![mode(2560, 1440, 59.95), mode(1920, 1080, 75.0)],
                Some(mode(2560, 1440, 59.95)),
            )
            .with_output(
                "HDMI-1",
                RADEON,
                None,
                false,
                rect(2560, 1920, 1080),
                vec![mode(1920, 1080, 60.0)],
                Some(mode(1920, 1080, 60.0)),
            )
            .with_output(
                "DP-3",
                GEFORCE,
                None,
                false,
                rect(4480, 1920, 1080),
                vec![mode(1920, 1080, 144.0)],
                Some(mode(1920, 1080, 144.0)),
            )
    }

    fn enumerate(
        backend: &FakeBackend,
        displays: &dyn DisplaySource,
        alloc: &Rc<TrackingAllocator>,
        revision: Revision,
    ) -> Result<Enumeration, AgsError> {
        let allocator: Rc<dyn Allocator> = alloc.clone();
        Enumerator::new(backend, displays, allocator).enumerate(revision)
    }

    #[test]
    fn test_two_adapters_at_600() {
        let backend = two_adapters();
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &NoDisplays, &alloc, Revision::V6_0_0).unwrap();
        assert_eq!(result.device_count(), 2);
        assert_eq!(backend.live_instances(), 0);

        let first = result.device(0).unwrap();
        assert_eq!(first.get::<i32>(DeviceField::VendorId).unwrap(), Some(0x1002));
        assert_eq!(first.get::<i32>(DeviceField::AsicFamily).unwrap(), Some(ASIC_FAMILY_GCN4));
        assert_eq!(first.get::<i32>(DeviceField::ArchitectureVersion).unwrap(), None);
        assert_eq!(first.get::<i32>(DeviceField::IsPrimaryDevice).unwrap(), Some(1));
        assert_eq!(first.get::<u64>(DeviceField::LocalMemoryInBytes).unwrap(), Some(16 << 30));

        let second = result.device(1).unwrap();
        assert_eq!(second.get::<i32>(DeviceField::AsicFamily).unwrap(), Some(0));
        assert_eq!(second.get::<i32>(DeviceField::IsPrimaryDevice).unwrap(), Some(0));
        assert_eq!(second.get::<i32>(DeviceField::DeviceId).unwrap(), Some(0x2484));
    }

    #[test]
    fn test_placeholder_tags_in_legacy_revision() {
        let backend = two_adapters();
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &NoDisplays, &alloc, Revision::V5_3_0).unwrap();
        let first = result.device(0).unwrap();
        assert_eq!(
            first.get::<i32>(DeviceField::ArchitectureVersion).unwrap(),
            Some(ARCHITECTURE_GCN)
        );
        assert_eq!(first.get::<i32>(DeviceField::AsicFamily).unwrap(), None);
        let second = result.device(1).unwrap();
        assert_eq!(second.get::<i32>(DeviceField::ArchitectureVersion).unwrap(), Some(0));
    }

    #[test]
    fn test_adapter_string_points_into_properties() {
        let backend = two_adapters();
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &NoDisplays, &alloc, Revision::V5_4_2).unwrap();
        for (i, props) in result.adapter_properties().iter().enumerate() {
            let ptr = result
                .device(i)
                .unwrap()
                .get::<usize>(DeviceField::AdapterString)
                .unwrap()
                .unwrap();
            assert_eq!(ptr, props.device_name.as_ptr() as usize);
            // SAFETY: the pointer targets a NUL-terminated name inside the
            // property block owned by `result`.
            let name = unsafe { CStr::from_ptr(ptr as *const std::ffi::c_char) };
            assert_eq!(name.to_str().unwrap(), props.name());
        }
    }

    #[test]
    fn test_zero_adapters() {
        let backend = FakeBackend::new(Vec::new());
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &NoDisplays, &alloc, Revision::V6_0_1).unwrap();
        assert_eq!(result.device_count(), 0);
        assert_ne!(result.devices_addr(), 0);
        drop(result);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn test_backend_failures() {
        let alloc = Rc::new(TrackingAllocator::new());
        for backend in [FakeBackend::failing_instance(), FakeBackend::failing_enumeration()] {
            let err = enumerate(&backend, &NoDisplays, &alloc, Revision::V6_0_0).err().unwrap();
            assert!(matches!(err, AgsError::BackendUnavailable(_)));
            assert_eq!(backend.live_instances(), 0);
        }
        assert_eq!(alloc.total_allocations(), 0);
    }

    #[test]
    fn test_out_of_memory_unwinds_at_every_step() {
        let backend = two_adapters();
        let displays = desk();
        // properties, memory properties, device array
        for successes in 0..3 {
            let alloc = Rc::new(TrackingAllocator::new());
            alloc.fail_after(successes);
            let err = enumerate(&backend, &displays, &alloc, Revision::V5_4_1).err().unwrap();
            assert_eq!(err, AgsError::OutOfMemory);
            assert_eq!(alloc.live_blocks(), 0, "leak after {} allocations", successes);
            assert_eq!(backend.live_instances(), 0);
        }
    }

    #[test]
    fn test_release_is_complete_for_every_revision() {
        let backend = two_adapters();
        let displays = desk();
        for rev in Revision::ALL {
            let alloc = Rc::new(TrackingAllocator::new());
            let result = enumerate(&backend, &displays, &alloc, rev).unwrap();
            assert_eq!(result.display_array_count(), 2);
            assert!(alloc.live_blocks() > 0);
            drop(result);
            assert_eq!(alloc.live_blocks(), 0, "leak in {}", rev);
        }
    }

    #[test]
    fn test_displays_matched_by_adapter_name() {
        let backend = two_adapters();
        let displays = desk();
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &displays, &alloc, Revision::V6_0_0).unwrap();

        let radeon = result.displays_of(0);
        assert_eq!(radeon.len(), 2);
        assert_eq!(radeon[0].name, "DELL U2719D");
        assert_eq!(radeon[0].display_device_name, "DP-1");
        assert!(radeon[0].is_primary);
        assert_eq!(radeon[0].max_resolution_x, 2560);
        assert_eq!(radeon[0].max_refresh_rate, 75.0);
        assert_eq!(radeon[0].current_refresh_rate, 59.95);
        assert_eq!(radeon[0].visible_resolution, radeon[0].current_resolution);
        assert_eq!(radeon[1].name, "Unknown");
        assert_eq!(radeon[1].current_resolution.offset_x, 2560);

        let geforce = result.displays_of(1);
        assert_eq!(geforce.len(), 1);
        assert_eq!(geforce[0].max_refresh_rate, 144.0);
    }

    #[test]
    fn test_legacy_revision_gets_truncated_copies() {
        let backend = two_adapters();
        let displays = desk();
        let alloc = Rc::new(TrackingAllocator::new());
        let legacy = enumerate(&backend, &displays, &alloc, Revision::V5_4_2).unwrap();
        let native = enumerate(&backend, &displays, &alloc, Revision::V6_0_1).unwrap();
        assert_eq!(legacy.displays_of(0), native.displays_of(0));
        assert_eq!(legacy.displays_of(1), native.displays_of(1));
    }

    #[test]
    fn test_unmatched_monitor_contributes_nothing() {
        let backend = two_adapters();
        let displays = DisplaySnapshot::new().with_output(
            "DP-9",
            "Some Other Adapter",
            None,
            true,
            rect(0, 1920, 1080),
            vec![mode(1920, 1080, 60.0)],
            None,
        );
        let alloc = Rc::new(TrackingAllocator::new());
        let result = enumerate(&backend, &displays, &alloc, Revision::V6_0_0).unwrap();
        for i in 0..2 {
            let record = result.device(i).unwrap();
            assert_eq!(record.get::<i32>(DeviceField::NumDisplays).unwrap(), Some(0));
            assert_eq!(record.get::<usize>(DeviceField::Displays).unwrap(), Some(0));
        }
        assert_eq!(result.display_array_count(), 0);
    }

    #[test]
    fn test_display_allocation_failure_is_not_fatal() {
        let backend = two_adapters();
        let displays = desk();
        let alloc = Rc::new(TrackingAllocator::new());
        // properties, memory properties and device array succeed; first display array fails
        alloc.fail_after(3);
        let result = enumerate(&backend, &displays, &alloc, Revision::V6_0_0).unwrap();
        assert_eq!(result.device_count(), 2);
        assert!(result.displays_of(0).is_empty());
        drop(result);
        assert_eq!(alloc.live_blocks(), 0);
    }
}
