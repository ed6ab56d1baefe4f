//! Graphics backend abstraction
//!
//! The enumerator only needs three things from the underlying graphics API:
//! the number of physical adapters, their identifying properties, and their
//! memory heaps. Properties are returned as fixed-size plain-data records so
//! they can be stored in caller-visible blocks; device records point at the
//! adapter name inside them.

use bytemuck::{Pod, Zeroable};
use std::cell::Cell;
use std::fmt;
use thiserror::Error;
use tracing::trace;

pub const ADAPTER_NAME_LEN: usize = 256;
pub const MAX_MEMORY_HEAPS: usize = 16;

/// Heap flag marking memory local to the adapter
pub const MEMORY_HEAP_DEVICE_LOCAL: u32 = 0x1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create backend instance: {0}")]
    InstanceCreation(String),
    #[error("Failed to enumerate physical devices: {0}")]
    Enumeration(String),
}

/// Identifying properties of one physical adapter
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct AdapterProperties {
    /// NUL-terminated adapter name
    pub device_name: [u8; ADAPTER_NAME_LEN],
    pub vendor_id: u32,
    pub device_id: u32,
}

impl AdapterProperties {
    /// Build properties, truncating `name` so it always stays NUL-terminated
    pub fn new(name: &str, vendor_id: u32, device_id: u32) -> Self {
        let mut device_name = [0u8; ADAPTER_NAME_LEN];
        let len = name.len().min(ADAPTER_NAME_LEN - 1);
        device_name[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            device_name,
            vendor_id,
            device_id,
        }
    }

    /// Name bytes up to the terminator
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .device_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(ADAPTER_NAME_LEN);
        &self.device_name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}

impl fmt::Debug for AdapterProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterProperties")
            .field("device_name", &self.name())
            .field("vendor_id", &format_args!("{:#06x}", self.vendor_id))
            .field("device_id", &format_args!("{:#06x}", self.device_id))
            .finish()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MemoryHeap {
    pub size: u64,
    pub flags: u32,
    pub reserved: u32,
}

impl MemoryHeap {
    pub fn new(size: u64, flags: u32) -> Self {
        Self {
            size,
            flags,
            reserved: 0,
        }
    }
}

/// Memory heaps of one physical adapter
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct MemoryProperties {
    pub heap_count: u32,
    pub reserved: u32,
    pub heaps: [MemoryHeap; MAX_MEMORY_HEAPS],
}

impl MemoryProperties {
    /// Build from a heap list; heaps past [`MAX_MEMORY_HEAPS`] are dropped
    pub fn from_heaps(heaps: &[MemoryHeap]) -> Self {
        let mut props = Self::default();
        let count = heaps.len().min(MAX_MEMORY_HEAPS);
        props.heaps[..count].copy_from_slice(&heaps[..count]);
        props.heap_count = count as u32;
        props
    }

    pub fn heaps(&self) -> &[MemoryHeap] {
        let count = (self.heap_count as usize).min(MAX_MEMORY_HEAPS);
        &self.heaps[..count]
    }

    /// Size of the first device-local heap, 0 if there is none.
    ///
    /// When several heaps carry the flag, enumeration order decides.
    pub fn device_local_bytes(&self) -> u64 {
        self.heaps()
            .iter()
            .find(|heap| heap.flags & MEMORY_HEAP_DEVICE_LOCAL != 0)
            .map(|heap| heap.size)
            .unwrap_or(0)
    }
}

/// A graphics API that can enumerate physical adapters
pub trait GraphicsBackend {
    fn name(&self) -> &str;

    /// Create an instance. It is destroyed when the returned box is dropped.
    fn create_instance(&self) -> Result<Box<dyn BackendInstance + '_>, BackendError>;
}

/// A live backend instance
pub trait BackendInstance {
    fn physical_device_count(&self) -> Result<usize, BackendError>;

    /// Properties of adapter `index`, `index < physical_device_count()`
    fn adapter_properties(&self, index: usize) -> AdapterProperties;

    fn memory_properties(&self, index: usize) -> MemoryProperties;
}

/// Backend for headless hosts: every instance reports zero adapters
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdapters;

impl GraphicsBackend for NoAdapters {
    fn name(&self) -> &str {
        "none"
    }

    fn create_instance(&self) -> Result<Box<dyn BackendInstance + '_>, BackendError> {
        Ok(Box::new(NoAdapters))
    }
}

impl BackendInstance for NoAdapters {
    fn physical_device_count(&self) -> Result<usize, BackendError> {
        Ok(0)
    }

    fn adapter_properties(&self, _index: usize) -> AdapterProperties {
        AdapterProperties::zeroed()
    }

    fn memory_properties(&self, _index: usize) -> MemoryProperties {
        MemoryProperties::default()
    }
}

/// One adapter served by [`FakeBackend`]
#[derive(Debug, Clone)]
pub struct FakeAdapter {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub heaps: Vec<MemoryHeap>,
}

impl FakeAdapter {
    pub fn new(name: impl Into<String>, vendor_id: u32, device_id: u32) -> Self {
        Self {
            name: name.into(),
            vendor_id,
            device_id,
            heaps: Vec::new(),
        }
    }

    pub fn with_heap(mut self, size: u64, flags: u32) -> Self {
        self.heaps.push(MemoryHeap::new(size, flags));
        self
    }
}

/// In-memory backend with a fixed adapter list.
///
/// Counts live instances so callers can check that enumeration never leaks
/// one, and can be told to fail instance creation or the device count query.
#[derive(Debug, Default)]
pub struct FakeBackend {
    adapters: Vec<FakeAdapter>,
    fail_instance: bool,
    fail_enumeration: bool,
    live_instances: Cell<usize>,
    created_instances: Cell<usize>,
}

impl FakeBackend {
    pub fn new(adapters: Vec<FakeAdapter>) -> Self {
        Self {
            adapters,
            ..Self::default()
        }
    }

    pub fn failing_instance() -> Self {
        Self {
            fail_instance: true,
            ..Self::default()
        }
    }

    pub fn failing_enumeration() -> Self {
        Self {
            fail_enumeration: true,
            ..Self::default()
        }
    }

    pub fn live_instances(&self) -> usize {
        self.live_instances.get()
    }

    pub fn created_instances(&self) -> usize {
        self.created_instances.get()
    }
}

impl GraphicsBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn create_instance(&self) -> Result<Box<dyn BackendInstance + '_>, BackendError> {
        if self.fail_instance {
            return Err(BackendError::InstanceCreation("instance creation disabled".into()));
        }
        self.live_instances.set(self.live_instances.get() + 1);
        self.created_instances.set(self.created_instances.get() + 1);
        trace!(adapters = self.adapters.len(), "Fake backend instance created");
        Ok(Box::new(FakeInstance { backend: self }))
    }
}

struct FakeInstance<'a> {
    backend: &'a FakeBackend,
}

impl BackendInstance for FakeInstance<'_> {
    fn physical_device_count(&self) -> Result<usize, BackendError> {
        if self.backend.fail_enumeration {
            return Err(BackendError::Enumeration("device query disabled".into()));
        }
        Ok(self.backend.adapters.len())
    }

    fn adapter_properties(&self, index: usize) -> AdapterProperties {
        let adapter = &self.backend.adapters[index];
        AdapterProperties::new(&adapter.name, adapter.vendor_id, adapter.device_id)
    }

    fn memory_properties(&self, index: usize) -> MemoryProperties {
        MemoryProperties::from_heaps(&self.backend.adapters[index].heaps)
    }
}

impl Drop for FakeInstance<'_> {
    fn drop(&mut self) {
        let live = &self.backend.live_instances;
        live.set(live.get().saturating_sub(1));
    }
}
