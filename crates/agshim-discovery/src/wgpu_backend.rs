//! `wgpu` graphics backend
//!
//! wgpu reports adapter identity but not memory heaps, so adapters from this
//! backend always report zero device-local memory.

use tracing::debug;

use crate::backend::{AdapterProperties, BackendError, BackendInstance, GraphicsBackend, MemoryProperties};

pub struct WgpuBackend {
    backends: wgpu::Backends,
}

impl WgpuBackend {
    pub fn new() -> Self {
        Self {
            // GL adapters duplicate the Vulkan ones on most drivers
            backends: wgpu::Backends::all() - wgpu::Backends::GL,
        }
    }
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_instance(&self) -> Result<Box<dyn BackendInstance + '_>, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: self.backends,
            ..Default::default()
        });

        let adapters: Vec<AdapterProperties> = instance
            .enumerate_adapters(self.backends)
            .into_iter()
            .map(|adapter| {
                let info = adapter.get_info();
                debug!(
                    name = %info.name,
                    backend = ?info.backend,
                    device_type = ?info.device_type,
                    "wgpu adapter"
                );
                AdapterProperties::new(&info.name, info.vendor, info.device)
            })
            .collect();

        Ok(Box::new(WgpuInstance {
            _instance: instance,
            adapters,
        }))
    }
}

struct WgpuInstance {
    _instance: wgpu::Instance,
    adapters: Vec<AdapterProperties>,
}

impl BackendInstance for WgpuInstance {
    fn physical_device_count(&self) -> Result<usize, BackendError> {
        Ok(self.adapters.len())
    }

    fn adapter_properties(&self, index: usize) -> AdapterProperties {
        self.adapters[index]
    }

    fn memory_properties(&self, _index: usize) -> MemoryProperties {
        MemoryProperties::default()
    }
}
