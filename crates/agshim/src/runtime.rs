//! Process-scoped service object
//!
//! The host creates one [`Runtime`] and passes it to every entry point. It
//! owns the graphics backend, the display source, the revision detector, the
//! allocator that device arrays come from, and the downstream library cache.

use agshim_core::{Allocator, Revision, SystemAllocator};
use agshim_discovery::{Detection, DisplaySource, GraphicsBackend, VersionDetector};
use std::rc::Rc;
use tracing::debug;

use crate::library::{Downstream, DownstreamLoader, DynamicLoader};

pub struct Runtime {
    backend: Box<dyn GraphicsBackend>,
    displays: Box<dyn DisplaySource>,
    detector: VersionDetector,
    allocator: Rc<dyn Allocator>,
    downstream: Downstream,
}

impl Runtime {
    pub fn new(
        backend: Box<dyn GraphicsBackend>,
        displays: Box<dyn DisplaySource>,
        detector: VersionDetector,
    ) -> Self {
        debug!(backend = backend.name(), "Creating runtime");
        Self {
            backend,
            displays,
            detector,
            allocator: Rc::new(SystemAllocator),
            downstream: Downstream::new(Box::new(DynamicLoader::default())),
        }
    }

    pub fn with_allocator(mut self, allocator: Rc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Replace the downstream loader. Anything already loaded is dropped.
    pub fn with_loader(mut self, loader: Box<dyn DownstreamLoader>) -> Self {
        self.downstream = Downstream::new(loader);
        self
    }

    /// Run revision detection. Never fails.
    pub fn detect(&self) -> Detection {
        self.detector.detect()
    }

    pub fn revision(&self) -> Revision {
        self.detect().revision
    }

    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn displays(&self) -> &dyn DisplaySource {
        self.displays.as_ref()
    }

    pub fn allocator(&self) -> Rc<dyn Allocator> {
        self.allocator.clone()
    }

    pub fn downstream(&self) -> &Downstream {
        &self.downstream
    }
}
