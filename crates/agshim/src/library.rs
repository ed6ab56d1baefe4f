//! Lazily loaded downstream graphics libraries
//!
//! Device creation is forwarded to the real D3D11/D3D12 runtimes. Their
//! libraries are loaded on first use and kept for the life of the
//! [`crate::Runtime`]. A failed load is not remembered, so the next call
//! tries again.

use agshim_core::AgsError;
use libloading::Library;
use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::passthrough::Guid;

pub const D3D11_LIBRARY: &str = "d3d11.dll";
pub const D3D12_LIBRARY: &str = "d3d12.dll";

pub type D3D11CreateDeviceFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    driver_type: u32,
    software: *mut c_void,
    flags: u32,
    feature_levels: *const u32,
    feature_level_count: u32,
    sdk_version: u32,
    device: *mut *mut c_void,
    feature_level: *mut u32,
    immediate_context: *mut *mut c_void,
) -> i32;

pub type D3D11CreateDeviceAndSwapChainFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    driver_type: u32,
    software: *mut c_void,
    flags: u32,
    feature_levels: *const u32,
    feature_level_count: u32,
    sdk_version: u32,
    swap_chain_desc: *const c_void,
    swap_chain: *mut *mut c_void,
    device: *mut *mut c_void,
    feature_level: *mut u32,
    immediate_context: *mut *mut c_void,
) -> i32;

pub type D3D12CreateDeviceFn = unsafe extern "system" fn(
    adapter: *mut c_void,
    minimum_feature_level: u32,
    riid: *const Guid,
    device: *mut *mut c_void,
) -> i32;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Failed to load {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: libloading::Error,
    },
    #[error("{name} does not export {symbol}: {source}")]
    Symbol {
        name: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("{0} is not available")]
    Unavailable(String),
}

/// Resolved D3D11 entry points
pub struct D3d11Functions {
    pub create_device: D3D11CreateDeviceFn,
    pub create_device_and_swap_chain: D3D11CreateDeviceAndSwapChainFn,
    // Keeps the entry points above valid
    _library: Option<Library>,
}

impl D3d11Functions {
    /// Entry points that do not come from a loaded library
    pub fn from_fns(
        create_device: D3D11CreateDeviceFn,
        create_device_and_swap_chain: D3D11CreateDeviceAndSwapChainFn,
    ) -> Self {
        Self {
            create_device,
            create_device_and_swap_chain,
            _library: None,
        }
    }
}

/// Resolved D3D12 entry points
pub struct D3d12Functions {
    pub create_device: D3D12CreateDeviceFn,
    _library: Option<Library>,
}

impl D3d12Functions {
    pub fn from_fns(create_device: D3D12CreateDeviceFn) -> Self {
        Self {
            create_device,
            _library: None,
        }
    }
}

/// Loads downstream libraries and resolves their entry points
pub trait DownstreamLoader {
    fn load_d3d11(&self) -> Result<D3d11Functions, LibraryError>;
    fn load_d3d12(&self) -> Result<D3d12Functions, LibraryError>;
}

/// Loads the libraries from the system search path
#[derive(Debug, Clone)]
pub struct DynamicLoader {
    pub d3d11_name: String,
    pub d3d12_name: String,
}

impl Default for DynamicLoader {
    fn default() -> Self {
        Self {
            d3d11_name: D3D11_LIBRARY.to_string(),
            d3d12_name: D3D12_LIBRARY.to_string(),
        }
    }
}

fn open(name: &str) -> Result<Library, LibraryError> {
    // SAFETY: loading runs the library's initialisers. The names point at the
    // platform graphics runtimes, whose initialisers have no preconditions.
    unsafe { Library::new(name) }.map_err(|source| LibraryError::Load {
        name: name.to_string(),
        source,
    })
}

fn symbol<T: Copy>(library: &Library, name: &str, symbol: &'static str) -> Result<T, LibraryError> {
    let mut bytes = symbol.as_bytes().to_vec();
    bytes.push(0);
    // SAFETY: `T` is the documented signature of `symbol`, and callers keep
    // `library` alive for as long as the returned value is used.
    unsafe { library.get::<T>(&bytes) }
        .map(|sym| *sym)
        .map_err(|source| LibraryError::Symbol {
            name: name.to_string(),
            symbol,
            source,
        })
}

impl DownstreamLoader for DynamicLoader {
    fn load_d3d11(&self) -> Result<D3d11Functions, LibraryError> {
        let library = open(&self.d3d11_name)?;
        let create_device = symbol::<D3D11CreateDeviceFn>(&library, &self.d3d11_name, "D3D11CreateDevice")?;
        let create_device_and_swap_chain = symbol::<D3D11CreateDeviceAndSwapChainFn>(
            &library,
            &self.d3d11_name,
            "D3D11CreateDeviceAndSwapChain",
        )?;
        Ok(D3d11Functions {
            create_device,
            create_device_and_swap_chain,
            _library: Some(library),
        })
    }

    fn load_d3d12(&self) -> Result<D3d12Functions, LibraryError> {
        let library = open(&self.d3d12_name)?;
        let create_device = symbol::<D3D12CreateDeviceFn>(&library, &self.d3d12_name, "D3D12CreateDevice")?;
        Ok(D3d12Functions {
            create_device,
            _library: Some(library),
        })
    }
}

/// Load-once cache of the downstream entry points
pub struct Downstream {
    loader: Box<dyn DownstreamLoader>,
    d3d11: RefCell<Option<Rc<D3d11Functions>>>,
    d3d12: RefCell<Option<Rc<D3d12Functions>>>,
}

impl Downstream {
    pub fn new(loader: Box<dyn DownstreamLoader>) -> Self {
        Self {
            loader,
            d3d11: RefCell::new(None),
            d3d12: RefCell::new(None),
        }
    }

    pub fn d3d11(&self) -> Result<Rc<D3d11Functions>, AgsError> {
        if let Some(functions) = self.d3d11.borrow().as_ref() {
            return Ok(functions.clone());
        }
        let functions = Rc::new(self.loader.load_d3d11().map_err(|e| {
            warn!(error = %e, "Could not load D3D11 runtime");
            AgsError::MissingDownstreamLibrary(D3D11_LIBRARY.to_string())
        })?);
        debug!("D3D11 runtime loaded");
        *self.d3d11.borrow_mut() = Some(functions.clone());
        Ok(functions)
    }

    pub fn d3d12(&self) -> Result<Rc<D3d12Functions>, AgsError> {
        if let Some(functions) = self.d3d12.borrow().as_ref() {
            return Ok(functions.clone());
        }
        let functions = Rc::new(self.loader.load_d3d12().map_err(|e| {
            warn!(error = %e, "Could not load D3D12 runtime");
            AgsError::MissingDownstreamLibrary(D3D12_LIBRARY.to_string())
        })?);
        debug!("D3D12 runtime loaded");
        *self.d3d12.borrow_mut() = Some(functions.clone());
        Ok(functions)
    }

    pub fn d3d11_loaded(&self) -> bool {
        self.d3d11.borrow().is_some()
    }

    pub fn d3d12_loaded(&self) -> bool {
        self.d3d12.borrow().is_some()
    }
}
