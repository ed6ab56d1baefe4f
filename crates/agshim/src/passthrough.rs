//! Device creation passthrough to the real D3D runtimes
//!
//! The caller's parameters are forwarded verbatim. The only translation is on
//! the way back: DX11 results are written into the returned-params shape of
//! the context's revision.

use agshim_core::abi::{Dx11ReturnedParams511, Dx11ReturnedParams520, Dx11ReturnedParams600};
use agshim_core::{AgsError, HResult, ReturnCode, Revision};
use bytemuck::{bytes_of, Pod};
use std::ffi::c_void;
use std::mem::{offset_of, size_of};
use std::ptr;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::runtime::Runtime;

/// A COM interface identifier
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Leading slots of every COM vtable
#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(this: *mut c_void, riid: *const Guid, object: *mut *mut c_void) -> i32,
    pub add_ref: unsafe extern "system" fn(this: *mut c_void) -> u32,
    pub release: unsafe extern "system" fn(this: *mut c_void) -> u32,
}

/// Release one reference on a COM object and return the remaining count.
///
/// # Safety
///
/// `object` must point to a live COM object whose first field is a pointer
/// to an [`IUnknownVtbl`]-compatible vtable.
pub unsafe fn com_release(object: *mut c_void) -> u32 {
    let vtbl = *(object as *const *const IUnknownVtbl);
    ((*vtbl).release)(object)
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dx11DeviceCreationParams {
    pub adapter: *mut c_void,
    pub driver_type: u32,
    pub software: *mut c_void,
    pub flags: u32,
    pub feature_levels: *const u32,
    pub feature_level_count: u32,
    pub sdk_version: u32,
    /// Optional; a swap chain is created alongside the device when set
    pub swap_chain_desc: *const c_void,
}

impl Default for Dx11DeviceCreationParams {
    fn default() -> Self {
        Self {
            adapter: ptr::null_mut(),
            driver_type: 0,
            software: ptr::null_mut(),
            flags: 0,
            feature_levels: ptr::null(),
            feature_level_count: 0,
            sdk_version: 7,
            swap_chain_desc: ptr::null(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dx12DeviceCreationParams {
    pub adapter: *mut c_void,
    pub iid: Guid,
    pub feature_level: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Dx12ReturnedParams {
    pub device: *mut c_void,
    pub extensions_supported: u32,
}

impl Default for Dx12ReturnedParams {
    fn default() -> Self {
        Self {
            device: ptr::null_mut(),
            extensions_supported: 0,
        }
    }
}

/// Field offsets of one DX11 returned-params shape
struct ReturnedLayout {
    device: usize,
    immediate_context: usize,
    swap_chain: usize,
    feature_level: usize,
}

macro_rules! returned_layout {
    ($shape:ty) => {
        ReturnedLayout {
            device: offset_of!($shape, device),
            immediate_context: offset_of!($shape, immediate_context),
            swap_chain: offset_of!($shape, swap_chain),
            feature_level: offset_of!($shape, feature_level),
        }
    };
}

fn returned_layout(revision: Revision) -> ReturnedLayout {
    if revision < Revision::V5_2_0 {
        returned_layout!(Dx11ReturnedParams511)
    } else if revision < Revision::V6_0_0 {
        returned_layout!(Dx11ReturnedParams520)
    } else {
        returned_layout!(Dx11ReturnedParams600)
    }
}

fn put<T: Pod>(out: &mut [u8], offset: usize, value: T) {
    out[offset..offset + size_of::<T>()].copy_from_slice(bytes_of(&value));
}

/// Create a D3D11 device and write it into the caller's returned-params buffer.
///
/// `returned` must hold at least the revision's returned-params size; that
/// many bytes are zeroed before the call.
///
/// # Safety
///
/// Every pointer in `params` is handed to the D3D11 runtime unchanged and
/// must satisfy its contract.
pub unsafe fn dx11_create_device(
    runtime: &Runtime,
    context: Option<&Context>,
    params: Option<&Dx11DeviceCreationParams>,
    returned: Option<&mut [u8]>,
) -> ReturnCode {
    let (Some(context), Some(params), Some(returned)) = (context, params, returned) else {
        return ReturnCode::InvalidArgs;
    };
    dx11_create_device_inner(runtime, context, params, returned).into()
}

unsafe fn dx11_create_device_inner(
    runtime: &Runtime,
    context: &Context,
    params: &Dx11DeviceCreationParams,
    returned: &mut [u8],
) -> Result<(), AgsError> {
    trace!(
        feature_levels = params.feature_level_count,
        swap_chain = !params.swap_chain_desc.is_null(),
        "DX11 device creation"
    );

    let size = context.revision().returned_params_size();
    let len = returned.len();
    let Some(returned) = returned.get_mut(..size) else {
        warn!(len, size, "Returned params buffer too small");
        return Err(AgsError::InvalidArguments);
    };

    let d3d11 = runtime.downstream().d3d11()?;
    returned.fill(0);

    let mut device: *mut c_void = ptr::null_mut();
    let mut immediate_context: *mut c_void = ptr::null_mut();
    let mut swap_chain: *mut c_void = ptr::null_mut();
    let mut feature_level: u32 = 0;

    let hr = if params.swap_chain_desc.is_null() {
        (d3d11.create_device)(
            params.adapter,
            params.driver_type,
            params.software,
            params.flags,
            params.feature_levels,
            params.feature_level_count,
            params.sdk_version,
            &mut device,
            &mut feature_level,
            &mut immediate_context,
        )
    } else {
        (d3d11.create_device_and_swap_chain)(
            params.adapter,
            params.driver_type,
            params.software,
            params.flags,
            params.feature_levels,
            params.feature_level_count,
            params.sdk_version,
            params.swap_chain_desc,
            &mut swap_chain,
            &mut device,
            &mut feature_level,
            &mut immediate_context,
        )
    };

    let hr = HResult(hr);
    if hr.is_failure() {
        warn!(hr = %hr, "Device creation failed");
        return Err(AgsError::DeviceCreationFailed(hr));
    }

    let layout = returned_layout(context.revision());
    put(returned, layout.device, device as usize);
    put(returned, layout.immediate_context, immediate_context as usize);
    put(returned, layout.swap_chain, swap_chain as usize);
    put(returned, layout.feature_level, feature_level);
    debug!(
        revision = %context.revision(),
        feature_level = format_args!("{:#x}", feature_level),
        "Created D3D11 device"
    );
    Ok(())
}

/// Release a D3D11 device and, from 5.2.0, its immediate context.
///
/// Callers built against 5.1.1 only pass the device and one reference-count
/// output; `immediate_context` and `context_refs` are ignored for them.
///
/// # Safety
///
/// Non-null `device` and `immediate_context` must be live COM objects.
pub unsafe fn dx11_destroy_device(
    context: Option<&Context>,
    device: *mut c_void,
    device_refs: Option<&mut u32>,
    immediate_context: *mut c_void,
    context_refs: Option<&mut u32>,
) -> ReturnCode {
    let legacy = context.is_some_and(|c| c.revision() < Revision::V5_2_0);
    if legacy {
        trace!("Single-reference destroy shape");
        return destroy_device_520(device, device_refs, ptr::null_mut(), None);
    }
    destroy_device_520(device, device_refs, immediate_context, context_refs)
}

unsafe fn destroy_device_520(
    device: *mut c_void,
    device_refs: Option<&mut u32>,
    immediate_context: *mut c_void,
    context_refs: Option<&mut u32>,
) -> ReturnCode {
    if device.is_null() {
        return ReturnCode::Success;
    }

    let refs = com_release(device);
    if let Some(out) = device_refs {
        *out = refs;
    }

    if immediate_context.is_null() {
        return ReturnCode::Success;
    }

    let refs = com_release(immediate_context);
    if let Some(out) = context_refs {
        *out = refs;
    }
    ReturnCode::Success
}

/// Create a D3D12 device.
///
/// # Safety
///
/// `params.adapter` is handed to the D3D12 runtime unchanged and must
/// satisfy its contract.
pub unsafe fn dx12_create_device(
    runtime: &Runtime,
    context: Option<&Context>,
    params: Option<&Dx12DeviceCreationParams>,
    returned: Option<&mut Dx12ReturnedParams>,
) -> ReturnCode {
    let (Some(_), Some(params), Some(returned)) = (context, params, returned) else {
        return ReturnCode::InvalidArgs;
    };

    let d3d12 = match runtime.downstream().d3d12() {
        Ok(functions) => functions,
        Err(e) => return e.code(),
    };

    *returned = Dx12ReturnedParams::default();
    let hr = HResult((d3d12.create_device)(
        params.adapter,
        params.feature_level,
        &params.iid,
        &mut returned.device,
    ));
    if hr.is_failure() {
        warn!(hr = %hr, "D3D12CreateDevice failed");
        return AgsError::DeviceCreationFailed(hr).code();
    }

    debug!(device = ?returned.device, "Created D3D12 device");
    ReturnCode::Success
}

/// Release a D3D12 device. A null device is a successful no-op.
///
/// # Safety
///
/// A non-null `device` must be a live COM object.
pub unsafe fn dx12_destroy_device(
    _context: Option<&Context>,
    device: *mut c_void,
    device_refs: Option<&mut u32>,
) -> ReturnCode {
    if device.is_null() {
        return ReturnCode::Success;
    }

    let refs = com_release(device);
    if let Some(out) = device_refs {
        *out = refs;
    }
    ReturnCode::Success
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::library::{D3d11Functions, D3d12Functions, DownstreamLoader, LibraryError};
    use crate::runtime::tests::{runtime_with, single_adapter};
    use agshim_core::Revision;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal COM object: a vtable pointer and a reference count
    #[repr(C)]
    pub struct FakeCom {
        vtbl: *const IUnknownVtbl,
        refs: AtomicU32,
    }

    unsafe extern "system" fn fake_query_interface(
        _: *mut c_void,
        _: *const Guid,
        object: *mut *mut c_void,
    ) -> i32 {
        *object = ptr::null_mut();
        0x8000_4002u32 as i32
    }

    unsafe extern "system" fn fake_add_ref(this: *mut c_void) -> u32 {
        (*(this as *const FakeCom)).refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    unsafe extern "system" fn fake_release(this: *mut c_void) -> u32 {
        (*(this as *const FakeCom)).refs.fetch_sub(1, Ordering::SeqCst) - 1
    }

    static FAKE_VTBL: IUnknownVtbl = IUnknownVtbl {
        query_interface: fake_query_interface,
        add_ref: fake_add_ref,
        release: fake_release,
    };

    pub fn fake_com(refs: u32) -> *mut c_void {
        Box::into_raw(Box::new(FakeCom {
            vtbl: &FAKE_VTBL,
            refs: AtomicU32::new(refs),
        }))
        .cast()
    }

    fn refs_of(object: *mut c_void) -> u32 {
        unsafe { (*(object as *const FakeCom)).refs.load(Ordering::SeqCst) }
    }

    fn free_com(object: *mut c_void) {
        drop(unsafe { Box::from_raw(object as *mut FakeCom) });
    }

    const FEATURE_LEVEL_11_1: u32 = 0xb100;

    unsafe extern "system" fn create_device(
        _: *mut c_void,
        _: u32,
        _: *mut c_void,
        _: u32,
        _: *const u32,
        _: u32,
        _: u32,
        device: *mut *mut c_void,
        feature_level: *mut u32,
        immediate_context: *mut *mut c_void,
    ) -> i32 {
        *device = fake_com(2);
        *feature_level = FEATURE_LEVEL_11_1;
        *immediate_context = fake_com(1);
        0
    }

    unsafe extern "system" fn create_device_and_swap_chain(
        _: *mut c_void,
        _: u32,
        _: *mut c_void,
        _: u32,
        _: *const u32,
        _: u32,
        _: u32,
        _: *const c_void,
        swap_chain: *mut *mut c_void,
        device: *mut *mut c_void,
        feature_level: *mut u32,
        immediate_context: *mut *mut c_void,
    ) -> i32 {
        *swap_chain = fake_com(1);
        create_device(
            ptr::null_mut(),
            0,
            ptr::null_mut(),
            0,
            ptr::null(),
            0,
            0,
            device,
            feature_level,
            immediate_context,
        )
    }

    unsafe extern "system" fn create_device_fails(
        _: *mut c_void,
        _: u32,
        _: *mut c_void,
        _: u32,
        _: *const u32,
        _: u32,
        _: u32,
        _: *mut *mut c_void,
        _: *mut u32,
        _: *mut *mut c_void,
    ) -> i32 {
        0x8007_000Eu32 as i32
    }

    unsafe extern "system" fn d3d12_create_device(
        _: *mut c_void,
        _: u32,
        _: *const Guid,
        device: *mut *mut c_void,
    ) -> i32 {
        *device = fake_com(1);
        0
    }

    pub struct FakeLoader {
        pub d3d11_fails: bool,
        pub create_fails: bool,
    }

    impl DownstreamLoader for FakeLoader {
        fn load_d3d11(&self) -> Result<D3d11Functions, LibraryError> {
            if self.d3d11_fails {
                return Err(LibraryError::Unavailable("d3d11".into()));
            }
            let create = if self.create_fails {
                create_device_fails
            } else {
                create_device
            };
            Ok(D3d11Functions::from_fns(create, create_device_and_swap_chain))
        }

        fn load_d3d12(&self) -> Result<D3d12Functions, LibraryError> {
            Ok(D3d12Functions::from_fns(d3d12_create_device))
        }
    }

    fn fake_loader() -> Box<FakeLoader> {
        Box::new(FakeLoader {
            d3d11_fails: false,
            create_fails: false,
        })
    }

    fn read_usize(bytes: &[u8], offset: usize) -> usize {
        bytemuck::pod_read_unaligned(&bytes[offset..offset + size_of::<usize>()])
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
    }

    #[test]
    fn test_dx11_returned_shape_per_revision() {
        for rev in Revision::ALL {
            let runtime = runtime_with(single_adapter(), rev).with_loader(fake_loader());
            let context = crate::context::Context::create(&runtime).unwrap();
            let mut returned = vec![0xAAu8; 128];
            let code = unsafe {
                dx11_create_device(
                    &runtime,
                    Some(&*context),
                    Some(&Dx11DeviceCreationParams::default()),
                    Some(returned.as_mut_slice()),
                )
            };
            assert_eq!(code, ReturnCode::Success);

            let layout = returned_layout(rev);
            let device = read_usize(&returned, layout.device) as *mut c_void;
            let immediate = read_usize(&returned, layout.immediate_context) as *mut c_void;
            assert!(!device.is_null());
            assert_eq!(read_usize(&returned, layout.swap_chain), 0);
            assert_eq!(read_u32(&returned, layout.feature_level), FEATURE_LEVEL_11_1);

            // Bytes inside the shape that carry no result are zeroed, bytes
            // past it are untouched.
            let size = rev.returned_params_size();
            assert!(returned[layout.feature_level + 4..size].iter().all(|b| *b == 0));
            assert!(returned[size..].iter().all(|b| *b == 0xAA));

            free_com(device);
            free_com(immediate);
        }
    }

    #[test]
    fn test_dx11_swap_chain_path() {
        let runtime = runtime_with(single_adapter(), Revision::V6_0_0).with_loader(fake_loader());
        let context = crate::context::Context::create(&runtime).unwrap();
        let params = Dx11DeviceCreationParams {
            swap_chain_desc: &0u64 as *const u64 as *const c_void,
            ..Default::default()
        };
        let mut returned = vec![0u8; Revision::V6_0_0.returned_params_size()];
        let code = unsafe { dx11_create_device(&runtime, Some(&*context), Some(&params), Some(returned.as_mut_slice())) };
        assert_eq!(code, ReturnCode::Success);

        let layout = returned_layout(Revision::V6_0_0);
        for offset in [layout.device, layout.immediate_context, layout.swap_chain] {
            let object = read_usize(&returned, offset) as *mut c_void;
            assert!(!object.is_null());
            free_com(object);
        }
    }

    #[test]
    fn test_dx11_failures() {
        let runtime = runtime_with(single_adapter(), Revision::V5_4_1).with_loader(Box::new(FakeLoader {
            d3d11_fails: true,
            create_fails: false,
        }));
        let context = crate::context::Context::create(&runtime).unwrap();
        let params = Dx11DeviceCreationParams::default();
        let mut returned = vec![0u8; 64];
        let code = unsafe { dx11_create_device(&runtime, Some(&*context), Some(&params), Some(returned.as_mut_slice())) };
        assert_eq!(code, ReturnCode::MissingD3dDll);

        let runtime = runtime_with(single_adapter(), Revision::V5_4_1).with_loader(Box::new(FakeLoader {
            d3d11_fails: false,
            create_fails: true,
        }));
        let context = crate::context::Context::create(&runtime).unwrap();
        let code = unsafe { dx11_create_device(&runtime, Some(&*context), Some(&params), Some(returned.as_mut_slice())) };
        assert_eq!(code, ReturnCode::DxFailure);

        let mut short = vec![0u8; 8];
        let code = unsafe { dx11_create_device(&runtime, Some(&*context), Some(&params), Some(short.as_mut_slice())) };
        assert_eq!(code, ReturnCode::InvalidArgs);
        let code = unsafe { dx11_create_device(&runtime, None, Some(&params), Some(returned.as_mut_slice())) };
        assert_eq!(code, ReturnCode::InvalidArgs);
    }

    #[test]
    fn test_dx11_destroy_releases_through_vtable() {
        let runtime = runtime_with(single_adapter(), Revision::V6_0_1);
        let context = crate::context::Context::create(&runtime).unwrap();
        let device = fake_com(3);
        let immediate = fake_com(2);
        let (mut device_refs, mut context_refs) = (0, 0);

        let code = unsafe {
            dx11_destroy_device(
                Some(&*context),
                device,
                Some(&mut device_refs),
                immediate,
                Some(&mut context_refs),
            )
        };
        assert_eq!(code, ReturnCode::Success);
        assert_eq!((device_refs, context_refs), (2, 1));
        assert_eq!(refs_of(device), 2);
        assert_eq!(refs_of(immediate), 1);
        free_com(device);
        free_com(immediate);
    }

    #[test]
    fn test_dx11_destroy_legacy_shape_ignores_context() {
        let runtime = runtime_with(single_adapter(), Revision::V5_1_1);
        let context = crate::context::Context::create(&runtime).unwrap();
        let device = fake_com(1);
        let immediate = fake_com(1);
        let mut refs = 7;
        let mut context_refs = 7;

        let code = unsafe {
            dx11_destroy_device(Some(&*context), device, Some(&mut refs), immediate, Some(&mut context_refs))
        };
        assert_eq!(code, ReturnCode::Success);
        assert_eq!(refs, 0);
        assert_eq!(context_refs, 7);
        assert_eq!(refs_of(immediate), 1);
        free_com(device);
        free_com(immediate);
    }

    #[test]
    fn test_dx11_destroy_null_device() {
        let code = unsafe { dx11_destroy_device(None, ptr::null_mut(), None, ptr::null_mut(), None) };
        assert_eq!(code, ReturnCode::Success);
    }

    #[test]
    fn test_dx12_create_and_destroy() {
        let runtime = runtime_with(single_adapter(), Revision::V6_0_0).with_loader(fake_loader());
        let context = crate::context::Context::create(&runtime).unwrap();
        let params = Dx12DeviceCreationParams {
            adapter: ptr::null_mut(),
            iid: Guid::default(),
            feature_level: 0xc000,
        };
        let mut returned = Dx12ReturnedParams {
            device: ptr::null_mut(),
            extensions_supported: 99,
        };

        let code = unsafe { dx12_create_device(&runtime, Some(&*context), Some(&params), Some(&mut returned)) };
        assert_eq!(code, ReturnCode::Success);
        assert!(!returned.device.is_null());
        assert_eq!(returned.extensions_supported, 0);

        let mut refs = 9;
        let device = returned.device;
        let code = unsafe { dx12_destroy_device(Some(&*context), device, Some(&mut refs)) };
        assert_eq!(code, ReturnCode::Success);
        assert_eq!(refs, 0);
        free_com(device);

        let code = unsafe { dx12_destroy_device(Some(&*context), ptr::null_mut(), None) };
        assert_eq!(code, ReturnCode::Success);
    }
}
