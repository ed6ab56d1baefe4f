//! Vendor API entry points
//!
//! Two historical init shapes exist. The legacy one fills a [`GpuInfo511`]
//! that also reports the detected version triple; the newer one fills a
//! [`GpuInfo600`]. Both are backed by the same [`Context`] and both leave the
//! caller's output untouched on failure.

use agshim_core::abi::{GpuInfo511, GpuInfo600};
use agshim_core::{AgsError, ReturnCode, Revision, DRIVER_VERSION, SOFTWARE_VERSION};
use std::ffi::{c_void, CStr};
use std::sync::Once;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::runtime::Runtime;

/// Outcome of a driver version check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DriverVersionResult {
    Ok = 0,
    Older = 1,
    Undefined = 2,
}

fn create_into(runtime: &Runtime, slot: &mut Option<Box<Context>>) -> Result<Box<Context>, AgsError> {
    if slot.is_some() {
        warn!("Context slot already holds a live context");
        return Err(AgsError::InvalidArguments);
    }
    Context::create(runtime)
}

/// Legacy init shape
pub fn init(
    runtime: &Runtime,
    context: Option<&mut Option<Box<Context>>>,
    gpu_info: Option<&mut GpuInfo511>,
) -> ReturnCode {
    let (Some(slot), Some(gpu_info)) = (context, gpu_info) else {
        return ReturnCode::InvalidArgs;
    };

    let created = match create_into(runtime, slot) {
        Ok(created) => created,
        Err(e) => {
            warn!(error = %e, "Init failed");
            return e.code();
        }
    };

    let version = created.revision().version();
    *gpu_info = GpuInfo511 {
        ags_version_major: i32::from(version.major),
        ags_version_minor: i32::from(version.minor),
        ags_version_patch: i32::from(version.patch),
        is_workstation: 0,
        driver_version: DRIVER_VERSION.as_ptr(),
        radeon_software_version: SOFTWARE_VERSION.as_ptr(),
        num_devices: created.device_count() as i32,
        devices: created.devices_ptr(),
    };
    debug!(version = %version, devices = gpu_info.num_devices, "Filled legacy GPU info");
    *slot = Some(created);
    ReturnCode::Success
}

/// Current init shape. `ags_version` is what the caller was compiled
/// against; it is logged and otherwise ignored.
pub fn initialize(
    runtime: &Runtime,
    ags_version: i32,
    context: Option<&mut Option<Box<Context>>>,
    gpu_info: Option<&mut GpuInfo600>,
) -> ReturnCode {
    trace!(ags_version = format_args!("{:#x}", ags_version), "Initialize");
    let (Some(slot), Some(gpu_info)) = (context, gpu_info) else {
        return ReturnCode::InvalidArgs;
    };

    let created = match create_into(runtime, slot) {
        Ok(created) => created,
        Err(e) => {
            warn!(error = %e, "Initialize failed");
            return e.code();
        }
    };

    *gpu_info = GpuInfo600 {
        driver_version: DRIVER_VERSION.as_ptr(),
        radeon_software_version: SOFTWARE_VERSION.as_ptr(),
        num_devices: created.device_count() as i32,
        devices: created.devices_ptr(),
    };
    *slot = Some(created);
    ReturnCode::Success
}

/// Destroy a context. `None` is a no-op.
pub fn deinitialize(context: Option<Box<Context>>) -> ReturnCode {
    drop(context);
    ReturnCode::Success
}

/// Packed version of the detected revision
pub fn get_version_number(runtime: &Runtime) -> i32 {
    let revision = runtime.revision();
    trace!(revision = %revision, "Version number query");
    revision.version().packed()
}

pub fn get_crossfire_gpu_count(context: Option<&Context>, gpu_count: Option<&mut i32>) -> ReturnCode {
    let (Some(_), Some(gpu_count)) = (context, gpu_count) else {
        return ReturnCode::InvalidArgs;
    };
    *gpu_count = 1;
    ReturnCode::Success
}

pub fn check_driver_version(version_reported: Option<&CStr>, version_required: u32) -> DriverVersionResult {
    static STUB: Once = Once::new();
    STUB.call_once(|| warn!("check_driver_version is a stub, every driver passes"));
    debug!(
        reported = ?version_reported,
        required = format_args!("{:#x}", version_required),
        "Driver version check"
    );
    DriverVersionResult::Ok
}

/// Report the DX11 driver extensions available on `device`. There are none.
pub fn dx11_init_extensions(
    context: Option<&Context>,
    device: *mut c_void,
    uav_slot: u32,
    extensions_supported: Option<&mut u32>,
) -> ReturnCode {
    let (Some(_), Some(extensions_supported)) = (context, extensions_supported) else {
        return ReturnCode::InvalidArgs;
    };
    debug!(device = ?device, uav_slot, "DX11 extension init");
    *extensions_supported = 0;
    ReturnCode::Success
}

/// Depth bounds, shape used before 5.3.0
pub fn dx11_set_depth_bounds(_context: Option<&Context>, enabled: bool, min_depth: f32, max_depth: f32) -> ReturnCode {
    static STUB: Once = Once::new();
    STUB.call_once(|| warn!(enabled, min_depth, max_depth, "Depth bounds not supported"));
    AgsError::ExtensionNotSupported.code()
}

/// Depth bounds, shape used from 5.3.0 on
pub fn dx11_set_depth_bounds_530(
    _context: Option<&Context>,
    device_context: *mut c_void,
    enabled: bool,
    min_depth: f32,
    max_depth: f32,
) -> ReturnCode {
    static STUB: Once = Once::new();
    STUB.call_once(|| {
        warn!(
            device_context = ?device_context,
            enabled,
            min_depth,
            max_depth,
            "Depth bounds not supported"
        )
    });
    AgsError::ExtensionNotSupported.code()
}

/// Depth bounds through whichever shape the context's revision uses.
///
/// `device_context` is only part of the 5.3.0 shape and is ignored before it.
pub fn dx11_set_depth_bounds_for(
    context: &Context,
    device_context: *mut c_void,
    enabled: bool,
    min_depth: f32,
    max_depth: f32,
) -> ReturnCode {
    if context.revision() >= Revision::V5_3_0 {
        dx11_set_depth_bounds_530(Some(context), device_context, enabled, min_depth, max_depth)
    } else {
        dx11_set_depth_bounds(Some(context), enabled, min_depth, max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tests::{runtime_with, single_adapter};
    use agshim_core::{make_version, Allocator, DisplayRect, TrackingAllocator, TARGET_VENDOR_ID};
    use agshim_discovery::{
        DisplayMode, DisplaySnapshot, FakeAdapter, FakeBackend, FixedFileInfoReader, FixedPathLocator,
        VersionDetector,
    };
    use std::ptr;
    use std::rc::Rc;
    use tempfile::TempDir;

    const RADEON: &str = "AMD Radeon RX 6800";
    const GEFORCE: &str = "NVIDIA GeForce RTX 3070";

    fn two_adapters() -> FakeBackend {
        FakeBackend::new(vec![
            FakeAdapter::new(RADEON, TARGET_VENDOR_ID, 0x73bf),
            FakeAdapter::new(GEFORCE, 0x10de, 0x2484),
        ])
    }

    fn tracked(runtime: Runtime) -> (Runtime, Rc<TrackingAllocator>) {
        let alloc = Rc::new(TrackingAllocator::new());
        let allocator: Rc<dyn Allocator> = alloc.clone();
        (runtime.with_allocator(allocator), alloc)
    }

    #[test]
    fn test_lifecycle_has_no_leaks_in_any_revision() {
        for rev in Revision::ALL {
            let (runtime, alloc) = tracked(runtime_with(two_adapters(), rev));

            let mut context = None;
            let mut info = GpuInfo511::default();
            assert_eq!(init(&runtime, Some(&mut context), Some(&mut info)), ReturnCode::Success);
            assert_eq!(info.num_devices, 2);
            assert_eq!(deinitialize(context.take()), ReturnCode::Success);
            assert_eq!(alloc.live_blocks(), 0, "legacy shape leaked in {}", rev);

            let mut info = GpuInfo600::default();
            assert_eq!(
                initialize(&runtime, make_version(6, 0, 0), Some(&mut context), Some(&mut info)),
                ReturnCode::Success
            );
            assert_eq!(deinitialize(context.take()), ReturnCode::Success);
            assert_eq!(alloc.live_blocks(), 0, "current shape leaked in {}", rev);
        }
    }

    #[test]
    fn test_legacy_info_reports_detected_version() {
        let runtime = runtime_with(single_adapter(), Revision::V5_2_1);
        let mut context = None;
        let mut info = GpuInfo511::default();
        assert_eq!(init(&runtime, Some(&mut context), Some(&mut info)), ReturnCode::Success);
        assert_eq!(
            (info.ags_version_major, info.ags_version_minor, info.ags_version_patch),
            (5, 2, 1)
        );
        let driver = unsafe { CStr::from_ptr(info.driver_version) };
        assert_eq!(driver, DRIVER_VERSION);
        let software = unsafe { CStr::from_ptr(info.radeon_software_version) };
        assert_eq!(software.to_str().unwrap(), "21.10.2");
        assert_eq!(info.devices, context.as_ref().unwrap().devices_ptr());
    }

    #[test]
    fn test_two_adapters_at_600() {
        let runtime = runtime_with(two_adapters(), Revision::V6_0_0);
        let mut context = None;
        let mut info = GpuInfo600::default();
        assert_eq!(
            initialize(&runtime, make_version(6, 0, 0), Some(&mut context), Some(&mut info)),
            ReturnCode::Success
        );
        assert_eq!(info.num_devices, 2);

        let context = context.unwrap();
        let adapters = context.adapters();
        assert_eq!(adapters[0].asic_family, Some(agshim_core::abi::ASIC_FAMILY_GCN4));
        assert!(adapters[0].is_primary);
        assert_eq!(adapters[1].asic_family, Some(0));
        assert!(!adapters[1].is_primary);

        // The primary flag is bit 1 of the flags word in this layout
        let first = context.enumeration().device(0).unwrap();
        let flags = first.as_bytes()[std::mem::offset_of!(agshim_core::abi::DeviceInfo600, flags)];
        assert_eq!(u32::from(flags) & agshim_core::abi::DEVICE_600_PRIMARY_BIT, 1 << 1);
    }

    #[test]
    fn test_zero_adapters_is_success() {
        let (runtime, alloc) = tracked(runtime_with(FakeBackend::new(Vec::new()), Revision::V5_4_0));
        let mut context = None;
        let mut info = GpuInfo600::default();
        assert_eq!(initialize(&runtime, 0, Some(&mut context), Some(&mut info)), ReturnCode::Success);
        assert_eq!(info.num_devices, 0);
        assert!(!info.devices.is_null());
        deinitialize(context);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn test_failures_leave_output_untouched() {
        let (runtime, alloc) = tracked(runtime_with(two_adapters(), Revision::V5_4_1));
        alloc.fail_after(2);
        let mut context = None;
        let mut info = GpuInfo511 {
            num_devices: 42,
            ..GpuInfo511::default()
        };
        assert_eq!(init(&runtime, Some(&mut context), Some(&mut info)), ReturnCode::OutOfMemory);
        assert!(context.is_none());
        assert_eq!(info.num_devices, 42);
        assert!(info.driver_version.is_null());
        assert_eq!(alloc.live_blocks(), 0);

        let runtime = runtime_with(FakeBackend::failing_enumeration(), Revision::V6_0_1);
        let mut info = GpuInfo600::default();
        assert_eq!(
            initialize(&runtime, 0, Some(&mut context), Some(&mut info)),
            ReturnCode::Failure
        );
        assert!(context.is_none());
        assert!(info.devices.is_null());
    }

    #[test]
    fn test_missing_arguments() {
        let runtime = runtime_with(single_adapter(), Revision::V6_0_0);
        let mut context = None;
        let mut info = GpuInfo600::default();
        assert_eq!(init(&runtime, None, Some(&mut GpuInfo511::default())), ReturnCode::InvalidArgs);
        assert_eq!(init(&runtime, Some(&mut context), None), ReturnCode::InvalidArgs);
        assert_eq!(initialize(&runtime, 0, None, Some(&mut info)), ReturnCode::InvalidArgs);
        assert_eq!(initialize(&runtime, 0, Some(&mut context), None), ReturnCode::InvalidArgs);
        assert_eq!(deinitialize(None), ReturnCode::Success);

        let mut count = 0;
        assert_eq!(get_crossfire_gpu_count(None, Some(&mut count)), ReturnCode::InvalidArgs);
    }

    #[test]
    fn test_live_context_is_not_reinitialized() {
        let (runtime, alloc) = tracked(runtime_with(single_adapter(), Revision::V6_0_0));
        let mut context = None;
        let mut info = GpuInfo600::default();
        assert_eq!(initialize(&runtime, 0, Some(&mut context), Some(&mut info)), ReturnCode::Success);
        let live = alloc.live_blocks();
        let devices = info.devices;

        assert_eq!(
            initialize(&runtime, 0, Some(&mut context), Some(&mut info)),
            ReturnCode::InvalidArgs
        );
        assert_eq!(alloc.live_blocks(), live);
        assert_eq!(info.devices, devices);
        deinitialize(context);
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn test_unmatched_monitor_still_initializes() {
        let displays = DisplaySnapshot::new().with_output(
            "DP-9",
            "Some Other Adapter",
            None,
            true,
            DisplayRect::default(),
            vec![DisplayMode {
                width: 1920,
                height: 1080,
                refresh_rate: 60.0,
            }],
            None,
        );
        let config = agshim_discovery::DetectorConfig {
            force_revision: Some(Revision::V6_0_0),
            ..Default::default()
        };
        let runtime = Runtime::new(
            Box::new(two_adapters()),
            Box::new(displays),
            VersionDetector::from_config(&config),
        );
        let context = Context::create(&runtime).unwrap();
        assert!(context.adapters().iter().all(|a| a.displays.is_empty()));
    }

    #[test]
    fn test_version_number_from_module() {
        // Fixed file info block: signature, struct version, then the version words
        let mut image = vec![0u8; 0x100];
        for (i, word) in [0xFEEF_04BDu32, 0x0001_0000, (5 << 16) | 4, 2 << 16]
            .iter()
            .enumerate()
        {
            image[0x40 + i * 4..0x44 + i * 4].copy_from_slice(&word.to_le_bytes());
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("amd_ags_x64.dll");
        std::fs::write(&path, &image).unwrap();

        let runtime = Runtime::new(
            Box::new(single_adapter()),
            Box::new(agshim_discovery::NoDisplays),
            VersionDetector::new(Box::new(FixedPathLocator(path)), Box::new(FixedFileInfoReader)),
        );
        assert_eq!(get_version_number(&runtime), make_version(5, 4, 2));

        let runtime = Runtime::new(
            Box::new(single_adapter()),
            Box::new(agshim_discovery::NoDisplays),
            VersionDetector::new(
                Box::new(FixedPathLocator(dir.path().join("missing.dll"))),
                Box::new(FixedFileInfoReader),
            ),
        );
        assert_eq!(get_version_number(&runtime), Revision::FALLBACK.version().packed());
    }

    #[test]
    fn test_extension_entry_points() {
        let runtime = runtime_with(single_adapter(), Revision::V5_2_0);
        let context = Context::create(&runtime).unwrap();

        let mut count = 0;
        assert_eq!(get_crossfire_gpu_count(Some(&*context), Some(&mut count)), ReturnCode::Success);
        assert_eq!(count, 1);

        let mut extensions = 7;
        assert_eq!(
            dx11_init_extensions(Some(&*context), ptr::null_mut(), 7, Some(&mut extensions)),
            ReturnCode::Success
        );
        assert_eq!(extensions, 0);

        assert_eq!(check_driver_version(Some(c"21.10.2"), 0), DriverVersionResult::Ok);
        assert_eq!(check_driver_version(None, 0), DriverVersionResult::Ok);

        assert_eq!(
            dx11_set_depth_bounds_for(&context, ptr::null_mut(), true, 0.0, 1.0),
            ReturnCode::ExtensionNotSupported
        );
        let runtime = runtime_with(single_adapter(), Revision::V5_3_0);
        let context = Context::create(&runtime).unwrap();
        assert_eq!(
            dx11_set_depth_bounds_for(&context, ptr::null_mut(), false, 0.0, 1.0),
            ReturnCode::ExtensionNotSupported
        );
    }
}
