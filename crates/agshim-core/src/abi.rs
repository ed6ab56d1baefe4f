//! C layouts of the vendor structures, one per published binary release
//!
//! The device and display layouts here are never constructed by the shim. They
//! exist so the layout table and the display codec can be generated with
//! `offset_of!`/`size_of` instead of hand-maintained byte numbers. Records are
//! written through [`crate::record::DeviceRecordMut`] views over raw blocks.
//!
//! The public info shapes ([`GpuInfo511`], [`GpuInfo600`]) are the caller-owned
//! output buffers of the two historical init entry points.

use bytemuck::{Pod, Zeroable};
use std::ffi::{c_char, c_void};
use std::ptr;

/// Architecture tag used by releases up to 5.3.0
pub const ARCHITECTURE_GCN: i32 = 1;

/// Asic family tag used from 5.4.0 onwards
pub const ASIC_FAMILY_GCN4: i32 = 5;

/// `isPrimaryDevice` bit inside [`DeviceInfo600::flags`]
pub const DEVICE_600_PRIMARY_BIT: u32 = 1 << 1;

/// `isPrimaryDisplay` bit inside [`DisplayInfo600::flags`]
pub const DISPLAY_600_PRIMARY_BIT: u32 = 1 << 0;

#[repr(C)]
pub struct DeviceInfo511 {
    pub architecture_version: i32,
    pub adapter_string: *const c_char,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub tera_flops: f32,
    pub is_primary_device: i32,
    pub local_memory_in_bytes: i64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
}

/// Shared by 5.2.0, 5.2.1 and 5.3.0
#[repr(C)]
pub struct DeviceInfo520 {
    pub adapter_string: *const c_char,
    pub architecture_version: i32,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub num_rops: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub memory_bandwidth: i32,
    pub tera_flops: f32,
    pub is_primary_device: i32,
    pub local_memory_in_bytes: i64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

#[repr(C)]
pub struct DeviceInfo540 {
    pub adapter_string: *const c_char,
    pub asic_family: i32,
    pub is_apu: i32,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub num_rops: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub memory_bandwidth: i32,
    pub tera_flops: f32,
    pub is_primary_device: i32,
    pub local_memory_in_bytes: i64,
    pub shared_memory_in_bytes: i64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

#[repr(C)]
pub struct DeviceInfo541 {
    pub adapter_string: *const c_char,
    pub asic_family: i32,
    pub is_apu: i32,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub num_wgps: i32,
    pub num_rops: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub memory_bandwidth: i32,
    pub tera_flops: f32,
    pub is_primary_device: i32,
    pub local_memory_in_bytes: i64,
    pub shared_memory_in_bytes: i64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

#[repr(C)]
pub struct DeviceInfo542 {
    pub adapter_string: *const c_char,
    pub asic_family: i32,
    pub is_apu: i32,
    pub is_external: i32,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub num_wgps: i32,
    pub num_rops: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub memory_bandwidth: i32,
    pub tera_flops: f32,
    pub is_primary_device: i32,
    pub local_memory_in_bytes: i64,
    pub shared_memory_in_bytes: i64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

/// Shared by 6.0.0 and 6.0.1.
///
/// `flags` is the C bitfield word: bit 0 `isAPU`, bit 1 `isPrimaryDevice`,
/// bit 2 `isExternal`, remaining bits reserved.
#[repr(C)]
pub struct DeviceInfo600 {
    pub adapter_string: *const c_char,
    pub asic_family: i32,
    pub flags: u32,
    pub vendor_id: i32,
    pub device_id: i32,
    pub revision_id: i32,
    pub num_cus: i32,
    pub num_wgps: i32,
    pub num_rops: i32,
    pub core_clock: i32,
    pub memory_clock: i32,
    pub memory_bandwidth: i32,
    pub tera_flops: f32,
    pub local_memory_in_bytes: u64,
    pub shared_memory_in_bytes: u64,
    pub num_displays: i32,
    pub displays: *mut c_void,
    pub eyefinity_enabled: i32,
    pub eyefinity_grid_width: i32,
    pub eyefinity_grid_height: i32,
    pub eyefinity_resolution_x: i32,
    pub eyefinity_resolution_y: i32,
    pub eyefinity_bezel_compensated: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rect {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: i32,
    pub height: i32,
}

pub const DISPLAY_NAME_LEN: usize = 256;
pub const DISPLAY_DEVICE_NAME_LEN: usize = 32;

/// Native display layout, used from 6.0.0 onwards
#[repr(C)]
pub struct DisplayInfo600 {
    pub name: [c_char; DISPLAY_NAME_LEN],
    pub display_device_name: [c_char; DISPLAY_DEVICE_NAME_LEN],
    pub flags: u32,
    pub max_resolution_x: i32,
    pub max_resolution_y: i32,
    pub max_refresh_rate: f32,
    pub current_resolution: Rect,
    pub visible_resolution: Rect,
    pub current_refresh_rate: f32,
    pub eyefinity_grid_coord_x: i32,
    pub eyefinity_grid_coord_y: i32,
    pub chromaticity_red_x: f64,
    pub chromaticity_red_y: f64,
    pub chromaticity_green_x: f64,
    pub chromaticity_green_y: f64,
    pub chromaticity_blue_x: f64,
    pub chromaticity_blue_y: f64,
    pub chromaticity_white_point_x: f64,
    pub chromaticity_white_point_y: f64,
    pub screen_diffuse_reflectance: f64,
    pub screen_specular_reflectance: f64,
    pub min_luminance: f64,
    pub max_luminance: f64,
    pub avg_luminance: f64,
    pub logical_display_index: i32,
    pub adl_adapter_index: i32,
    pub reserved: i32,
}

/// Legacy display layout. Byte-for-byte a prefix of [`DisplayInfo600`].
#[repr(C)]
pub struct DisplayInfo511 {
    pub name: [c_char; DISPLAY_NAME_LEN],
    pub display_device_name: [c_char; DISPLAY_DEVICE_NAME_LEN],
    pub is_primary_display: i32,
    pub max_resolution_x: i32,
    pub max_resolution_y: i32,
    pub max_refresh_rate: f32,
    pub current_resolution: Rect,
    pub visible_resolution: Rect,
    pub current_refresh_rate: f32,
    pub eyefinity_grid_coord_x: i32,
    pub eyefinity_grid_coord_y: i32,
}

#[repr(C)]
pub struct Dx11ReturnedParams511 {
    pub device: *mut c_void,
    pub immediate_context: *mut c_void,
    pub swap_chain: *mut c_void,
    pub feature_level: u32,
    pub extensions_supported: u32,
}

/// Shared by 5.2.0 through 5.4.2
#[repr(C)]
pub struct Dx11ReturnedParams520 {
    pub device: *mut c_void,
    pub immediate_context: *mut c_void,
    pub swap_chain: *mut c_void,
    pub feature_level: u32,
    pub extensions_supported: u32,
    pub crossfire_gpu_count: u32,
    pub breadcrumb_buffer: *mut c_void,
}

#[repr(C)]
pub struct Dx11ReturnedParams600 {
    pub device: *mut c_void,
    pub immediate_context: *mut c_void,
    pub swap_chain: *mut c_void,
    pub feature_level: u32,
    pub extensions_supported: u32,
    pub crossfire_gpu_count: u32,
}

/// Output of the legacy init entry point
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GpuInfo511 {
    pub ags_version_major: i32,
    pub ags_version_minor: i32,
    pub ags_version_patch: i32,
    pub is_workstation: i32,
    pub driver_version: *const c_char,
    pub radeon_software_version: *const c_char,
    pub num_devices: i32,
    pub devices: *mut c_void,
}

impl Default for GpuInfo511 {
    fn default() -> Self {
        Self {
            ags_version_major: 0,
            ags_version_minor: 0,
            ags_version_patch: 0,
            is_workstation: 0,
            driver_version: ptr::null(),
            radeon_software_version: ptr::null(),
            num_devices: 0,
            devices: ptr::null_mut(),
        }
    }
}

/// Output of the revision-agnostic init entry point
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GpuInfo600 {
    pub driver_version: *const c_char,
    pub radeon_software_version: *const c_char,
    pub num_devices: i32,
    pub devices: *mut c_void,
}

impl Default for GpuInfo600 {
    fn default() -> Self {
        Self {
            driver_version: ptr::null(),
            radeon_software_version: ptr::null(),
            num_devices: 0,
            devices: ptr::null_mut(),
        }
    }
}
