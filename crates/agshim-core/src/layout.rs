//! Per-field layout table for device records
//!
//! Each logical field of a device record maps to a placement per revision:
//! a byte offset, absence, or a custom accessor for the one field that cannot
//! be addressed by offset. Offsets are generated from the `#[repr(C)]` shapes
//! in [`crate::abi`].
//!
//! Fields that moved or changed:
//! - `architectureVersion` exists up to 5.3.0 and was replaced by `asicFamily`
//! - `isPrimaryDevice` became a one-bit bitfield in 6.0.0, so it is reached
//!   through a [`CustomAccessor`] instead of an offset

use bytemuck::{bytes_of, pod_read_unaligned};
use std::mem::{offset_of, size_of};

use crate::abi::{
    DeviceInfo511, DeviceInfo520, DeviceInfo540, DeviceInfo541, DeviceInfo542, DeviceInfo600,
    DEVICE_600_PRIMARY_BIT,
};
use crate::revision::Revision;

/// Logical fields of a device record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceField {
    AdapterString,
    ArchitectureVersion,
    AsicFamily,
    VendorId,
    DeviceId,
    IsPrimaryDevice,
    LocalMemoryInBytes,
    NumDisplays,
    Displays,
}

/// Storage class of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int32,
    Int64,
    Pointer,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::Int32 => 4,
            FieldKind::Int64 => 8,
            FieldKind::Pointer => size_of::<usize>(),
        }
    }
}

impl DeviceField {
    pub const COUNT: usize = 9;

    pub const ALL: [DeviceField; DeviceField::COUNT] = [
        DeviceField::AdapterString,
        DeviceField::ArchitectureVersion,
        DeviceField::AsicFamily,
        DeviceField::VendorId,
        DeviceField::DeviceId,
        DeviceField::IsPrimaryDevice,
        DeviceField::LocalMemoryInBytes,
        DeviceField::NumDisplays,
        DeviceField::Displays,
    ];

    /// Field name as spelled in the vendor header
    pub const fn name(self) -> &'static str {
        match self {
            DeviceField::AdapterString => "adapterString",
            DeviceField::ArchitectureVersion => "architectureVersion",
            DeviceField::AsicFamily => "asicFamily",
            DeviceField::VendorId => "vendorId",
            DeviceField::DeviceId => "deviceId",
            DeviceField::IsPrimaryDevice => "isPrimaryDevice",
            DeviceField::LocalMemoryInBytes => "localMemoryInBytes",
            DeviceField::NumDisplays => "numDisplays",
            DeviceField::Displays => "displays",
        }
    }

    pub const fn kind(self) -> FieldKind {
        match self {
            DeviceField::AdapterString | DeviceField::Displays => FieldKind::Pointer,
            DeviceField::LocalMemoryInBytes => FieldKind::Int64,
            _ => FieldKind::Int32,
        }
    }
}

/// Read/write functions for a field with no addressable offset
#[derive(Debug, Clone, Copy)]
pub struct CustomAccessor {
    pub read: fn(&[u8]) -> u64,
    pub write: fn(&mut [u8], u64),
}

/// Where a field lives in one revision's record
#[derive(Debug, Clone, Copy)]
pub enum Placement {
    Absent,
    Offset(usize),
    Custom(CustomAccessor),
}

struct FieldDescriptor {
    field: DeviceField,
    placements: [Placement; Revision::COUNT],
}

const X: Placement = Placement::Absent;

macro_rules! at {
    ($layout:ty, $name:ident) => {
        Placement::Offset(offset_of!($layout, $name))
    };
}

macro_rules! every_release {
    ($name:ident) => {
        [
            at!(DeviceInfo511, $name),
            at!(DeviceInfo520, $name),
            at!(DeviceInfo520, $name),
            at!(DeviceInfo520, $name),
            at!(DeviceInfo540, $name),
            at!(DeviceInfo541, $name),
            at!(DeviceInfo542, $name),
            at!(DeviceInfo600, $name),
            at!(DeviceInfo600, $name),
        ]
    };
}

macro_rules! up_to_530 {
    ($name:ident) => {
        [
            at!(DeviceInfo511, $name),
            at!(DeviceInfo520, $name),
            at!(DeviceInfo520, $name),
            at!(DeviceInfo520, $name),
            X,
            X,
            X,
            X,
            X,
        ]
    };
}

macro_rules! from_540 {
    ($name:ident) => {
        [
            X,
            X,
            X,
            X,
            at!(DeviceInfo540, $name),
            at!(DeviceInfo541, $name),
            at!(DeviceInfo542, $name),
            at!(DeviceInfo600, $name),
            at!(DeviceInfo600, $name),
        ]
    };
}

const PRIMARY_600: Placement = Placement::Custom(CustomAccessor {
    read: read_primary_600,
    write: write_primary_600,
});

// Order must follow DeviceField declaration order.
static DEVICE_FIELDS: [FieldDescriptor; DeviceField::COUNT] = [
    FieldDescriptor {
        field: DeviceField::AdapterString,
        placements: every_release!(adapter_string),
    },
    FieldDescriptor {
        field: DeviceField::ArchitectureVersion,
        placements: up_to_530!(architecture_version),
    },
    FieldDescriptor {
        field: DeviceField::AsicFamily,
        placements: from_540!(asic_family),
    },
    FieldDescriptor {
        field: DeviceField::VendorId,
        placements: every_release!(vendor_id),
    },
    FieldDescriptor {
        field: DeviceField::DeviceId,
        placements: every_release!(device_id),
    },
    FieldDescriptor {
        field: DeviceField::IsPrimaryDevice,
        placements: [
            at!(DeviceInfo511, is_primary_device),
            at!(DeviceInfo520, is_primary_device),
            at!(DeviceInfo520, is_primary_device),
            at!(DeviceInfo520, is_primary_device),
            at!(DeviceInfo540, is_primary_device),
            at!(DeviceInfo541, is_primary_device),
            at!(DeviceInfo542, is_primary_device),
            PRIMARY_600,
            PRIMARY_600,
        ],
    },
    FieldDescriptor {
        field: DeviceField::LocalMemoryInBytes,
        placements: every_release!(local_memory_in_bytes),
    },
    FieldDescriptor {
        field: DeviceField::NumDisplays,
        placements: every_release!(num_displays),
    },
    FieldDescriptor {
        field: DeviceField::Displays,
        placements: every_release!(displays),
    },
];

const FLAGS_600: usize = offset_of!(DeviceInfo600, flags);

fn read_flags_600(record: &[u8]) -> u32 {
    record
        .get(FLAGS_600..FLAGS_600 + 4)
        .map(pod_read_unaligned::<u32>)
        .unwrap_or(0)
}

fn read_primary_600(record: &[u8]) -> u64 {
    u64::from(read_flags_600(record) & DEVICE_600_PRIMARY_BIT != 0)
}

fn write_primary_600(record: &mut [u8], value: u64) {
    let mut flags = read_flags_600(record);
    if value != 0 {
        flags |= DEVICE_600_PRIMARY_BIT;
    } else {
        flags &= !DEVICE_600_PRIMARY_BIT;
    }
    if let Some(slot) = record.get_mut(FLAGS_600..FLAGS_600 + 4) {
        slot.copy_from_slice(bytes_of(&flags));
    }
}

/// Placement of `field` in records of `revision`
pub fn placement(field: DeviceField, revision: Revision) -> Placement {
    let descriptor = &DEVICE_FIELDS[field as usize];
    debug_assert_eq!(descriptor.field, field);
    descriptor.placements[revision.index()]
}

/// Byte offset of `field` in records of `revision`.
///
/// `None` when the field does not exist in that revision, or when it can only
/// be reached through a custom accessor.
pub fn offset_of(field: DeviceField, revision: Revision) -> Option<usize> {
    match placement(field, revision) {
        Placement::Offset(offset) => Some(offset),
        Placement::Absent | Placement::Custom(_) => None,
    }
}

/// Whether `field` can be read or written at all in `revision`
pub fn is_present(field: DeviceField, revision: Revision) -> bool {
    !matches!(placement(field, revision), Placement::Absent)
}
