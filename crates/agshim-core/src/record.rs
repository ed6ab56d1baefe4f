//! Checked typed access to opaque device records
//!
//! A device record is a fixed-size byte block whose layout depends on the
//! active revision. These views pair such a block with its revision and route
//! every access through the layout table, so callers never compute offsets.

use bytemuck::{bytes_of, pod_read_unaligned, Pod};
use std::mem::size_of;

use crate::error::LayoutError;
use crate::layout::{self, DeviceField, Placement};
use crate::revision::Revision;

/// Plain values that can be stored in a device record field
pub trait FieldValue: Pod {
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_field_value {
    ($($t:ty),*) => {
        $(
            impl FieldValue for $t {
                fn to_bits(self) -> u64 {
                    self as u64
                }

                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }
        )*
    };
}

impl_field_value!(i32, u32, i64, u64, usize);

fn check_width<T>(field: DeviceField) -> Result<(), LayoutError> {
    let expected = field.kind().width();
    let actual = size_of::<T>();
    if expected == actual {
        Ok(())
    } else {
        Err(LayoutError::WidthMismatch {
            field: field.name(),
            expected,
            actual,
        })
    }
}

fn span(field: DeviceField, offset: usize, record_len: usize) -> Result<std::ops::Range<usize>, LayoutError> {
    let end = offset + field.kind().width();
    if end > record_len {
        return Err(LayoutError::OutOfBounds {
            field: field.name(),
            offset,
            record_len,
        });
    }
    Ok(offset..end)
}

fn read<T: FieldValue>(bytes: &[u8], revision: Revision, field: DeviceField) -> Result<Option<T>, LayoutError> {
    check_width::<T>(field)?;
    match layout::placement(field, revision) {
        Placement::Absent => Ok(None),
        Placement::Offset(offset) => {
            let range = span(field, offset, bytes.len())?;
            Ok(Some(pod_read_unaligned(&bytes[range])))
        }
        Placement::Custom(accessor) => Ok(Some(T::from_bits((accessor.read)(bytes)))),
    }
}

/// Read-only view of one device record
#[derive(Debug, Clone, Copy)]
pub struct DeviceRecord<'a> {
    bytes: &'a [u8],
    revision: Revision,
}

impl<'a> DeviceRecord<'a> {
    /// View the first record-sized chunk of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than one record of `revision`.
    pub fn new(bytes: &'a [u8], revision: Revision) -> Option<Self> {
        let bytes = bytes.get(..revision.record_size())?;
        Some(Self { bytes, revision })
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Read `field`. `Ok(None)` when the field is absent in this revision.
    pub fn get<T: FieldValue>(&self, field: DeviceField) -> Result<Option<T>, LayoutError> {
        read(self.bytes, self.revision, field)
    }
}

/// Mutable view of one device record
#[derive(Debug)]
pub struct DeviceRecordMut<'a> {
    bytes: &'a mut [u8],
    revision: Revision,
}

impl<'a> DeviceRecordMut<'a> {
    pub fn new(bytes: &'a mut [u8], revision: Revision) -> Option<Self> {
        let bytes = bytes.get_mut(..revision.record_size())?;
        Some(Self { bytes, revision })
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn as_record(&self) -> DeviceRecord<'_> {
        DeviceRecord {
            bytes: &self.bytes[..],
            revision: self.revision,
        }
    }

    pub fn get<T: FieldValue>(&self, field: DeviceField) -> Result<Option<T>, LayoutError> {
        read(self.bytes, self.revision, field)
    }

    /// Write `field`.
    ///
    /// Writing a field absent in this revision is a silent no-op and returns
    /// `Ok(false)`; the record is left untouched.
    pub fn set<T: FieldValue>(&mut self, field: DeviceField, value: T) -> Result<bool, LayoutError> {
        check_width::<T>(field)?;
        match layout::placement(field, self.revision) {
            Placement::Absent => Ok(false),
            Placement::Offset(offset) => {
                let range = span(field, offset, self.bytes.len())?;
                self.bytes[range].copy_from_slice(bytes_of(&value));
                Ok(true)
            }
            Placement::Custom(accessor) => {
                (accessor.write)(self.bytes, value.to_bits());
                Ok(true)
            }
        }
    }

    /// Raw bytes backing `field`, when it is addressable by offset
    pub fn field_bytes_mut(&mut self, field: DeviceField) -> Option<&mut [u8]> {
        let offset = layout::offset_of(field, self.revision)?;
        let range = span(field, offset, self.bytes.len()).ok()?;
        Some(&mut self.bytes[range])
    }
}

/// Iterate over read-only records packed in `bytes`
pub fn records(bytes: &[u8], revision: Revision) -> impl Iterator<Item = DeviceRecord<'_>> {
    bytes
        .chunks_exact(revision.record_size())
        .map(move |chunk| DeviceRecord { bytes: chunk, revision })
}

/// Iterate over mutable records packed in `bytes`
pub fn records_mut(bytes: &mut [u8], revision: Revision) -> impl Iterator<Item = DeviceRecordMut<'_>> {
    bytes
        .chunks_exact_mut(revision.record_size())
        .map(move |chunk| DeviceRecordMut { bytes: chunk, revision })
}
