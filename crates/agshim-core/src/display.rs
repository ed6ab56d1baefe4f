//! Display records and their two binary layouts
//!
//! Releases before 6.0.0 use a display layout that is a strict prefix of the
//! 6.0.0 one. Displays are always built in the native layout and legacy
//! callers receive field-truncated copies.

use bytemuck::{bytes_of, pod_read_unaligned, Pod};
use serde::Serialize;
use std::mem::{offset_of, size_of};

use crate::abi::{
    DisplayInfo511, DisplayInfo600, Rect, DISPLAY_600_PRIMARY_BIT, DISPLAY_DEVICE_NAME_LEN,
    DISPLAY_NAME_LEN,
};

/// Which display layout a caller expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayAbi {
    /// Truncated layout used before 6.0.0
    Legacy,
    /// Full layout used from 6.0.0 onwards
    Native,
}

impl DisplayAbi {
    pub const fn record_size(self) -> usize {
        match self {
            DisplayAbi::Legacy => size_of::<DisplayInfo511>(),
            DisplayAbi::Native => size_of::<DisplayInfo600>(),
        }
    }
}

/// Position and size of a display area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisplayRect {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<DisplayRect> for Rect {
    fn from(r: DisplayRect) -> Self {
        Rect {
            offset_x: r.offset_x,
            offset_y: r.offset_y,
            width: r.width,
            height: r.height,
        }
    }
}

/// One monitor attached to an adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayRecord {
    /// Monitor name, `"Unknown"` when the OS does not report one
    pub name: String,
    /// OS display device the monitor is bound to
    pub display_device_name: String,
    pub is_primary: bool,
    pub max_resolution_x: i32,
    pub max_resolution_y: i32,
    pub max_refresh_rate: f32,
    pub current_resolution: DisplayRect,
    pub visible_resolution: DisplayRect,
    pub current_refresh_rate: f32,
}

const NAME: usize = offset_of!(DisplayInfo600, name);
const DEVICE_NAME: usize = offset_of!(DisplayInfo600, display_device_name);
const FLAGS: usize = offset_of!(DisplayInfo600, flags);
const MAX_X: usize = offset_of!(DisplayInfo600, max_resolution_x);
const MAX_Y: usize = offset_of!(DisplayInfo600, max_resolution_y);
const MAX_REFRESH: usize = offset_of!(DisplayInfo600, max_refresh_rate);
const CURRENT: usize = offset_of!(DisplayInfo600, current_resolution);
const VISIBLE: usize = offset_of!(DisplayInfo600, visible_resolution);
const CURRENT_REFRESH: usize = offset_of!(DisplayInfo600, current_refresh_rate);

fn put<T: Pod>(out: &mut [u8], offset: usize, value: T) {
    out[offset..offset + size_of::<T>()].copy_from_slice(bytes_of(&value));
}

fn take<T: Pod>(bytes: &[u8], offset: usize) -> T {
    pod_read_unaligned(&bytes[offset..offset + size_of::<T>()])
}

/// Copy `s` into a fixed char array, truncating and always NUL-terminating
fn put_str(out: &mut [u8], offset: usize, capacity: usize, s: &str) {
    let slot = &mut out[offset..offset + capacity];
    slot.fill(0);
    let len = s.len().min(capacity - 1);
    slot[..len].copy_from_slice(&s.as_bytes()[..len]);
}

fn take_str(bytes: &[u8], offset: usize, capacity: usize) -> String {
    let slot = &bytes[offset..offset + capacity];
    let end = slot.iter().position(|b| *b == 0).unwrap_or(capacity);
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

fn put_rect(out: &mut [u8], offset: usize, rect: DisplayRect) {
    put(out, offset, Rect::from(rect));
}

fn take_rect(bytes: &[u8], offset: usize) -> DisplayRect {
    let r: Rect = take(bytes, offset);
    DisplayRect {
        offset_x: r.offset_x,
        offset_y: r.offset_y,
        width: r.width,
        height: r.height,
    }
}

impl DisplayRecord {
    /// Write this record into one native-layout slot.
    ///
    /// `out` must be at least [`DisplayAbi::Native`] record size; fields the
    /// shim does not report are zeroed.
    pub fn encode_native(&self, out: &mut [u8]) {
        let out = &mut out[..DisplayAbi::Native.record_size()];
        out.fill(0);
        put_str(out, NAME, DISPLAY_NAME_LEN, &self.name);
        put_str(out, DEVICE_NAME, DISPLAY_DEVICE_NAME_LEN, &self.display_device_name);
        if self.is_primary {
            put(out, FLAGS, DISPLAY_600_PRIMARY_BIT);
        }
        put(out, MAX_X, self.max_resolution_x);
        put(out, MAX_Y, self.max_resolution_y);
        put(out, MAX_REFRESH, self.max_refresh_rate);
        put_rect(out, CURRENT, self.current_resolution);
        put_rect(out, VISIBLE, self.visible_resolution);
        put(out, CURRENT_REFRESH, self.current_refresh_rate);
    }

    /// Read a record back from a slot of either layout
    pub fn decode(bytes: &[u8], abi: DisplayAbi) -> Option<Self> {
        let bytes = bytes.get(..abi.record_size())?;
        let flags: u32 = take(bytes, FLAGS);
        Some(Self {
            name: take_str(bytes, NAME, DISPLAY_NAME_LEN),
            display_device_name: take_str(bytes, DEVICE_NAME, DISPLAY_DEVICE_NAME_LEN),
            is_primary: flags & DISPLAY_600_PRIMARY_BIT != 0,
            max_resolution_x: take(bytes, MAX_X),
            max_resolution_y: take(bytes, MAX_Y),
            max_refresh_rate: take(bytes, MAX_REFRESH),
            current_resolution: take_rect(bytes, CURRENT),
            visible_resolution: take_rect(bytes, VISIBLE),
            current_refresh_rate: take(bytes, CURRENT_REFRESH),
        })
    }
}

/// Copy the legacy prefix of each native record in `native` into `legacy`.
///
/// Returns the number of records copied.
pub fn truncate_into_legacy(native: &[u8], legacy: &mut [u8]) -> usize {
    let native_size = DisplayAbi::Native.record_size();
    let legacy_size = DisplayAbi::Legacy.record_size();

    let mut copied = 0;
    for (src, dst) in native
        .chunks_exact(native_size)
        .zip(legacy.chunks_exact_mut(legacy_size))
    {
        dst.copy_from_slice(&src[..legacy_size]);
        copied += 1;
    }
    copied
}
