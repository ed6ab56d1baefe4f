//! Per-adapter display scan
//!
//! Every OS monitor is cross-referenced against the display device list. A
//! device contributes a display when it is driven by the adapter being
//! scanned and is the device the monitor is bound to. Records are built in
//! the native layout into an array grown one slot at a time.

use agshim_core::display::truncate_into_legacy;
use agshim_core::{Allocator, Block, DisplayAbi, DisplayRecord};
use tracing::{debug, trace, warn};

use crate::display_source::{DisplayDevice, DisplayError, DisplaySource, MonitorInfo};

/// Name reported for a monitor the OS cannot name
pub const UNKNOWN_MONITOR: &str = "Unknown";

/// Native-layout display array for one adapter
#[derive(Debug, Default)]
pub struct DisplayScan {
    /// `None` when no display matched
    pub block: Option<Block>,
    pub count: usize,
}

pub struct DisplayScanner<'a> {
    source: &'a dyn DisplaySource,
    allocator: &'a dyn Allocator,
}

impl<'a> DisplayScanner<'a> {
    pub fn new(source: &'a dyn DisplaySource, allocator: &'a dyn Allocator) -> Self {
        Self { source, allocator }
    }

    /// Collect the displays driven by `adapter`.
    ///
    /// Failures are not fatal: a failed OS query or a failed array growth
    /// stops the scan and keeps the displays accumulated so far.
    pub fn scan(&self, adapter: &str) -> DisplayScan {
        let mut scan = DisplayScan::default();

        let monitors = match self.source.monitors() {
            Ok(monitors) => monitors,
            Err(e) => {
                warn!(adapter = %adapter, error = %e, "Monitor enumeration failed");
                return scan;
            }
        };
        let devices = match self.source.display_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(adapter = %adapter, error = %e, "Display device enumeration failed");
                return scan;
            }
        };

        for monitor in &monitors {
            trace!(device = %monitor.device_name, "Checking monitor");
            for device in devices
                .iter()
                .filter(|d| d.adapter == adapter && d.name == monitor.device_name)
            {
                let record = match self.build_record(monitor, device) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(device = %device.name, error = %e, "Display query failed, stopping scan");
                        return scan;
                    }
                };
                if let Err(e) = self.push(&mut scan, &record) {
                    warn!(device = %device.name, error = %e, "Could not grow display array");
                    return scan;
                }
                debug!(device = %device.name, adapter = %adapter, "Added display");
            }
        }
        scan
    }

    fn push(&self, scan: &mut DisplayScan, record: &DisplayRecord) -> Result<(), agshim_core::AllocError> {
        let size = DisplayAbi::Native.record_size();
        let needed = (scan.count + 1) * size;
        match scan.block.as_mut() {
            Some(block) => self.allocator.grow(block, needed)?,
            None => scan.block = Some(self.allocator.allocate(needed)?),
        }
        if let Some(block) = scan.block.as_mut() {
            record.encode_native(&mut block.as_bytes_mut()[scan.count * size..]);
            scan.count += 1;
        }
        Ok(())
    }

    fn build_record(&self, monitor: &MonitorInfo, device: &DisplayDevice) -> Result<DisplayRecord, DisplayError> {
        let name = self.source.monitor_name(&device.name).unwrap_or_else(|| {
            debug!(device = %device.name, "No monitor name reported");
            UNKNOWN_MONITOR.to_string()
        });

        let mut record = DisplayRecord {
            name,
            display_device_name: device.name.clone(),
            is_primary: monitor.primary,
            current_resolution: monitor.rect,
            visible_resolution: monitor.rect,
            ..DisplayRecord::default()
        };

        for mode in self.source.modes(&monitor.device_name)? {
            record.max_resolution_x = record.max_resolution_x.max(mode.width);
            record.max_resolution_y = record.max_resolution_y.max(mode.height);
            record.max_refresh_rate = record.max_refresh_rate.max(mode.refresh_rate);
        }

        match self.source.current_mode(&monitor.device_name) {
            Ok(mode) => record.current_refresh_rate = mode.refresh_rate,
            Err(e) => warn!(device = %device.name, error = %e, "Could not get current display settings"),
        }
        Ok(record)
    }

    /// Legacy-layout copy of the first `count` records of a native array.
    ///
    /// `None` if the copy cannot be allocated.
    pub fn truncate_to_legacy(&self, native: &Block, count: usize) -> Option<Block> {
        let mut legacy = match self.allocator.allocate(count * DisplayAbi::Legacy.record_size()) {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Could not allocate legacy display array");
                return None;
            }
        };
        let copied = truncate_into_legacy(native.as_bytes(), legacy.as_bytes_mut());
        debug_assert_eq!(copied, count);
        Some(legacy)
    }
}
