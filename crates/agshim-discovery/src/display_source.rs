//! OS display enumeration
//!
//! A [`DisplaySource`] answers the handful of questions the display scan asks
//! of the operating system: which monitors exist, which display devices exist
//! and which adapter drives each one, and what modes a device supports.
//! [`DisplaySnapshot`] is a plain-data answer to all of them, captured once.

use agshim_core::DisplayRect;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Display enumeration unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown display device {0}")]
    UnknownDevice(String),
    #[error("No current mode for display device {0}")]
    NoCurrentMode(String),
}

/// A monitor as reported by the OS
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorInfo {
    /// Display device the monitor is bound to
    pub device_name: String,
    pub primary: bool,
    /// Desktop area covered by the monitor
    pub rect: DisplayRect,
}

/// A display device and the adapter driving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayDevice {
    pub name: String,
    /// Descriptive adapter string, compared against adapter names
    pub adapter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayMode {
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
}

pub trait DisplaySource {
    fn monitors(&self) -> Result<Vec<MonitorInfo>, DisplayError>;

    fn display_devices(&self) -> Result<Vec<DisplayDevice>, DisplayError>;

    /// Human-readable name of the monitor attached to `device`, if known
    fn monitor_name(&self, device: &str) -> Option<String>;

    /// Every mode `device` supports
    fn modes(&self, device: &str) -> Result<Vec<DisplayMode>, DisplayError>;

    fn current_mode(&self, device: &str) -> Result<DisplayMode, DisplayError>;
}

/// Source used when display enumeration is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplays;

impl DisplaySource for NoDisplays {
    fn monitors(&self) -> Result<Vec<MonitorInfo>, DisplayError> {
        Ok(Vec::new())
    }

    fn display_devices(&self) -> Result<Vec<DisplayDevice>, DisplayError> {
        Ok(Vec::new())
    }

    fn monitor_name(&self, _device: &str) -> Option<String> {
        None
    }

    fn modes(&self, device: &str) -> Result<Vec<DisplayMode>, DisplayError> {
        Err(DisplayError::UnknownDevice(device.to_string()))
    }

    fn current_mode(&self, device: &str) -> Result<DisplayMode, DisplayError> {
        Err(DisplayError::UnknownDevice(device.to_string()))
    }
}

/// Captured display state
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplaySnapshot {
    pub monitors: Vec<MonitorInfo>,
    pub devices: Vec<DisplayDevice>,
    pub monitor_names: HashMap<String, String>,
    pub modes: HashMap<String, Vec<DisplayMode>>,
    pub current: HashMap<String, DisplayMode>,
}

impl DisplaySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a display device driven by `adapter` with one monitor attached.
    ///
    /// `modes` lists every supported mode; `current` is the active one and is
    /// added to the mode list if missing.
    #[allow(clippy::too_many_arguments)]
    pub fn with_output(
        mut self,
        device: &str,
        adapter: &str,
        monitor_name: Option<&str>,
        primary: bool,
        rect: DisplayRect,
        modes: Vec<DisplayMode>,
        current: Option<DisplayMode>,
    ) -> Self {
        self.devices.push(DisplayDevice {
            name: device.to_string(),
            adapter: adapter.to_string(),
        });
        self.monitors.push(MonitorInfo {
            device_name: device.to_string(),
            primary,
            rect,
        });
        if let Some(name) = monitor_name {
            self.monitor_names.insert(device.to_string(), name.to_string());
        }
        let mut modes = modes;
        if let Some(mode) = current {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
            self.current.insert(device.to_string(), mode);
        }
        self.modes.insert(device.to_string(), modes);
        self
    }
}

impl DisplaySource for DisplaySnapshot {
    fn monitors(&self) -> Result<Vec<MonitorInfo>, DisplayError> {
        Ok(self.monitors.clone())
    }

    fn display_devices(&self) -> Result<Vec<DisplayDevice>, DisplayError> {
        Ok(self.devices.clone())
    }

    fn monitor_name(&self, device: &str) -> Option<String> {
        self.monitor_names.get(device).cloned()
    }

    fn modes(&self, device: &str) -> Result<Vec<DisplayMode>, DisplayError> {
        self.modes
            .get(device)
            .cloned()
            .ok_or_else(|| DisplayError::UnknownDevice(device.to_string()))
    }

    fn current_mode(&self, device: &str) -> Result<DisplayMode, DisplayError> {
        self.current
            .get(device)
            .copied()
            .ok_or_else(|| DisplayError::NoCurrentMode(device.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: i32, height: i32, refresh_rate: f32) -> DisplayMode {
        DisplayMode {
            width,
            height,
            refresh_rate,
        }
    }

    #[test]
    fn test_snapshot_answers_queries() {
        let rect = DisplayRect {
            offset_x: 0,
            offset_y: 0,
            width: 1920,
            height: 1080,
        };
        let snapshot = DisplaySnapshot::new().with_output(
            "DP-1",
            "Radeon RX 6800",
            Some("DELL U2719D"),
            true,
            rect,
            vec![mode(1920, 1080, 60.0), mode(1280, 720, 60.0)],
            Some(mode(1920, 1080, 60.0)),
        );

        assert_eq!(snapshot.monitors().unwrap().len(), 1);
        assert_eq!(snapshot.display_devices().unwrap()[0].adapter, "Radeon RX 6800");
        assert_eq!(snapshot.monitor_name("DP-1").as_deref(), Some("DELL U2719D"));
        assert_eq!(snapshot.modes("DP-1").unwrap().len(), 2);
        assert_eq!(snapshot.current_mode("DP-1").unwrap(), mode(1920, 1080, 60.0));
        assert!(snapshot.modes("HDMI-1").is_err());
    }

    #[test]
    fn test_current_mode_joins_mode_list() {
        let snapshot = DisplaySnapshot::new().with_output(
            "DP-1",
            "GPU",
            None,
            false,
            DisplayRect::default(),
            Vec::new(),
            Some(mode(800, 600, 75.0)),
        );
        assert_eq!(snapshot.modes("DP-1").unwrap(), vec![mode(800, 600, 75.0)]);
        assert_eq!(snapshot.monitor_name("DP-1"), None);
    }

    #[test]
    fn test_no_displays() {
        assert!(NoDisplays.monitors().unwrap().is_empty());
        assert!(NoDisplays.current_mode("DP-1").is_err());
    }
}
