//! Detection and enumeration report

use agshim::{AdapterSummary, Context};
use agshim_core::Revision;
use agshim_discovery::Detection;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub backend: String,
    pub detection: Detection,
    pub record_size: usize,
    pub returned_params_size: usize,
    pub adapters: Vec<AdapterSummary>,
}

impl Report {
    pub fn from_context(backend: &str, context: &Context) -> Self {
        let revision: Revision = context.revision();
        Self {
            generated_at: Utc::now(),
            backend: backend.to_string(),
            detection: context.detection().clone(),
            record_size: revision.record_size(),
            returned_params_size: revision.returned_params_size(),
            adapters: context.adapters(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.detection;
        writeln!(f, "Report generated {}", self.generated_at.to_rfc3339())?;
        writeln!(
            f,
            "Revision {} ({:?}), record size {} bytes, returned params {} bytes",
            d.revision, d.source, self.record_size, self.returned_params_size
        )?;
        if let Some(path) = &d.module_path {
            writeln!(f, "  Module: {}", path.display())?;
        }
        if let Some(version) = &d.file_version {
            writeln!(f, "  File version: {}", version)?;
        }
        if let Some(sha256) = &d.sha256 {
            writeln!(f, "  SHA-256: {}", sha256)?;
        }
        if let Some(reason) = &d.reason {
            writeln!(f, "  Fallback reason: {}", reason)?;
        }

        writeln!(f, "Backend {}: {} adapter(s)", self.backend, self.adapters.len())?;
        for (i, adapter) in self.adapters.iter().enumerate() {
            writeln!(
                f,
                "  [{}] {} ({:#06x}:{:#06x}){}",
                i,
                adapter.name,
                adapter.vendor_id,
                adapter.device_id,
                if adapter.is_primary { " primary" } else { "" }
            )?;
            writeln!(f, "      Local memory: {} MiB", adapter.local_memory_bytes >> 20)?;
            for display in &adapter.displays {
                writeln!(
                    f,
                    "      Display {} \"{}\": {}x{} @ {:.2} Hz (max {}x{} @ {:.2} Hz){}",
                    display.display_device_name,
                    display.name,
                    display.current_resolution.width,
                    display.current_resolution.height,
                    display.current_refresh_rate,
                    display.max_resolution_x,
                    display.max_resolution_y,
                    display.max_refresh_rate,
                    if display.is_primary { " primary" } else { "" }
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agshim::Runtime;
    use agshim_core::{DisplayRect, TARGET_VENDOR_ID};
    use agshim_discovery::{DetectorConfig, DisplayMode, DisplaySnapshot, FakeAdapter, FakeBackend, VersionDetector};

    fn context() -> (Runtime, Box<Context>) {
        let backend = FakeBackend::new(vec![
            FakeAdapter::new("AMD Radeon RX 6800", TARGET_VENDOR_ID, 0x73bf).with_heap(16 << 30, 1),
        ]);
        let displays = DisplaySnapshot::new().with_output(
            "DP-1",
            "AMD Radeon RX 6800",
            Some("DELL U2719D"),
            true,
            DisplayRect {
                offset_x: 0,
                offset_y: 0,
                width: 2560,
                height: 1440,
            },
            vec![DisplayMode {
                width: 2560,
                height: 1440,
                refresh_rate: 59.95,
            }],
            None,
        );
        let config = DetectorConfig {
            force_revision: Some(Revision::V5_4_2),
            ..DetectorConfig::default()
        };
        let runtime = Runtime::new(Box::new(backend), Box::new(displays), VersionDetector::from_config(&config));
        let context = Context::create(&runtime).unwrap();
        (runtime, context)
    }

    #[test]
    fn test_text_report() {
        let (_runtime, context) = context();
        let text = Report::from_context("fake", &context).to_text();
        assert!(text.contains("Revision 5.4.2 (Forced)"));
        assert!(text.contains("[0] AMD Radeon RX 6800 (0x1002:0x73bf) primary"));
        assert!(text.contains("Local memory: 16384 MiB"));
        assert!(text.contains("Display DP-1 \"DELL U2719D\": 2560x1440"));
        assert!(text.ends_with("primary\n"));
    }

    #[test]
    fn test_json_report() {
        let (_runtime, context) = context();
        let report = Report::from_context("fake", &context);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["detection"]["revision"], "5.4.2");
        assert_eq!(json["detection"]["source"], "forced");
        assert_eq!(json["adapters"][0]["vendor_id"], 0x1002);
        assert_eq!(json["adapters"][0]["asic_family"], 5);
        assert_eq!(json["adapters"][0]["architecture_version"], serde_json::Value::Null);
        assert_eq!(json["adapters"][0]["displays"][0]["name"], "DELL U2719D");
        assert_eq!(json["record_size"], Revision::V5_4_2.record_size());
    }
}
