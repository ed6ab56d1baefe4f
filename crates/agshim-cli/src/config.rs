//! Configuration loading

use agshim_core::Revision;
use agshim_discovery::{DetectorConfig, DEFAULT_MODULE_NAME};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub displays: DisplaysConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// File name of the shim module among the loaded modules
    #[serde(default = "default_module_name")]
    pub module_name: String,
    /// Read the version from this file instead
    #[serde(default)]
    pub module_path: Option<PathBuf>,
    /// Skip detection, e.g. "6.0.0"
    #[serde(default)]
    pub force_revision: Option<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            module_name: default_module_name(),
            module_path: None,
            force_revision: None,
        }
    }
}

fn default_module_name() -> String {
    DEFAULT_MODULE_NAME.to_string()
}

impl DetectionConfig {
    pub fn to_detector_config(&self) -> Result<DetectorConfig> {
        let force_revision = self
            .force_revision
            .as_deref()
            .map(str::parse::<Revision>)
            .transpose()
            .context("Invalid detection.force_revision")?;
        Ok(DetectorConfig {
            module_name: self.module_name.clone(),
            module_path: self.module_path.clone(),
            force_revision,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Enumerate real adapters (needs the `wgpu` feature)
    Wgpu,
    /// Report no adapters
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend")]
    pub kind: BackendKind,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend(),
        }
    }
}

fn default_backend() -> BackendKind {
    if cfg!(feature = "wgpu") {
        BackendKind::Wgpu
    } else {
        BackendKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySourceKind {
    Xrandr,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaysConfig {
    #[serde(default = "default_display_source")]
    pub source: DisplaySourceKind,
    /// Adapter name xrandr outputs are bound to, when the provider name
    /// does not match the backend's adapter name
    #[serde(default)]
    pub adapter_override: Option<String>,
}

impl Default for DisplaysConfig {
    fn default() -> Self {
        Self {
            source: default_display_source(),
            adapter_override: None,
        }
    }
}

fn default_display_source() -> DisplaySourceKind {
    DisplaySourceKind::Xrandr
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> OutputFormat {
    OutputFormat::Text
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        detection: DetectionConfig {
            module_path: Some(PathBuf::from("C:/Games/App/amd_ags_x64.dll")),
            ..DetectionConfig::default()
        },
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
