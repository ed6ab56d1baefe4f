//! X11 display enumeration through the `xrandr` tool

use agshim_core::DisplayRect;
use anyhow::Result;
use std::collections::HashMap;
use std::process::Command;
use tracing::{debug, trace, warn};

use crate::display_source::{DisplayMode, DisplaySnapshot};

/// Captures a [`DisplaySnapshot`] by running `xrandr`
#[derive(Debug, Clone, Default)]
pub struct XrandrDisplaySource {
    /// Adapter string to bind every output to instead of the provider name
    pub adapter_override: Option<String>,
}

impl XrandrDisplaySource {
    pub fn new(adapter_override: Option<String>) -> Self {
        Self { adapter_override }
    }

    pub fn snapshot(&self) -> Result<DisplaySnapshot> {
        let adapter = match &self.adapter_override {
            Some(name) => name.clone(),
            None => provider_name().unwrap_or_else(|e| {
                warn!(error = %e, "Could not read xrandr providers");
                String::new()
            }),
        };

        let monitor_names = run_xrandr(&["--verbose"])
            .map(|stdout| parse_monitor_names(&stdout))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not read EDID monitor names");
                HashMap::new()
            });

        let stdout = run_xrandr(&["--query"])?;
        let snapshot = parse_query(&stdout, &adapter, &monitor_names);
        debug!(
            outputs = snapshot.monitors.len(),
            adapter = %adapter,
            "Captured xrandr display snapshot"
        );
        Ok(snapshot)
    }
}

fn run_xrandr(args: &[&str]) -> Result<String> {
    let output = Command::new("xrandr").args(args).output()?;

    if !output.status.success() {
        anyhow::bail!("xrandr failed: {}", String::from_utf8_lossy(&output.stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn provider_name() -> Result<String> {
    let stdout = run_xrandr(&["--listproviders"])?;
    parse_provider_name(&stdout).ok_or_else(|| anyhow::anyhow!("no provider listed"))
}

/// Name of the first provider in `xrandr --listproviders` output
fn parse_provider_name(output: &str) -> Option<String> {
    // Format: "Provider 0: id: 0x54 cap: 0xf, ... name:AMD Radeon RX 6800 @ pci:0000:0b:00.0"
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("Provider "))
        .find_map(|line| {
            let (_, name) = line.split_once("name:")?;
            let name = name.split(" @ ").next().unwrap_or(name).trim();
            (!name.is_empty()).then(|| name.to_string())
        })
}

/// Monitor names by output, from the EDID blocks in `xrandr --verbose` output
fn parse_monitor_names(output: &str) -> HashMap<String, String> {
    let mut names = HashMap::new();
    let mut output_name: Option<&str> = None;
    let mut edid: Option<String> = None;

    let mut flush = |output_name: Option<&str>, edid: &mut Option<String>| {
        let (Some(output_name), Some(hex_text)) = (output_name, edid.take()) else {
            return;
        };
        match hex::decode(&hex_text) {
            Ok(bytes) => {
                if let Some(name) = edid_monitor_name(&bytes) {
                    names.insert(output_name.to_string(), name);
                }
            }
            Err(e) => debug!(output = output_name, error = %e, "Unreadable EDID"),
        }
    };

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            flush(output_name, &mut edid);
            output_name = line.split_whitespace().next();
            continue;
        }

        let trimmed = line.trim();
        let is_hex = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_hexdigit());
        if let (Some(hex_text), true) = (edid.as_mut(), is_hex) {
            hex_text.push_str(trimmed);
        } else if edid.is_some() {
            flush(output_name, &mut edid);
        } else if trimmed == "EDID:" {
            edid = Some(String::new());
        }
    }
    flush(output_name, &mut edid);
    names
}

/// Text of the monitor name descriptor (tag 0xFC) in an EDID base block
fn edid_monitor_name(edid: &[u8]) -> Option<String> {
    [54usize, 72, 90, 108].iter().find_map(|&at| {
        let descriptor = edid.get(at..at + 18)?;
        if descriptor[..3] != [0, 0, 0] || descriptor[3] != 0xfc {
            return None;
        }
        let text = &descriptor[5..];
        let end = text.iter().position(|&b| b == b'\n').unwrap_or(text.len());
        let name = String::from_utf8_lossy(&text[..end]).trim().to_string();
        (!name.is_empty()).then_some(name)
    })
}

/// Parse `xrandr --query` output, binding every connected output to `adapter`
fn parse_query(output: &str, adapter: &str, monitor_names: &HashMap<String, String>) -> DisplaySnapshot {
    let mut snapshot = DisplaySnapshot::new();
    let mut current: Option<PendingOutput> = None;

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            if let Some(pending) = current.as_mut() {
                pending.parse_mode_line(line);
            }
            continue;
        }

        if let Some(pending) = current.take() {
            snapshot = pending.finish(snapshot, adapter, monitor_names);
        }
        current = parse_output_line(line);
    }

    if let Some(pending) = current.take() {
        snapshot = pending.finish(snapshot, adapter, monitor_names);
    }
    snapshot
}

struct PendingOutput {
    name: String,
    primary: bool,
    rect: DisplayRect,
    modes: Vec<DisplayMode>,
    current: Option<DisplayMode>,
}

impl PendingOutput {
    fn parse_mode_line(&mut self, line: &str) {
        // Format: "   2560x1440     59.95*+  74.97"
        let mut parts = line.split_whitespace();
        let Some((width, height)) = parts.next().and_then(parse_mode_name) else {
            return;
        };

        for rate in parts {
            let is_current = rate.contains('*');
            let Ok(refresh_rate) = rate.trim_end_matches(['*', '+']).parse::<f32>() else {
                continue;
            };
            let mode = DisplayMode {
                width,
                height,
                refresh_rate,
            };
            trace!(output = %self.name, ?mode, is_current, "xrandr mode");
            if is_current {
                self.current = Some(mode);
            }
            self.modes.push(mode);
        }
    }

    fn finish(
        self,
        snapshot: DisplaySnapshot,
        adapter: &str,
        monitor_names: &HashMap<String, String>,
    ) -> DisplaySnapshot {
        let monitor_name = monitor_names.get(&self.name).map(String::as_str);
        snapshot.with_output(
            &self.name,
            adapter,
            monitor_name,
            self.primary,
            self.rect,
            self.modes,
            self.current,
        )
    }
}

/// Parse an output header; only connected outputs with a desktop area count
fn parse_output_line(line: &str) -> Option<PendingOutput> {
    // Format: "DP-1 connected primary 2560x1440+1920+0 (normal left ...) 597mm x 336mm"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 3 || parts[1] != "connected" {
        return None;
    }

    let primary = parts[2] == "primary";
    let geometry = if primary { parts.get(3)? } else { parts[2] };
    let rect = parse_geometry(geometry)?;

    Some(PendingOutput {
        name: parts[0].to_string(),
        primary,
        rect,
        modes: Vec::new(),
        current: None,
    })
}

/// Parse `WxH+X+Y`
fn parse_geometry(s: &str) -> Option<DisplayRect> {
    let (size, offsets) = s.split_once('+')?;
    let (width, height) = size.split_once('x')?;
    let (x, y) = offsets.split_once('+')?;
    Some(DisplayRect {
        offset_x: x.parse().ok()?,
        offset_y: y.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}

/// Parse a mode name such as `1920x1080` or `1920x1080i`
fn parse_mode_name(s: &str) -> Option<(i32, i32)> {
    let (width, height) = s.split_once('x')?;
    let height = height.trim_end_matches(|c: char| !c.is_ascii_digit());
    Some((width.parse().ok()?, height.parse().ok()?))
}
