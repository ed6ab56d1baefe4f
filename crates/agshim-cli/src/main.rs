//! Agshim CLI - Main entry point
//!
//! Runs revision detection and one enumeration through the shim, prints what
//! a caller would see, and tears the context down again.

mod config;
mod report;

use agshim::{entry, Context, Runtime};
use agshim_core::ReturnCode;
use agshim_discovery::{DisplaySource, GraphicsBackend, NoAdapters, NoDisplays, VersionDetector, XrandrDisplaySource};
use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{BackendKind, Config, DisplaySourceKind, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "agshim")]
#[command(about = "Inspect the AGS compatibility shim's view of this host")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "agshim.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the output format (text, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Force a revision instead of detecting it, e.g. 6.0.0
    #[arg(long)]
    revision: Option<String>,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Agshim v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;
    if let Some(revision) = args.revision {
        config.detection.force_revision = Some(revision);
    }
    if let Some(format) = args.format {
        config.output.format = match format.to_lowercase().as_str() {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            other => bail!("Unknown output format: {}", other),
        };
    }

    let runtime = build_runtime(&config)?;
    let backend = runtime.backend().name().to_string();

    let context = match Context::create(&runtime) {
        Ok(context) => context,
        Err(e) => bail!("Initialization failed ({:?}): {}", e.code(), e),
    };
    info!(
        version = format_args!("{:#x}", context.version_number()),
        "Packed version number"
    );

    let report = report::Report::from_context(&backend, &context);
    match config.output.format {
        OutputFormat::Text => print!("{}", report.to_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    let code = entry::deinitialize(Some(context));
    if code != ReturnCode::Success {
        warn!(code = ?code, "Teardown reported an error");
    }
    Ok(())
}

fn build_runtime(config: &Config) -> Result<Runtime> {
    let detector = VersionDetector::from_config(&config.detection.to_detector_config()?);

    let backend: Box<dyn GraphicsBackend> = match config.backend.kind {
        BackendKind::None => Box::new(NoAdapters),
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu => Box::new(agshim_discovery::WgpuBackend::new()),
        #[cfg(not(feature = "wgpu"))]
        BackendKind::Wgpu => bail!("backend.kind = \"wgpu\" needs a build with the wgpu feature"),
    };

    let displays: Box<dyn DisplaySource> = match config.displays.source {
        DisplaySourceKind::None => Box::new(NoDisplays),
        DisplaySourceKind::Xrandr => {
            match XrandrDisplaySource::new(config.displays.adapter_override.clone()).snapshot() {
                Ok(snapshot) => Box::new(snapshot),
                Err(e) => {
                    warn!(error = %e, "xrandr unavailable, continuing without displays");
                    Box::new(NoDisplays)
                }
            }
        }
    };

    Ok(Runtime::new(backend, displays, detector))
}
