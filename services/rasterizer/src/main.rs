//! Raster pyramid command line tool.
//!
//! Works on rasters already in the store: builds the composite levels above
//! the leaves, fills missing value ranges, renders web tiles and writes the
//! WMTS capabilities document.

mod commands;
mod discovery;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pyramid_common::TilingConfig;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "rasterizer")]
#[command(about = "Raster pyramid and web tile generator")]
struct Args {
    /// Tiling configuration file (JSON or YAML). Defaults are used when omitted.
    #[arg(short, long, env = "PYRAMID_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every level above the stored leaf rasters
    Parents {
        /// Zoom level of the stored rasters to start from (default: max zoom)
        #[arg(long)]
        from_zoom: Option<u32>,

        /// Where to save the config with discovered ranges (default: --config)
        #[arg(long)]
        save_config: Option<PathBuf>,
    },

    /// Render color-mapped web tiles from the stored rasters
    WebTiles {
        /// Comma-separated zoom levels to render (default: all stored)
        #[arg(long, value_delimiter = ',')]
        zooms: Vec<u32>,
    },

    /// Write the WMTS capabilities document for the web tiles
    Capabilities {
        /// URL the web tile directory is served from
        #[arg(long)]
        base_url: String,

        /// Service title
        #[arg(long, default_value = "Raster pyramid")]
        title: String,

        /// Output path (default: WMTSCapabilities.xml in the web tile directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fill missing value ranges from the stored rasters
    Ranges {
        /// Where to save the updated config (default: --config)
        #[arg(long)]
        save_config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = load_config(args.config.as_deref())?;
    info!(
        tms = %config.tms_id,
        z_range = ?config.z_range,
        statistics = ?config.stat_names(),
        "Loaded configuration"
    );

    match args.command {
        Command::Parents {
            from_zoom,
            save_config,
        } => {
            let updated = commands::parents(&config, from_zoom)?;
            save_updates(&config, &updated, save_config.as_deref().or(args.config.as_deref()))?;
        }
        Command::WebTiles { zooms } => {
            commands::web_tiles(&config, &zooms)?;
        }
        Command::Capabilities {
            base_url,
            title,
            output,
        } => {
            commands::capabilities(&config, &title, &base_url, output)?;
        }
        Command::Ranges { save_config } => {
            let updated = commands::ranges(&config)?;
            save_updates(&config, &updated, save_config.as_deref().or(args.config.as_deref()))?;
        }
    }

    Ok(())
}

/// Read the config file (or defaults), apply environment overrides and
/// validate before anything touches the store.
fn load_config(path: Option<&Path>) -> Result<TilingConfig> {
    let mut config = match path {
        Some(path) => TilingConfig::from_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => TilingConfig::default(),
    };
    config.apply_env();
    config.validate().context("invalid tiling configuration")?;
    Ok(config)
}

fn save_updates(
    original: &TilingConfig,
    updated: &TilingConfig,
    target: Option<&Path>,
) -> Result<()> {
    let changes = updated.list_updates(original);
    if changes.is_empty() {
        info!("Configuration unchanged");
        return Ok(());
    }
    for change in &changes {
        info!(change = %change, "Configuration updated");
    }

    match target {
        Some(path) => {
            updated
                .write(path)
                .with_context(|| format!("cannot save config {}", path.display()))?;
            info!(path = %path.display(), "Saved configuration");
        }
        None => warn!(
            changes = changes.len(),
            "No config path given, discovered ranges were not saved"
        ),
    }
    Ok(())
}
