use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use edgecast_lib::camera::types::PixelFormat;
use edgecast_lib::logging::init_logging;
use edgecast_lib::render::RenderBackend;
use edgecast_lib::settings::store;
use edgecast_lib::settings::types::{EdgecastConfig, SourceKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Live camera edge extraction with GPU preview and WebSocket relay", long_about = None)]
struct Args {
    /// JSON config file; missing files fall back to defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long, value_enum)]
    pixel_format: Option<PixelFormat>,

    #[arg(long, value_enum)]
    backend: Option<RenderBackend>,

    /// Relay server address
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    no_relay: bool,

    #[arg(long)]
    no_filter: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Write the effective config to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "edgecast_lib=trace"
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut EdgecastConfig) {
        if let Some(kind) = self.source {
            config.source.kind = kind;
        }
        if let Some(width) = self.width {
            config.source.width = width;
        }
        if let Some(height) = self.height {
            config.source.height = height;
        }
        if let Some(fps) = self.fps {
            config.source.fps = fps;
        }
        if let Some(format) = self.pixel_format {
            config.source.pixel_format = format;
        }
        if let Some(backend) = self.backend {
            config.render.backend = backend;
        }
        if let Some(bind) = &self.bind {
            config.relay.bind = bind.clone();
        }
        if self.no_relay {
            config.relay.enabled = false;
        }
        if self.no_filter {
            config.filter.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let mut config = match &args.config {
        Some(path) => store::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EdgecastConfig::default(),
    };
    args.apply(&mut config);

    if let Some(path) = &args.write_config {
        store::save(path, &config)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        tracing::info!("config written to {}", path.display());
        return Ok(());
    }

    edgecast_lib::run(config, args.duration.map(Duration::from_secs)).await
}
