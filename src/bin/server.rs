use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crabstream::http::{self, AppState};
use crabstream::testing::SyntheticBackend;
use crabstream::{CaptureStore, DeviceId, FrameSource, StreamConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// nokhwa capture with `v4l2-ctl` enumeration
    V4l2,
    /// Generated frames, no hardware required
    Synthetic,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve a webcam as an MJPEG stream")]
struct Args {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(long, short, default_value = "crabstream.toml")]
    config: PathBuf,

    /// Camera index or device path, overriding the config file.
    #[arg(long, env = "CAMERA_ID")]
    device: Option<DeviceId>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long, short)]
    port: Option<u16>,

    #[arg(long, value_enum, default_value_t = Backend::V4l2)]
    backend: Backend,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut StreamConfig) {
        if let Some(device) = &self.device {
            config.camera.device = device.clone();
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    crabstream::init_logging();
    let args = Args::parse();

    let mut config = StreamConfig::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let options = config.source_options();
    let source = Arc::new(match args.backend {
        Backend::V4l2 => FrameSource::v4l2(options),
        Backend::Synthetic => FrameSource::with_backend(SyntheticBackend::demo(), options),
    });

    let starter = Arc::clone(&source);
    match tokio::task::spawn_blocking(move || starter.start()).await? {
        Ok(()) => log::info!("Streaming from {}", source.device_id()),
        Err(e) => log::error!("Camera start failed, select a device to retry: {}", e),
    }

    let store = CaptureStore::new(&config.storage.capture_dir);
    store
        .ensure_dir()
        .with_context(|| format!("creating {}", store.dir().display()))?;

    let state = AppState::new(Arc::clone(&source), store, config.stream.clone());
    let router = http::create_router(state, &config.storage.static_dir);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    http::serve(listener, router, shutdown_signal()).await?;

    log::info!("Shutting down camera");
    tokio::task::spawn_blocking(move || source.stop()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
