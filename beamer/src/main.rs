use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beamconfig::get_config;
use beamcontrol::coordinator::new_shared_coordinator;
use beamcontrol::{new_shared_directory, CastControlExt, DiscoveryManager};
use beamserver::{MediaServeExt, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Control-plane and media port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Allow-listed media root served under /media/...
    #[arg(long)]
    media_root: Option<PathBuf>,

    /// Directory holding sidecar WebVTT subtitles
    #[arg(long)]
    subtitles_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Beamer cast helper v{}", env!("CARGO_PKG_VERSION"));

    let config = get_config();
    if let Some(port) = args.port {
        let _ = config.set_value(&["server", "port"], serde_yaml::Value::Number(port.into()));
    }
    if let Some(root) = &args.media_root {
        let _ = config.set_value(
            &["media", "root"],
            serde_yaml::Value::String(root.to_string_lossy().to_string()),
        );
    }
    if let Some(root) = &args.subtitles_root {
        let _ = config.set_value(
            &["media", "subtitles"],
            serde_yaml::Value::String(root.to_string_lossy().to_string()),
        );
    }

    let port = config.get_http_port();
    let base_url = config.get_base_url();
    let media_root = config
        .get_media_root()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let subtitles_root = config
        .get_subtitles_root()
        .unwrap_or_else(|| media_root.clone());

    let directory = new_shared_directory();
    let coordinator = new_shared_coordinator(directory.clone());
    let discovery = DiscoveryManager::start(directory.clone());

    let mut server = Server::new("Beamer", base_url, port);
    server
        .init_media_routes(media_root.clone(), subtitles_root.clone())
        .await;
    server
        .init_cast_api(coordinator.clone(), directory, discovery.clone())
        .await;

    info!(
        media_root = %media_root.display(),
        subtitles_root = %subtitles_root.display(),
        "Media roots configured"
    );

    server.start().await;
    server.wait().await;

    // Orderly wind-down: stop any live session before the discovery threads.
    {
        let coordinator = coordinator.clone();
        let _ = tokio::task::spawn_blocking(move || coordinator.lock().unwrap().stop()).await;
    }
    discovery.shutdown();
    info!("Beamer stopped");
}
