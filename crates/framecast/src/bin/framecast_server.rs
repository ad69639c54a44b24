//! framecast server binary entry point
//!
//! Starts the upload + frame-streaming server.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 127.0.0.1:8000, ./temp_videos, origin http://localhost:3000
//! cargo run --bin framecast_server
//!
//! # Bind elsewhere and pace frames at ~30 fps
//! cargo run --bin framecast_server -- \
//!   --host 0.0.0.0 --port 9000 \
//!   --frame-interval-ms 33
//!
//! # Multiple allowed origins
//! cargo run --bin framecast_server -- \
//!   --allowed-origins http://localhost:3000,https://player.example.com
//! ```

use clap::Parser;
use framecast::{Server, ServerConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// framecast server
///
/// Accepts video uploads per session id and streams their frames to one
/// WebSocket client per session after a signaling handshake.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "FRAMECAST_HOST")]
    host: String,

    /// Port to bind to
    #[arg(long, default_value_t = 8000, env = "FRAMECAST_PORT")]
    port: u16,

    /// Directory for uploaded assets
    #[arg(long, default_value = "temp_videos", env = "FRAMECAST_STORAGE_DIR")]
    storage_dir: PathBuf,

    /// Prefix for asset blob keys inside the storage directory
    #[arg(long, default_value = "", env = "FRAMECAST_STORAGE_KEY_PREFIX")]
    storage_key_prefix: String,

    /// Origins allowed on the signaling channel (comma-separated; empty = allow all)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "http://localhost:3000",
        env = "FRAMECAST_ALLOWED_ORIGINS"
    )]
    allowed_origins: Vec<String>,

    /// Maximum concurrent sessions (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "FRAMECAST_MAX_SESSIONS")]
    max_sessions: usize,

    /// Maximum accepted upload size in bytes
    #[arg(
        long,
        default_value_t = framecast::DEFAULT_MAX_UPLOAD_BYTES,
        env = "FRAMECAST_MAX_UPLOAD_BYTES"
    )]
    max_upload_bytes: usize,

    /// Delay between frame sends in milliseconds (omit for unpaced delivery)
    #[arg(long, env = "FRAMECAST_FRAME_INTERVAL_MS")]
    frame_interval_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            allowed_origins: self.allowed_origins,
            storage_dir: self.storage_dir,
            storage_key_prefix: self.storage_key_prefix,
            max_sessions: self.max_sessions,
            max_upload_bytes: self.max_upload_bytes,
            frame_interval_ms: self.frame_interval_ms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("framecast {} starting", framecast::version());

    let server = Server::new(args.into_config()).await?;
    let bound = server.bind().await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    bound.serve_with_shutdown(shutdown).await?;

    info!("framecast stopped");
    Ok(())
}
