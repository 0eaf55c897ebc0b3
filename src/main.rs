use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{StorageBackend, TurnstileConfig};
use turnstile::http::HttpServer;
use turnstile::ratelimit::{PolicyResolver, RateLimiter};
use turnstile::storage::{MemoryStorage, RedisStorage, Storage};

/// Per-key request admission control service.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file (environment variables are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the storage backend
    #[arg(short, long, value_enum)]
    backend: Option<StorageBackend>,

    /// Override the HTTP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env may carry RUST_LOG, so it must be loaded before the filter is built
    let dotenv_error = load_dotenv(None);

    // Initialize tracing
    let filter = env_filter();
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Turnstile Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Some(e) = dotenv_error {
        warn!(error = %e, "Failed to read .env file");
    }

    let mut config = match args.config {
        Some(ref path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::from_env(),
    };
    if let Some(backend) = args.backend {
        config.storage.backend = backend;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(
        addr = %addr,
        backend = %config.storage.backend,
        ip_rate_limit = config.rate_limiting.ip_rate_limit,
        ip_block_time_secs = config.rate_limiting.ip_block_time_secs,
        token_overrides = config.rate_limiting.token_limits.len(),
        "Configuration loaded"
    );

    let policy = PolicyResolver::from_config(&config.rate_limiting);

    match config.storage.backend {
        StorageBackend::Memory => {
            let storage = Arc::new(MemoryStorage::new());
            run(addr, policy, storage).await?;
        }
        StorageBackend::Redis => {
            let storage = Arc::new(RedisStorage::connect(&config.storage).await?);
            run(addr, policy, storage).await?;
        }
    }

    info!("Turnstile Admission Control Service stopped");
    Ok(())
}

/// Load a `.env` file into the process environment. A missing file is not
/// an error.
fn load_dotenv(path: Option<&Path>) -> Option<dotenvy::Error> {
    let result = match path {
        Some(path) => dotenvy::from_path(path).map(|_| ()),
        None => dotenvy::dotenv().map(|_| ()),
    };

    match result {
        Err(e) if !e.not_found() => Some(e),
        _ => None,
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Serve until a shutdown signal arrives, then close the storage backend.
async fn run<S: Storage + 'static>(
    addr: SocketAddr,
    policy: PolicyResolver,
    storage: Arc<S>,
) -> anyhow::Result<()> {
    let rate_limiter = Arc::new(RateLimiter::new(policy, storage));
    info!("Rate limiter initialized");

    let server = HttpServer::new(addr, rate_limiter.clone());
    server.serve_with_shutdown(shutdown_signal()).await?;

    rate_limiter.close().await?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
