use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use windowgate::config::WindowGateConfig;
use windowgate::http::{HttpServer, KeyExtractor, RateLimitGuard};
use windowgate::ratelimit::{spawn_sweeper, Clock, Policy, SlidingWindowLimiter, SystemClock};

/// Sliding-window rate limit check service.
#[derive(Parser, Debug)]
#[command(name = "windowgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("Starting Windowgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = WindowGateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Initialize the rate limiter
    let rate_limiting = &config.rate_limiting;
    let policy = Policy::try_from(rate_limiting)?;
    let mut limiter = SlidingWindowLimiter::new(policy);
    if let Some(max_clients) = rate_limiting.max_tracked_clients {
        limiter = limiter.with_max_clients(max_clients);
    }
    let limiter = Arc::new(limiter);
    info!(
        window_secs = policy.window().as_secs(),
        max_requests = policy.max_requests(),
        max_tracked_clients = ?rate_limiting.max_tracked_clients,
        "Rate limiter initialized"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sweeper = (rate_limiting.sweep_interval_secs > 0).then(|| {
        spawn_sweeper(
            Arc::clone(&limiter),
            Arc::clone(&clock),
            Duration::from_secs(rate_limiting.sweep_interval_secs),
        )
    });

    let guard = RateLimitGuard::new(limiter)
        .with_clock(clock)
        .with_key_extractor(KeyExtractor::new(rate_limiting.trust_forwarded_for));

    // Run the server with graceful shutdown on Ctrl+C
    HttpServer::new(config.server.http_addr, guard)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Windowgate Rate Limiting Service stopped");
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
