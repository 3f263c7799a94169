//! HSSAN Prediction Server
//!
//! HTTP API for flower classification. The model lifecycle runs once before
//! the listener starts; afterwards every request reads the same network.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hssan::backend::backend_name;
use hssan::utils::logging::{init_logging, LogConfig, LogLevel};
use hssan::DEFAULT_MODEL_PATH;
use tracing::info;

use crate::state::{AppState, ServerConfig};

/// HSSAN Prediction Server
#[derive(Parser, Debug)]
#[command(name = "hssan-server")]
#[command(version)]
#[command(about = "HTTP API server for HSSAN flower classification")]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "HSSAN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "HSSAN_PORT", default_value = "8000")]
    port: u16,

    /// Model artifact to load at startup
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    /// Maximum number of concurrent inference jobs
    #[arg(long, env = "HSSAN_WORKERS", default_value = "4")]
    workers: usize,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, env = "HSSAN_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Logging preset for the server, with an optional level override
fn log_config(verbose: bool, level: Option<&str>) -> LogConfig {
    let config = if verbose {
        LogConfig::verbose()
    } else {
        LogConfig::production()
    };
    match level {
        Some(level) => config.with_level(LogLevel::parse(level)),
        None => config,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let _ = init_logging(&log_config(cli.verbose, cli.log_level.as_deref()));

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_path: cli.model_path,
        workers: cli.workers,
    };

    info!("HSSAN Prediction Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model path: {:?}", config.model_path);
    info!("  Workers:    {}", config.workers);
    info!("  Backend:    {}", backend_name());

    // Create shared state and run the model lifecycle off the async runtime
    let state = Arc::new(AppState::new(config));
    let lifecycle = state.clone();
    let status = tokio::task::spawn_blocking(move || lifecycle.model.initialize()).await??;
    info!("Model status: {}", status);

    let app = routes::router(state.clone());

    // Start server
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_flag_overrides_preset() {
        assert_eq!(log_config(false, None).level, LogLevel::Info);
        assert_eq!(log_config(true, None).level, LogLevel::Debug);
        assert_eq!(log_config(false, Some("warn")).level, LogLevel::Warn);
        assert_eq!(log_config(true, Some("error")).level, LogLevel::Error);
        assert!(!log_config(false, Some("debug")).ansi_colors);
    }
}
