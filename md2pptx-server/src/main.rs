//! md2pptx-server - Markdown to PowerPoint conversion service
//!
//! Exposes `POST /api/upload`: a Markdown file goes in, a `.pptx` deck
//! generated by the external converter comes back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use md2pptx_common::config::{CliOverrides, ServiceConfig, UploadDirInitializer};
use md2pptx_server::cleanup::CleanupScheduler;
use md2pptx_server::converter::{Converter, ConverterConfig};
use md2pptx_server::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for md2pptx-server
#[derive(Parser, Debug)]
#[command(name = "md2pptx-server")]
#[command(about = "Converts uploaded Markdown files to PowerPoint decks")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory uploads are staged in
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Converter executable name or path
    #[arg(long)]
    converter: Option<String>,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        Self {
            config_file: args.config,
            upload_dir: args.upload_dir,
            host: args.host,
            port: args.port,
            converter: args.converter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolved before tracing so the configured log level applies
    let config = ServiceConfig::resolve(&args.into()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting md2pptx-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config.config_file {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let initializer = UploadDirInitializer::new(config.upload_dir.clone());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize upload directory")?;
    info!("Upload directory: {}", initializer.upload_dir().display());

    let converter = Converter::locate(&ConverterConfig {
        program: config.converter_program.clone(),
        timeout: config.converter_timeout,
    })
    .context("Failed to locate converter")?;
    info!(
        "Converter: {} (timeout {}s)",
        converter.program().display(),
        converter.timeout().as_secs()
    );

    let cleanup = CleanupScheduler::new(config.cleanup_delay);
    let state = AppState::new(
        config.upload_dir.clone(),
        converter,
        cleanup.clone(),
        config.max_upload_bytes,
    );
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let removed = cleanup.flush().await;
    info!(removed, "Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
