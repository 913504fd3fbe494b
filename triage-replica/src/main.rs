//! triage-replica - Main entry point
//!
//! Loads the persisted replica, wires the record source and sync service,
//! and serves the HTTP API until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use triage_common::config::{ensure_root_folder, RootFolderResolver, TomlConfig};
use triage_replica::api::{build_router, AppState};
use triage_replica::db;
use triage_replica::source::{FixtureDocument, FixtureSource, RecordSource};
use triage_replica::{SharedState, SyncService};

/// Command-line arguments for triage-replica
#[derive(Parser, Debug)]
#[command(name = "triage-replica")]
#[command(about = "Ordered-priority replica of a remote bug list")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "TRIAGE_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "TRIAGE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to ~/.config/triage/config.toml)
    #[arg(short, long, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON fixture served as the remote source
    #[arg(short, long, env = "TRIAGE_FIXTURE")]
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing exists so its log level can apply;
    // where it came from is logged once the subscriber is installed
    let (config, config_origin) = TomlConfig::load_with_origin(args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config).context("Failed to initialize logging")?;
    config_origin.log();

    info!(
        "Starting triage-replica v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("triage-replica")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();
    ensure_root_folder(&root_folder).context("Failed to create root folder")?;

    let db_path = config.database_path(&root_folder);
    info!("Database path: {}", db_path.display());
    let pool = db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let replica = db::load_replica(&pool)
        .await
        .context("Failed to load replica")?
        .with_initial_levels(config.sync.initial_levels);
    info!(
        "Replica loaded: {} records, last update {:?}",
        replica.len(),
        replica.last_update()
    );

    let state = Arc::new(SharedState::new(replica).with_database(pool));
    let source = load_source(&args, &config, &root_folder)?;

    if config.server.product.is_empty() {
        warn!("No product configured ([server] product); syncs will fetch nothing");
    }
    let sync = Arc::new(SyncService::new(
        Arc::clone(&state),
        source,
        config.server.product.clone(),
        config.sync.max_concurrent_fetches,
    ));

    let shutdown = CancellationToken::new();
    let app = build_router(AppState::new(
        state,
        sync,
        config.server.clone(),
        shutdown.clone(),
    ));

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins; otherwise the config's level applies to this crate.
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "triage_replica={level},triage_common={level},tower_http=info",
            level = config.logging.level
        )
        .into()
    });

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Fixture from the CLI, else from the config; an empty source otherwise
fn load_source(
    args: &Args,
    config: &TomlConfig,
    root_folder: &std::path::Path,
) -> Result<Arc<dyn RecordSource>> {
    let path = args.fixture.clone().or_else(|| {
        config.fixture_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                root_folder.join(p)
            }
        })
    });

    let source = match path {
        Some(path) => FixtureSource::from_file(&path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?,
        None => {
            warn!("No record source configured; serving an empty fixture");
            FixtureSource::new(FixtureDocument::default())
        }
    };
    Ok(Arc::new(source))
}

/// Graceful shutdown signal handler
///
/// Cancels `shutdown` so in-flight syncs stop before the server exits.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    shutdown.cancel();
}
