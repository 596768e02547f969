//! Serve command implementation

use crate::api::{create_router, AppState};
use crate::backend::{ChatBackend, CohereClient};
use crate::cli::ServeArgs;
use crate::config::{LogFormat, ProxyConfig};
use crate::credentials::CredentialRotator;
use crate::queue::{spawn_workers, AggregateStats, TaskQueue};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        ProxyConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        ProxyConfig::default()
    };

    config = config.with_env_overrides();

    // CLI flags win over everything else
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.queue.concurrency = concurrency;
    }

    Ok(config)
}

/// Initialize tracing based on configuration
pub fn init_tracing(
    config: &crate::config::LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Route panics through tracing so they end up in structured logs.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();

        tracing::error!(panic.message = %message, panic.location = %location, "Panic caught");
    }));
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load, merge and validate configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Logging
    init_tracing(&config.logging)?;
    install_panic_hook();

    tracing::info!("Starting commandr-proxy");
    tracing::debug!(?config, "Loaded configuration");

    // 3. Backend, credentials and worker pool
    let rotator = Arc::new(CredentialRotator::new(&config.backend.credentials)?);
    let backend: Arc<dyn ChatBackend> =
        Arc::new(CohereClient::from_config(&config.backend, &config.queue)?);
    let stats = Arc::new(AggregateStats::new());
    let queue = Arc::new(TaskQueue::new(config.queue.clone(), Arc::clone(&stats)));
    let workers = spawn_workers(Arc::clone(&queue), backend, Arc::clone(&rotator));

    // 4. Router
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(Arc::clone(&config), Arc::clone(&queue), stats));
    let app = create_router(state);

    // 5. Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        namespace = %config.server.namespace,
        credentials = rotator.len(),
        workers = workers.len(),
        "commandr-proxy listening"
    );

    let draining = Arc::clone(&queue);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        draining.shutdown().await;
    })
    .await?;

    // 6. Let running tasks finish
    tracing::info!("Waiting for workers to stop");
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "Worker exited abnormally");
        }
    }

    tracing::info!("commandr-proxy stopped");
    Ok(())
}
