// velvet-gateway - Session-scoped image generation gateway
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use velvet_gateway::cli::{Args, Command, TargetArgs};
use velvet_gateway::client::{profile_session_id, HttpBackend, Studio, SubmitOutcome};
use velvet_gateway::config::AppConfig;
use velvet_gateway::limiter::SystemClock;
use velvet_gateway::orchestrator::{GatewayFactory, GenerateRequest};
use velvet_gateway::server::{create_router, AppState, EdgeRouter};
use velvet_gateway::session::SessionRegistry;
use velvet_gateway::storage::{provider_from_config, FileStore, StateStore};
use velvet_gateway::upstream::{ImageModel, WorkersAiClient};
use velvet_gateway::utils::logging;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = AppConfig::load(args.config.as_deref())?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;

    // Phase 3: Runtime sized from config
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        match args.command {
            None => serve(config).await,
            Some(Command::Serve { host, port }) => {
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
                serve(config).await
            }
            Some(Command::Generate {
                prompt,
                negative,
                style,
                out,
                target,
            }) => {
                let mut request = GenerateRequest::new(prompt);
                if let Some(negative) = negative {
                    request = request.with_negative_prompt(negative);
                }
                if let Some(style) = style {
                    request = request.with_style(style);
                }
                generate(&config, target, request, out).await
            }
            Some(Command::Sync { target }) => sync(&config, target).await,
            Some(Command::Gallery) => gallery(&config),
        }
    })
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting velvet-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Phase 4: Per-session state stores
    let provider = provider_from_config(&config.storage)?;
    info!("Session storage: {:?}", config.storage.backend);

    // Phase 5: Bind the image model; a missing binding degrades, not fails
    let model: Option<Arc<dyn ImageModel>> = match WorkersAiClient::new(&config.upstream) {
        Ok(client) => {
            info!("Image model bound: {}", client.name());
            Some(Arc::new(client) as Arc<dyn ImageModel>)
        }
        Err(e) => {
            warn!("{}; generation requests will fail until configured", e);
            None
        }
    };

    let factory = GatewayFactory::new(provider, model, Arc::new(SystemClock))
        .with_upstream(config.upstream.clone())
        .with_generation(config.generation.clone())
        .with_rate_limit(config.rate_limit.clone());
    let registry = Arc::new(SessionRegistry::new());
    let edge = EdgeRouter::new(factory, registry.clone());

    // Phase 6: Build and start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(AppState::new(config, registry, edge))?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 7: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// The studio profile's local store plus a backend for the chosen session.
fn open_studio(config: &AppConfig, target: TargetArgs) -> Result<Studio<HttpBackend>> {
    let store: Arc<dyn StateStore> = Arc::new(FileStore::open(&config.client.data_dir)?);
    let session_id = match target.session {
        Some(id) => id,
        None => profile_session_id(store.as_ref())?,
    };
    let server_url = target
        .server
        .unwrap_or_else(|| config.client.server_url.clone());

    info!("Using session {} at {}", session_id, server_url);
    let backend = HttpBackend::new(&server_url, &session_id)?;
    Ok(Studio::new(backend, store, config.client.gallery_max_images))
}

async fn generate(
    config: &AppConfig,
    target: TargetArgs,
    request: GenerateRequest,
    out: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut studio = open_studio(config, target)?;

    match studio.submit(request).await? {
        SubmitOutcome::Generated { image, cached } => {
            println!(
                "{} {} (seed {})",
                if cached { "cached" } else { "generated" },
                image.id,
                image.seed.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
            );
            if let Some(path) = out {
                tokio::fs::write(&path, image.image_bytes()?)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("saved to {}", path.display());
            }
        }
        SubmitOutcome::Queued => {
            println!(
                "gateway unreachable; queued ({} pending). Run `velvet-gateway sync` later.",
                studio.queue().len()?
            );
        }
    }
    Ok(())
}

async fn sync(config: &AppConfig, target: TargetArgs) -> Result<()> {
    let mut studio = open_studio(config, target)?;
    let report = studio.replay_queue().await?;

    println!(
        "replayed {}, dropped {}, still queued {}",
        report.completed.len(),
        report.failed.len(),
        report.requeued
    );
    for (prompt, reason) in &report.failed {
        println!("  dropped \"{}\": {}", logging::truncate_prompt(prompt), reason);
    }
    Ok(())
}

fn gallery(config: &AppConfig) -> Result<()> {
    let store: Arc<dyn StateStore> = Arc::new(FileStore::open(&config.client.data_dir)?);
    let gallery = velvet_gateway::client::Gallery::new(store, config.client.gallery_max_images);

    for image in gallery.list()? {
        let when = chrono::DateTime::from_timestamp_millis(image.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{}  {}  {}", image.id, when, logging::truncate_prompt(&image.prompt));
    }

    let info = gallery.storage_info()?;
    println!("{} image(s), {} bytes", info.count, info.size_bytes);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
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
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
