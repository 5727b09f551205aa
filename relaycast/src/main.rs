//! Relaycast service entry point
//!
//! Wires configuration, strategy chains and the relay loop together, then
//! serves the REST control surface until SIGINT/SIGTERM.

use anyhow::Context;
use axum::{routing::get, Json, Router};
use relaycore::acquire::{AcquisitionStrategy, ResolverClient, ResolverDirectStrategy, ResolverDownloadStrategy};
use relaycore::openapi::ApiDoc;
use relaycore::transport::{FfmpegTransport, GstTransport, TransportStrategy};
use relaycore::{Playlist, RelayLoop, RelayLoopOptions, SinkDescriptor};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ========== Phase 1: configuration and fixed inputs ==========

    let config = relayconfig::get_config();

    let download_dir = PathBuf::from(config.get_download_dir()?);
    tokio::fs::create_dir_all(&download_dir)
        .await
        .with_context(|| format!("creating download dir {}", download_dir.display()))?;

    let playlist = Arc::new(Playlist::from_config()?);
    let sink = SinkDescriptor::from_config()?;
    info!(
        playlist_size = playlist.len(),
        sink = %sink.srt_uri(),
        "relaycast configured"
    );

    // ========== Phase 2: strategy chains ==========

    let resolver = Arc::new(ResolverClient::from_config());
    let acquirers: Vec<Arc<dyn AcquisitionStrategy>> = vec![
        Arc::new(ResolverDownloadStrategy::new(
            resolver.clone(),
            download_dir.clone(),
        )),
        Arc::new(ResolverDirectStrategy::new(resolver)),
    ];

    let options = RelayLoopOptions::from_config();
    let grace = options.limits.safety_margin;
    let transports: Vec<Arc<dyn TransportStrategy>> = vec![
        Arc::new(FfmpegTransport::new(grace)),
        Arc::new(GstTransport::new(grace)),
    ];

    let relay = Arc::new(RelayLoop::new(
        playlist,
        sink,
        acquirers,
        transports,
        options,
    ));

    // ========== Phase 3: autostart and control surface ==========

    if config.get_autostart() {
        let delay = Duration::from_secs(config.get_autostart_delay_secs());
        let relay = relay.clone();
        tokio::spawn(async move {
            info!(delay_secs = delay.as_secs(), "autostart scheduled");
            tokio::time::sleep(delay).await;
            relay.start();
        });
    }

    let app = Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(relaycore::api::relay_api_router(relay.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.get_http_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "control surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // ========== Phase 4: wind down ==========

    if relay.stop() {
        info!("relay stopped for shutdown");
    }
    sweep_download_dir(&download_dir).await;

    info!("relaycast stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => warn!(%error, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

/// Best-effort removal of staged files left behind by an interrupted job
async fn sweep_download_dir(dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            warn!(dir = %dir.display(), %error, "cannot sweep download dir");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "mp4") {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(path = %path.display(), "removed leftover staged file"),
                Err(error) => warn!(path = %path.display(), %error, "failed to remove leftover"),
            }
        }
    }
}
