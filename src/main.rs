//! File drop server binary.
//!
//! Accepts multipart uploads, stores each file under a freshly generated
//! name in a flat storage directory, and serves the directory listing, the
//! stored files, and an embedded drag-and-drop upload page.

mod app;
mod atomic;
mod background;
mod config;
mod error;
mod files;
mod frontend;
mod http;
mod logging;
mod storage;
mod tls;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::background::spawn_background_tasks;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::http::build_cors_layer;
use crate::storage::Storage;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging();

    let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
    storage.ensure_root().await?;
    info!(storage_dir = ?storage.root_path(), "storage ready");

    let mut app = app::build_router(storage.clone(), args.upload_max_size);
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let tls_config = tls::load_rustls_config(&args).await?;
    let handle = Handle::new();

    spawn_background_tasks(storage, Duration::from_secs(args.temp_ttl_secs));
    tokio::spawn(shutdown_signal(handle.clone()));

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    match tls_config {
        Some(tls_config) => {
            info!("🔒 Starting HTTPS server at {}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(service)
                .await
        }
        None => {
            info!("🚀 Starting HTTP server at {}", addr);
            axum_server::bind(addr).handle(handle).serve(service).await
        }
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
