#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the efficiency index.
//!
//! Serves the read-only query API over the current catalog snapshot. The
//! snapshot lives behind a [`CatalogHandle`]; a background task polls the
//! store and swaps in newly published snapshots without a restart.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use efficiency_index_catalog::{CatalogHandle, CatalogStore};
use efficiency_index_catalog_models::Catalog;
use efficiency_index_regional::RegionTable;

/// Environment variable holding the snapshot poll interval in seconds.
pub const RELOAD_SECS_ENV: &str = "CATALOG_RELOAD_SECS";

/// Default snapshot poll interval in seconds.
pub const DEFAULT_RELOAD_SECS: u64 = 30;

/// Environment variable naming a region table override file. Point it at
/// the file passed to the ingest `--regions-table` flag.
pub const REGIONS_TABLE_ENV: &str = "EFFICIENCY_INDEX_REGIONS_TABLE";

/// Shared application state.
pub struct AppState {
    /// Snapshot currently being served.
    pub catalog: Arc<CatalogHandle>,
    /// Region table for impacts that were not precomputed.
    pub regions: Arc<RegionTable>,
}

/// Registers the `/api` routes and the JSON error handler for malformed
/// query strings.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(handlers::query_error))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/search", web::get().to(handlers::search))
                .route(
                    "/top-performers/{category}",
                    web::get().to(handlers::top_performers),
                )
                .route("/compare", web::get().to(handlers::compare))
                .route("/stats", web::get().to(handlers::stats))
                .route("/categories", web::get().to(handlers::categories))
                .route(
                    "/regional-impact/{model}",
                    web::get().to(handlers::regional_impact),
                )
                .default_service(web::to(handlers::not_found)),
        );
}

fn reload_interval() -> Duration {
    let secs = std::env::var(RELOAD_SECS_ENV)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_RELOAD_SECS);
    Duration::from_secs(secs)
}

/// Polls `store` every `interval` and swaps in newer snapshots. Load
/// failures are logged and the current snapshot keeps being served.
fn spawn_reload_watcher(handle: Arc<CatalogHandle>, store: CatalogStore, interval: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(interval);
        // The first tick completes immediately; startup already loaded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let handle = Arc::clone(&handle);
            let store = store.clone();
            match web::block(move || handle.reload_if_changed(&store)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::error!("Failed to reload catalog snapshot: {e}"),
                Err(e) => log::error!("Catalog reload task failed: {e}"),
            }
        }
    });
}

/// Starts the efficiency index API server.
///
/// Loads the region table (the `EFFICIENCY_INDEX_REGIONS_TABLE` override or
/// the embedded one) and the current snapshot from the data directory (an
/// empty catalog if none has been published yet), starts the reload
/// watcher, and runs the Actix-Web HTTP server. The caller provides the runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the region table override cannot
/// be loaded, or if the HTTP server fails to bind or encounters a runtime
/// error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let regions_path = std::env::var_os(REGIONS_TABLE_ENV).map(PathBuf::from);
    let regions = RegionTable::load(regions_path.as_deref()).map_err(std::io::Error::other)?;
    log::info!("Using region table {}", regions.version());

    let store = CatalogStore::open_default();
    log::info!("Loading catalog from {}...", store.root().display());
    let catalog = match store.load_current() {
        Ok(Some(catalog)) => {
            log::info!(
                "Serving snapshot {} ({} models)",
                catalog.snapshot_id,
                catalog.stats.total_models
            );
            catalog
        }
        Ok(None) => {
            log::warn!("No snapshot published yet; serving an empty catalog");
            Catalog::empty()
        }
        Err(e) => {
            log::error!("Failed to load current snapshot, serving an empty catalog: {e}");
            Catalog::empty()
        }
    };

    if !catalog.regions_version.is_empty() && catalog.regions_version != regions.version() {
        log::warn!(
            "Snapshot was built with region table {} but {} is loaded; only precomputed regions will be served",
            catalog.regions_version,
            regions.version()
        );
    }

    let handle = Arc::new(CatalogHandle::new(catalog));
    let interval = reload_interval();
    log::info!("Polling for new snapshots every {}s", interval.as_secs());
    spawn_reload_watcher(Arc::clone(&handle), store, interval);

    let state = web::Data::new(AppState {
        catalog: handle,
        regions: Arc::new(regions),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
