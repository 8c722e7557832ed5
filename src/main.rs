//! Hitster Back binary entrypoint wiring REST routes, the match store and the reveal watcher.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hitster_back::{
    config::AppConfig,
    dao::{
        match_store::{MatchStore, memory::InMemoryMatchStore},
        storage::StorageError,
    },
    routes,
    services::{
        enrichment::{CardOracle, Enrichment, NoopOracle},
        reveal_watcher, storage_supervisor,
        track_supply::CatalogTrackSource,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let enrichment = Enrichment::new(build_oracle(&config), config.enrichment.clone());
    let tracks = Arc::new(CatalogTrackSource::new(config.catalog_dir.clone()));
    let watch_interval = config.watch_interval;
    let watcher_enabled = config.watcher_enabled;

    let app_state = AppState::new(config, tracks, enrichment);

    spawn_store_supervisor(app_state.clone())?;
    if watcher_enabled {
        tokio::spawn(reveal_watcher::run(app_state.clone(), watch_interval));
    }

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the oracle used for year correction and trivia.
fn build_oracle(config: &AppConfig) -> Arc<dyn CardOracle> {
    match config.enrichment.oracle_url.as_deref() {
        #[cfg(feature = "http-oracle")]
        Some(url) => {
            info!(%url, "enrichment oracle enabled");
            Arc::new(hitster_back::services::enrichment::HttpOracle::new(url))
        }
        #[cfg(not(feature = "http-oracle"))]
        Some(_) => {
            warn!("oracle_url configured but the http-oracle feature is disabled");
            Arc::new(NoopOracle)
        }
        None => {
            info!("no enrichment oracle configured; cards keep their catalog years");
            Arc::new(NoopOracle)
        }
    }
}

/// Start the supervisor for the backend named by `HITSTER_STORE`
/// (`memory`, `mongo` or `couch`).
fn spawn_store_supervisor(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("HITSTER_STORE").unwrap_or_else(|_| "memory".into());
    info!(%backend, "selecting match store");

    match backend.as_str() {
        "memory" => {
            let store: Arc<dyn MatchStore> = Arc::new(InMemoryMatchStore::new());
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(store) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use hitster_back::dao::match_store::mongodb::{MongoConfig, MongoMatchStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoMatchStore::connect(config).await?;
                Ok::<Arc<dyn MatchStore>, StorageError>(Arc::new(store))
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use hitster_back::dao::match_store::couchdb::{CouchConfig, CouchMatchStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchMatchStore::connect(config).await?;
                Ok::<Arc<dyn MatchStore>, StorageError>(Arc::new(store))
            }));
        }
        other => anyhow::bail!("unsupported HITSTER_STORE backend: {other}"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
