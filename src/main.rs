//! Live scoring backend entrypoint wiring REST, SSE and the score store supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use futures::{FutureExt, future::BoxFuture};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_scoring_back::{
    config::{AppConfig, StorageBackend},
    dao::{
        score_store::{ScoreStore, memory::MemoryScoreStore},
        storage::StorageError,
    },
    routes,
    services::{maintenance, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    let backend = StorageBackend::from_env();
    info!(?backend, "selected score store backend");
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(backend)
    }));
    tokio::spawn(maintenance::run(app_state.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port()));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "live scoring backend listening");

    axum::serve(listener, build_router(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server stopped with an error")?;

    info!("live scoring backend stopped");
    Ok(())
}

/// `PORT`, then `SERVER_PORT`, then 8080.
fn listen_port() -> u16 {
    ["PORT", "SERVER_PORT"]
        .into_iter()
        .find_map(|name| env::var(name).ok()?.parse().ok())
        .unwrap_or(8080)
}

/// Open a fresh connection to the configured backend.
fn connect_store(
    backend: StorageBackend,
) -> BoxFuture<'static, Result<Arc<dyn ScoreStore>, StorageError>> {
    match backend {
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo => async {
            use live_scoring_back::dao::score_store::mongodb::{MongoConfig, MongoScoreStore};

            let config = MongoConfig::from_env().await?;
            let store = MongoScoreStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn ScoreStore>)
        }
        .boxed(),
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch => async {
            use live_scoring_back::dao::score_store::couchdb::{CouchConfig, CouchScoreStore};

            let config = CouchConfig::from_env()?;
            let store = CouchScoreStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn ScoreStore>)
        }
        .boxed(),
        _ => async { Ok(Arc::new(MemoryScoreStore::new()) as Arc<dyn ScoreStore>) }.boxed(),
    }
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
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
