//! Columns Back binary entrypoint wiring REST, WebSocket, SSE, room scheduling and match storage.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use columns_back::{
    config::AppConfig,
    routes,
    services::{game_service, persistence, sse_events},
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    spawn_background_tasks(&app_state).await?;
    spawn_storage_supervisor(&app_state);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the tick dispatcher, the persistence worker and the status relay.
async fn spawn_background_tasks(state: &SharedState) -> anyhow::Result<()> {
    let reports = state
        .take_tick_reports()
        .await
        .context("tick report stream already taken")?;
    tokio::spawn(game_service::run_tick_dispatcher(state.clone(), reports));

    let jobs = state
        .take_persistence_jobs()
        .await
        .context("persistence queue already taken")?;
    tokio::spawn(persistence::run(state.clone(), jobs));

    tokio::spawn(sse_events::forward_system_status(state.clone()));
    Ok(())
}

#[cfg(feature = "couch-store")]
fn spawn_storage_supervisor(state: &SharedState) {
    use std::sync::Arc;

    use columns_back::{
        dao::{
            match_store::{
                MatchStore,
                couchdb::{CouchConfig, CouchMatchStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let config = match CouchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "CouchDB not configured; match history disabled (degraded mode)");
            return;
        }
    };
    info!(base_url = %config.base_url, database = %config.database, "using CouchDB match store");

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let config = config.clone();
        async move {
            let store = CouchMatchStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
        }
    }));
}

#[cfg(not(feature = "couch-store"))]
fn spawn_storage_supervisor(_state: &SharedState) {
    warn!("built without a match store backend; match history disabled (degraded mode)");
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
