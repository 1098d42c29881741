//! HTTP server: router, middleware stack, startup and shutdown.

mod error;
mod handlers;
mod logger;
mod middleware;

pub use error::ErrorResponse;
pub use logger::init_tracing;
pub use middleware::{MakeRequestUuid, Tenant, TENANT_HEADER};

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::association::{AssociationService, AssociationServiceConfig};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::Config;
use crate::entity::{EntityService, EntityServiceConfig};
use crate::eventstore::{MemoryStore, PgStore, Store};

/// Route prefix of the REST API.
pub const API_PREFIX: &str = "/api/v1";

/// Cache-key prefix for all cached aggregates.
pub const CACHE_KEY_PREFIX: &str = "edgestore";

/// Failures while bringing the service up.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("core error: {0}")]
    Core(#[from] crate::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state of the REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub entities: EntityService,
    pub associations: AssociationService,
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/v1/entities", post(handlers::create_entity))
        .route(
            "/api/v1/entities/{id}",
            get(handlers::get_entity)
                .put(handlers::update_entity)
                .delete(handlers::delete_entity),
        )
        .route("/api/v1/associations", post(handlers::create_association))
        .route(
            "/api/v1/associations/{id}",
            get(handlers::get_association)
                .put(handlers::update_association)
                .delete(handlers::delete_association),
        )
        .fallback(handlers::not_found)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the application state over the given store and cache.
pub fn app_state(store: Arc<dyn Store>, cache: Arc<dyn Cache>) -> AppState {
    let entities = EntityService::new(EntityServiceConfig {
        cache: Arc::clone(&cache),
        cache_key_prefix: CACHE_KEY_PREFIX.to_string(),
        store: Arc::clone(&store),
        observers: Vec::new(),
    });

    let associations = AssociationService::new(AssociationServiceConfig {
        cache,
        cache_key_prefix: CACHE_KEY_PREFIX.to_string(),
        store,
        observers: Vec::new(),
    });

    AppState {
        entities,
        associations,
    }
}

/// Start the service and serve until SIGINT/SIGTERM.
///
/// Uses the Postgres event store when a database URL is configured and the
/// in-memory store otherwise. In-flight requests get the configured shutdown
/// grace period.
pub async fn serve(config: Config) -> Result<(), ServeError> {
    let store: Arc<dyn Store> = match &config.database {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.init().await?;
            Arc::new(store)
        }
        None => {
            info!("no database configured, using the in-memory event store");
            Arc::new(MemoryStore::new())
        }
    };

    let cache: Arc<dyn Cache> = match RedisCache::connect(&config.cache).await {
        Ok(cache) => {
            cache.ping().await?;
            info!(url = %config.cache, "connected to cache");
            Arc::new(cache)
        }
        Err(err) => {
            warn!(url = %config.cache, error = %err, "cache unreachable, using the in-memory cache");
            Arc::new(MemoryCache::new())
        }
    };

    let state = app_state(store, Arc::clone(&cache));
    let app = router(state).layer(TimeoutLayer::new(config.server.write_timeout()));

    let listener = TcpListener::bind(("0.0.0.0", config.server.http_port)).await?;
    info!(port = config.server.http_port, "listening and serving HTTP");

    // One watch channel feeds both the graceful-shutdown future and the
    // grace-period watchdog.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut graceful_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = graceful_rx.changed().await;
        info!("shutdown signal received");
    });

    let mut watchdog_rx = shutdown_rx;
    let grace = config.server.shutdown_timeout();
    tokio::select! {
        result = server => result?,
        _ = async move {
            let _ = watchdog_rx.changed().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("graceful shutdown timed out, exiting");
        }
    }

    cache.shutdown().await?;
    info!("edgestore stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
