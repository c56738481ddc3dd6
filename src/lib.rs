//! Real-time collaborative text editing backend: a per-document session
//! hub serializes concurrent operations, transforms them against any
//! operations it did not see, applies the result, and fans the transformed
//! operation out to every other subscriber so all clients converge.
//!
//! The engine consumes three external collaborators it never implements
//! beyond an in-memory reference: an [`Authenticator`], an [`AccessOracle`],
//! and a [`DocumentRepository`]. See [`contracts`] for the traits and
//! reference implementations used when running this crate standalone.

pub mod algebra;
pub mod config;
pub mod contracts;
pub mod error;
pub mod hub;
pub mod log;
pub mod protocol;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::ServerConfig;
pub use contracts::{AccessCheck, AccessOracle, Authenticator, DocumentRepository, Principal};
pub use error::Error;
pub use hub::HubRegistry;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<HubRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub access_oracle: Arc<dyn AccessOracle>,
}

/// Builds the router: the websocket upgrade endpoint plus a liveness probe.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{document_id}", get(session::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initializes tracing, builds the shared state, and serves until the
/// process is terminated. The binary entrypoint wires in the in-memory
/// reference contract implementations by default; a real deployment
/// supplies its own.
pub async fn run(
    config: ServerConfig,
    authenticator: Arc<dyn Authenticator>,
    access_oracle: Arc<dyn AccessOracle>,
    repo: Arc<dyn DocumentRepository>,
) -> anyhow::Result<()> {
    let registry = Arc::new(HubRegistry::new(config.clone(), repo));

    let state = AppState {
        config: config.clone(),
        registry,
        authenticator,
        access_oracle,
    };

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "collaboration engine listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
