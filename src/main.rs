use std::sync::Arc;

use collab_engine::{
    contracts::{AllowAllAccessOracle, InMemoryDocumentRepository, StaticAuthenticator},
    run, ServerConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set by an embedder; ignore.
    }

    let config = ServerConfig::from_env();

    // Reference external collaborators: no real identity provider or
    // database is wired up here. A production deployment replaces these
    // three with its own Authenticator/AccessOracle/DocumentRepository.
    run(
        config,
        Arc::new(StaticAuthenticator),
        Arc::new(AllowAllAccessOracle),
        Arc::new(InMemoryDocumentRepository::new()),
    )
    .await
}
