//! stridelog session service binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Arg, Command};
use tracing::info;

use stridelog_auth::{AuthConfig, FieldCipher, InMemoryRevocationStore, TokenService};
use stridelog_server::handlers::AppState;
use stridelog_server::server::AuthServer;
use stridelog_server::store::MemoryPrincipalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("stridelog-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Session and field-encryption service for the stridelog running log")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Bind address")
                .default_value("127.0.0.1:8080"),
        )
        .get_matches();

    let bind_addr: SocketAddr = matches
        .get_one::<String>("bind")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!("invalid bind address"))?;

    // Configuration problems are fatal here, before anything is served.
    let config = AuthConfig::from_env()?;
    let cipher = Arc::new(FieldCipher::from_config(&config)?);

    let revocations = Arc::new(InMemoryRevocationStore::new());
    let tokens = Arc::new(TokenService::new(config, revocations)?);
    let principals = Arc::new(MemoryPrincipalStore::new(cipher));

    info!("Starting stridelog session service");
    info!("Bind address: {}", bind_addr);

    let state = AppState::new(tokens, principals);
    let server = AuthServer::new(state);

    server
        .serve(bind_addr)
        .await
        .map_err(|e| anyhow!("server error: {}", e))?;

    Ok(())
}
