#![forbid(unsafe_code)]

use std::net::SocketAddr;

use roster_server::{build_router, init_tracing, AppConfig, DirectoryAccount};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let token_key_base64 = std::env::var("ROSTER_TOKEN_KEY")
        .map_err(|_| anyhow::anyhow!("ROSTER_TOKEN_KEY is required for runtime"))?;
    let directory_accounts = match std::env::var("ROSTER_DIRECTORY_PATH") {
        Ok(path) => load_directory_accounts(&path)?,
        Err(_) => Vec::new(),
    };
    let app_config = AppConfig {
        token_key_base64: Some(token_key_base64),
        directory_accounts,
        ..AppConfig::default()
    };
    let app = build_router(&app_config)?;
    let addr = std::env::var("ROSTER_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid ROSTER_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "roster-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn load_directory_accounts(path: &str) -> anyhow::Result<Vec<DirectoryAccount>> {
    let raw = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("directory seed file {path:?} unreadable: {e}"))?;
    let accounts: Vec<DirectoryAccount> = serde_json::from_slice(&raw)
        .map_err(|e| anyhow::anyhow!("directory seed file {path:?} is not valid json: {e}"))?;
    Ok(accounts)
}
