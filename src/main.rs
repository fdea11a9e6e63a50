use std::sync::Arc;

use webserv::config::Config;
use webserv::server::{Server, listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load_from(std::env::args().nth(1).as_deref())?;
    let server = Arc::new(Server::new(cfg));

    tokio::select! {
        res = listener::run(server) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
