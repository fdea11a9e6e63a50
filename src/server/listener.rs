use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info};

use crate::http::connection::{Connection, ConnectionState};
use crate::server::Server;

/// How often an idle connection re-checks its timeout.
const TICK: Duration = Duration::from_secs(1);

pub async fn run(server: Arc<Server>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&server.config.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    serve(listener, server).await
}

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, server: Arc<Server>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let idle = server.config.idle_timeout();
            let mut conn = Connection::new(socket, peer, &server);
            if let Err(e) = drive(&mut conn, idle).await {
                error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}

/// Waits for readiness and feeds read/write events to the connection
/// until it reaches `Closing`, the peer leaves, or it sits idle too long.
pub async fn drive(conn: &mut Connection<'_, TcpStream>, idle: Duration) -> anyhow::Result<()> {
    loop {
        let ready = match conn.state() {
            ConnectionState::ReadingRequest => timeout(TICK, conn.stream().readable()).await,
            ConnectionState::WritingResponse => timeout(TICK, conn.stream().writable()).await,
            ConnectionState::Processing | ConnectionState::Closing => break,
        };

        match ready {
            Ok(res) => res?,
            Err(_elapsed) => {
                if conn.is_timed_out(idle) {
                    info!(peer = %conn.peer(), "Connection timed out");
                    break;
                }
                continue;
            }
        }

        let keep_going = match conn.state() {
            ConnectionState::ReadingRequest => conn.on_readable(),
            _ => conn.on_writable(),
        };

        if !keep_going {
            break;
        }
    }

    Ok(())
}
