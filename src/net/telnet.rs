//! The TCP listener: bind (displacing a running instance if necessary),
//! accept, and spawn one task per connection.

use crate::error::{AppResult, InfraError};
use crate::net::conn::handle_connection;
use crate::net::machine::{DO, DONT, IAC, SHUTDOWN_REQUEST, WILL, WONT};
use crate::state::registry::Registry;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How long to wait for the incumbent to acknowledge a shutdown request.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the telnet server.
pub async fn serve(registry: Arc<Registry>) -> AppResult<()> {
    let port = registry.config.port;
    let listener = bind_with_handoff(port).await?;
    tracing::info!("Server started, running on port {}. (pid {})", port, std::process::id());
    accept_loop(listener, registry).await
}

/// Accept connections on an already-bound listener forever.
pub async fn accept_loop(listener: TcpListener, registry: Arc<Registry>) -> AppResult<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, registry).await {
                        tracing::warn!(%peer, error = %e, "connection error");
                    }
                    tracing::info!(%peer, "client disconnected");
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

/// Bind the listening socket. When the port is taken, ask the running
/// instance to shut down over loopback, then retry every second.
pub async fn bind_with_handoff(port: u16) -> AppResult<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let mut tries = 0u32;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => match tries {
                0 => {
                    request_shutdown(port).await;
                    tries += 1;
                }
                1 => {
                    tracing::info!("Waiting for port {}.", port);
                    tries += 1;
                }
                _ => tokio::time::sleep(Duration::from_secs(1)).await,
            },
            Err(e) => return Err(InfraError::Bind { port, source: e }.into()),
        }
    }
}

/// Connect to the incumbent on loopback, send the private shutdown command
/// and wait briefly for it to be echoed back.
pub async fn request_shutdown(port: u16) {
    let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)).await else {
        return;
    };
    tracing::info!("Attempting to shut down running server.");
    if stream.write_all(&[IAC, SHUTDOWN_REQUEST]).await.is_err() {
        return;
    }

    let acknowledged = tokio::time::timeout(HANDOFF_TIMEOUT, read_ack(&mut stream))
        .await
        .unwrap_or(false);
    if acknowledged {
        tracing::info!("Shutdown request acknowledged.");
    } else {
        tracing::info!("Shutdown request not acknowledged.");
    }
}

/// Scan the incumbent's telnet chatter for the echoed shutdown command,
/// skipping over option negotiations. Anything else means no deal.
async fn read_ack(stream: &mut TcpStream) -> bool {
    let mut state = 0u8;
    loop {
        let Ok(byte) = stream.read_u8().await else {
            return false;
        };
        match state {
            IAC => match byte {
                SHUTDOWN_REQUEST => return true,
                WILL | WONT | DO | DONT => state = byte,
                _ => return false,
            },
            WILL | WONT | DO | DONT => state = 0,
            _ => {
                if byte == IAC {
                    state = IAC;
                } else {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn handoff_acknowledged_by_incumbent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let incumbent = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Speak some negotiation first, then echo the shutdown request.
            sock.write_all(&[IAC, WILL, 1, IAC, DO, 3]).await.unwrap();
            let mut buf = [0u8; 2];
            sock.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [IAC, SHUTDOWN_REQUEST]);
            sock.write_all(&[IAC, SHUTDOWN_REQUEST]).await.unwrap();
        });

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(&[IAC, SHUTDOWN_REQUEST]).await.unwrap();
        let acked = tokio::time::timeout(HANDOFF_TIMEOUT, read_ack(&mut stream))
            .await
            .unwrap_or(false);
        assert!(acked);
        incumbent.await.unwrap();
    }

    #[tokio::test]
    async fn handoff_rejected_by_plain_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"not a telnet server\n").await.unwrap();
        });

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let acked = tokio::time::timeout(Duration::from_secs(2), read_ack(&mut stream))
            .await
            .unwrap_or(false);
        assert!(!acked);
    }
}
