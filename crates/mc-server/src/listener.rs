//! TCP listener: accepts peers, spawns a connection task each, supervises
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::connection::Connection;

/// Accept polling interval; the stop flag is checked this often.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

/// The running server: a bound socket, its accept task and the live
/// connection list.
pub struct Listener {
    config: Arc<ServerConfig>,
    local_addr: SocketAddr,
    connections: Arc<AsyncMutex<Vec<Connection>>>,
    stop: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl Listener {
    /// Binds (SO_REUSEADDR) and starts accepting.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let config = Arc::new(config);
        let addr: SocketAddr = config
            .bind_addr()
            .parse()
            .map_err(|_| std::io::Error::other("invalid bind address"))?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;
        let local_addr = listener.local_addr()?;
        info!("Listening for connections on {local_addr}");

        let connections: Arc<AsyncMutex<Vec<Connection>>> = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&config),
            Arc::clone(&connections),
            Arc::clone(&stop),
        ));

        Ok(Self {
            config,
            local_addr,
            connections,
            stop,
            accept_task,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of connections currently tracked.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Handles for server-initiated sends to every live connection.
    pub async fn connection_handles(&self) -> Vec<crate::connection::ConnectionHandle> {
        self.connections
            .lock()
            .await
            .iter()
            .map(Connection::handle)
            .collect()
    }

    /// Cooperative shutdown: stop accepting, interrupt every connection,
    /// join them all, then drop the listening socket.
    pub async fn shutdown(self) {
        info!("Connection listener is shutting down...");
        self.stop.store(true, Ordering::Release);
        let _ = self.accept_task.await;

        let mut connections = self.connections.lock().await;
        for connection in connections.iter() {
            connection.interrupt();
        }
        for connection in connections.drain(..) {
            connection.join().await;
        }
        info!("Terminating listener");
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    connections: Arc<AsyncMutex<Vec<Connection>>>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let accepted = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await;
        match accepted {
            Err(_) => continue, // timeout, poll the stop flag
            Ok(Err(err)) => {
                // Keep accepting; a failed accept only affects that peer.
                error!(error = %err, "accept failed");
                continue;
            }
            Ok(Ok((stream, peer))) => {
                let mut connections = connections.lock().await;
                // Finished connections leave the list as new peers arrive.
                connections.retain(|connection| !connection.is_finished());
                let id = connections.len() as u64;
                info!(connection = id, peer = %peer, "connection accepted");
                connections.push(Connection::spawn(stream, peer, id, Arc::clone(&config)));
            }
        }
    }
}
