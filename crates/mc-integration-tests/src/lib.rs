//! Integration testing infrastructure for the server core.
//!
//! [`TestServer`] runs the real listener in-process on an ephemeral port;
//! [`client::TestClient`] speaks the wire format over a plain socket,
//! including the compression envelope and AES/CFB8 encryption, so tests can
//! drive full protocol flows end to end.

pub mod client;

pub use client::TestClient;

use std::net::SocketAddr;

use mc_server::connection::ConnectionHandle;
use mc_server::{Listener, ServerConfig};

/// An in-process server bound to `127.0.0.1:0`.
pub struct TestServer {
    listener: Listener,
}

impl TestServer {
    /// Starts with offline-mode defaults.
    pub async fn start() -> eyre::Result<Self> {
        Self::start_with(ServerConfig {
            online_mode: false,
            ..ServerConfig::default()
        })
        .await
    }

    /// Starts with the given configuration; address and port are forced to
    /// the loopback ephemeral range.
    pub async fn start_with(mut config: ServerConfig) -> eyre::Result<Self> {
        config.address = "127.0.0.1".to_string();
        config.port = 0;
        let listener = Listener::bind(config).await?;
        Ok(Self { listener })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub async fn connection_handles(&self) -> Vec<ConnectionHandle> {
        self.listener.connection_handles().await
    }

    /// Waits until at least one connection is registered.
    pub async fn wait_for_connection(&self) -> eyre::Result<ConnectionHandle> {
        for _ in 0..100 {
            if let Some(handle) = self.connection_handles().await.into_iter().next() {
                return Ok(handle);
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        eyre::bail!("no connection arrived");
    }

    pub async fn stop(self) {
        self.listener.shutdown().await;
    }
}
