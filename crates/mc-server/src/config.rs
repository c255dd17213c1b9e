//! Server configuration.

use std::path::PathBuf;

use mc_crypto::RsaPadding;
use mc_crypto::session::SESSION_SERVER;

/// Everything the listener and the per-connection state need to know.
/// Defaults mirror a vanilla offline-capable setup on the standard port.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub max_players: i32,
    /// Placeholder until the gameplay core reports real counts.
    pub online_players: i32,
    pub motd: String,
    pub online_mode: bool,
    /// Packet compression threshold; -1 disables compression.
    pub compression_threshold: i32,
    /// Server id string sent in the encryption request; empty since 1.7.
    pub server_id: String,
    pub rsa_padding: RsaPadding,
    pub session_server: String,
    pub world_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 25565,
            max_players: 20,
            online_players: 10,
            motd: "Hello world!".to_string(),
            online_mode: true,
            compression_threshold: -1,
            server_id: String::new(),
            rsa_padding: RsaPadding::default(),
            session_server: SESSION_SERVER.to_string(),
            world_root: PathBuf::from("resources/world"),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
