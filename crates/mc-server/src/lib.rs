//! Minecraft Java Edition server core: the client-connection protocol
//! engine (protocol 769, advertised as 1.21.4) and its supervision.
//!
//! The wire plumbing lives in [`stream`], typed packets and the parse
//! registry in [`packet`], the per-connection state machine in
//! [`connection`], and the accept loop in [`listener`]. World data comes in
//! through the `mc-anvil` crate; `mc-protocol`, `mc-nbt` and `mc-crypto`
//! carry the codecs underneath.

pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod listener;
pub mod logging;
pub mod packet;
pub mod protocol;
pub mod stream;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionHandle, PacketConnectionState};
pub use error::ConnectionError;
pub use listener::Listener;
pub use protocol::{ConnectionState, ProtocolVersion};
