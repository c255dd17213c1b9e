//! Status state: the server-list handshake.

use mc_protocol::ByteBuffer;
use serde::Serialize;

use crate::connection::PacketConnectionState;
use crate::error::Result;
use crate::packet::ClientboundPacket;
use crate::protocol::{CURRENT_VERSION, ConnectionState};

/// Serverbound status request (0x00); empty body.
#[derive(Debug, Clone)]
pub struct SStatusRequest;

impl SStatusRequest {
    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        Ok(vec![ClientboundPacket::StatusResponse(
            CStatusResponse::from_state(p_state),
        )])
    }
}

/// Serverbound ping (0x01): an opaque client timestamp to echo back.
#[derive(Debug, Clone)]
pub struct SPingRequest {
    pub timestamp: i64,
}

impl SPingRequest {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        Ok(Self {
            timestamp: buffer.read_i64()?,
        })
    }

    /// Echo the timestamp, then the connection is done.
    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        p_state.state = ConnectionState::Close;
        Ok(vec![ClientboundPacket::PongResponse(CPongResponse {
            timestamp: self.timestamp,
        })])
    }
}

#[derive(Serialize)]
struct StatusBody {
    version: StatusVersion,
    players: StatusPlayers,
    description: StatusDescription,
}

#[derive(Serialize)]
struct StatusVersion {
    name: String,
    protocol: i32,
}

#[derive(Serialize)]
struct StatusPlayers {
    max: i32,
    online: i32,
    sample: Vec<PlayerSample>,
}

#[derive(Serialize)]
struct PlayerSample {
    name: String,
    id: String,
}

#[derive(Serialize)]
struct StatusDescription {
    text: String,
}

/// Clientbound status response (0x00): the server-list JSON document.
#[derive(Debug, Clone)]
pub struct CStatusResponse {
    pub json: String,
}

impl CStatusResponse {
    #[must_use]
    pub fn from_state(p_state: &PacketConnectionState) -> Self {
        let config = &p_state.config;
        let body = StatusBody {
            version: StatusVersion {
                name: CURRENT_VERSION.name().to_string(),
                protocol: CURRENT_VERSION.protocol(),
            },
            players: StatusPlayers {
                max: config.max_players,
                online: config.online_players,
                sample: Vec::new(),
            },
            description: StatusDescription {
                text: config.motd.clone(),
            },
        };
        Self {
            json: serde_json::to_string(&body).expect("status body serializes"),
        }
    }

    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_string(&self.json, 32767)?;
        Ok(body)
    }
}

/// Clientbound pong (0x01).
#[derive(Debug, Clone)]
pub struct CPongResponse {
    pub timestamp: i64,
}

impl CPongResponse {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_i64(self.timestamp);
        Ok(body)
    }
}
