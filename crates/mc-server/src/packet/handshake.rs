//! Handshake state: the single serverbound intention packet.

use mc_protocol::ByteBuffer;
use tracing::debug;

use crate::connection::PacketConnectionState;
use crate::error::{ProtocolViolation, Result};
use crate::packet::ClientboundPacket;
use crate::protocol::ConnectionState;

/// Serverbound handshake (0x00). The version number is stored as-is; status
/// pings arrive from arbitrary client versions and must not be rejected
/// here.
#[derive(Debug, Clone)]
pub struct SHandshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl SHandshake {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        Ok(Self {
            protocol_version: buffer.read_varint()?,
            server_address: buffer.read_string(256)?,
            server_port: buffer.read_u16()?,
            next_state: buffer.read_varint()?,
        })
    }

    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        p_state.protocol_version = Some(self.protocol_version);
        p_state.state = match self.next_state {
            1 => ConnectionState::Status,
            2 => ConnectionState::Login,
            3 => ConnectionState::Configuration,
            other => return Err(ProtocolViolation::InvalidNextState(other).into()),
        };
        debug!(
            protocol = self.protocol_version,
            address = %self.server_address,
            port = self.server_port,
            next = %p_state.state,
            "handshake"
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::PacketConnectionState;
    use crate::error::ConnectionError;

    /// Status-handshake bytes as a 1.19.3 client sends them, after
    /// deframing: protocol 761, "localhost", port 25565, next state 1.
    const STATUS_HANDSHAKE: &[u8] = b"\xf9\x05\x09localhost\x63\xdd\x01";

    #[test]
    fn reads_status_handshake_fixture() {
        let mut buffer = ByteBuffer::wrap(STATUS_HANDSHAKE.to_vec());
        let packet = SHandshake::read(&mut buffer).unwrap();
        assert_eq!(packet.protocol_version, 761);
        assert_eq!(packet.server_address, "localhost");
        assert_eq!(packet.server_port, 25565);
        assert_eq!(packet.next_state, 1);
    }

    #[test]
    fn next_state_transitions() {
        for (next, expected) in [
            (1, ConnectionState::Status),
            (2, ConnectionState::Login),
            (3, ConnectionState::Configuration),
        ] {
            let mut p_state = PacketConnectionState::for_tests();
            let packet = SHandshake {
                protocol_version: 769,
                server_address: "localhost".into(),
                server_port: 25565,
                next_state: next,
            };
            packet.handle(&mut p_state).unwrap();
            assert_eq!(p_state.state, expected);
        }
    }

    #[test]
    fn bad_next_state_is_protocol_error() {
        let mut p_state = PacketConnectionState::for_tests();
        let packet = SHandshake {
            protocol_version: 769,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 9,
        };
        assert!(matches!(
            packet.handle(&mut p_state),
            Err(ConnectionError::Protocol(
                ProtocolViolation::InvalidNextState(9)
            ))
        ));
    }
}
