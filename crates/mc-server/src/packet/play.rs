//! Play state.
//!
//! Gameplay packets belong to the game core; the protocol engine only knows
//! the bundle delimiter. Serverbound play ids fail decoding with
//! `UnsupportedPacket` (see the parse table).

use mc_protocol::ByteBuffer;

use crate::connection::PacketConnectionState;
use crate::error::{ProtocolViolation, Result};
use crate::protocol::ConnectionState;

/// Clientbound Bundle Delimiter (0x00). Packets between two delimiters are
/// applied on one client tick. Legal only in the play state.
#[derive(Debug, Clone)]
pub struct CBundleDelimiter;

impl CBundleDelimiter {
    pub fn body(&self, p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        if p_state.state != ConnectionState::Play {
            return Err(ProtocolViolation::BundleOutsidePlay.into());
        }
        Ok(ByteBuffer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;

    #[test]
    fn delimiter_rejected_outside_play() {
        let mut p_state = PacketConnectionState::for_tests();
        p_state.state = ConnectionState::Configuration;
        assert!(matches!(
            CBundleDelimiter.body(&mut p_state),
            Err(ConnectionError::Protocol(
                ProtocolViolation::BundleOutsidePlay
            ))
        ));
    }

    #[test]
    fn delimiter_is_empty_in_play() {
        let mut p_state = PacketConnectionState::for_tests();
        p_state.state = ConnectionState::Play;
        let body = CBundleDelimiter.body(&mut p_state).unwrap();
        assert!(body.is_empty());
    }
}
