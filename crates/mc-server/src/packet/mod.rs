//! Packet types and the parse registry.
//!
//! Serverbound packets decode from a `(state, id)` match table into typed
//! variants; each variant's `handle` owns the resulting state transition
//! and may produce clientbound replies. Clientbound packets build their
//! payload against the connection state and frame themselves per the
//! compression envelope.

use bytes::Bytes;
use mc_protocol::ByteBuffer;

use crate::connection::PacketConnectionState;
use crate::error::{ProtocolViolation, Result};
use crate::protocol::ConnectionState;
use crate::stream::encode_frame;

pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use configuration::{SClientInformation, SFinishConfigurationAck, SPluginMessage};
pub use handshake::SHandshake;
pub use login::{
    SCookieResponse, SEncryptionResponse, SLoginAcknowledged, SLoginPluginResponse, SLoginStart,
};
pub use status::{SPingRequest, SStatusRequest};

/// Every serverbound packet this server understands, tagged by kind.
#[derive(Debug)]
pub enum ServerboundPacket {
    Handshake(SHandshake),
    StatusRequest(SStatusRequest),
    PingRequest(SPingRequest),
    LoginStart(SLoginStart),
    EncryptionResponse(SEncryptionResponse),
    LoginPluginResponse(SLoginPluginResponse),
    LoginAcknowledged(SLoginAcknowledged),
    CookieResponse(SCookieResponse),
    ClientInformation(SClientInformation),
    PluginMessage(SPluginMessage),
    FinishConfigurationAck(SFinishConfigurationAck),
}

impl ServerboundPacket {
    /// The parse table: `(state, id)` to typed packet.
    ///
    /// Unknown ids in the play state are unimplemented rather than illegal;
    /// everywhere else they are a protocol violation.
    pub fn decode(
        state: ConnectionState,
        packet_id: i32,
        buffer: &mut ByteBuffer,
    ) -> Result<Self> {
        use ConnectionState as S;
        Ok(match (state, packet_id) {
            (S::Handshake, 0x00) => Self::Handshake(SHandshake::read(buffer)?),
            (S::Status, 0x00) => Self::StatusRequest(SStatusRequest),
            (S::Status, 0x01) => Self::PingRequest(SPingRequest::read(buffer)?),
            (S::Login, 0x00) => Self::LoginStart(SLoginStart::read(buffer)?),
            (S::Login, 0x01) => Self::EncryptionResponse(SEncryptionResponse::read(buffer)?),
            (S::Login, 0x02) => Self::LoginPluginResponse(SLoginPluginResponse::read(buffer)?),
            (S::Login, 0x03) => Self::LoginAcknowledged(SLoginAcknowledged),
            (S::Login, 0x04) => Self::CookieResponse(SCookieResponse::read(buffer)?),
            (S::Configuration, 0x00) => {
                Self::ClientInformation(SClientInformation::read(buffer)?)
            }
            (S::Configuration, 0x02) => Self::PluginMessage(SPluginMessage::read(buffer)?),
            (S::Configuration, 0x03) => Self::FinishConfigurationAck(SFinishConfigurationAck),
            (S::Play, id) => {
                return Err(ProtocolViolation::UnsupportedPacket { state, id }.into());
            }
            (state, id) => return Err(ProtocolViolation::UnexpectedPacket { state, id }.into()),
        })
    }

    #[must_use]
    pub fn packet_id(&self) -> i32 {
        match self {
            Self::Handshake(_)
            | Self::StatusRequest(_)
            | Self::LoginStart(_)
            | Self::ClientInformation(_) => 0x00,
            Self::PingRequest(_) | Self::EncryptionResponse(_) => 0x01,
            Self::LoginPluginResponse(_) | Self::PluginMessage(_) => 0x02,
            Self::LoginAcknowledged(_) | Self::FinishConfigurationAck(_) => 0x03,
            Self::CookieResponse(_) => 0x04,
        }
    }

    /// Applies the packet against the connection state. State transitions
    /// happen here, not in the dispatcher loop.
    pub async fn handle(
        self,
        p_state: &mut PacketConnectionState,
    ) -> Result<Vec<ClientboundPacket>> {
        match self {
            Self::Handshake(packet) => packet.handle(p_state),
            Self::StatusRequest(packet) => packet.handle(p_state),
            Self::PingRequest(packet) => packet.handle(p_state),
            Self::LoginStart(packet) => packet.handle(p_state),
            Self::EncryptionResponse(packet) => packet.handle(p_state).await,
            Self::LoginPluginResponse(packet) => packet.handle(p_state),
            Self::LoginAcknowledged(packet) => packet.handle(p_state),
            Self::CookieResponse(packet) => packet.handle(p_state),
            Self::ClientInformation(packet) => packet.handle(p_state),
            Self::PluginMessage(packet) => packet.handle(p_state),
            Self::FinishConfigurationAck(packet) => packet.handle(p_state),
        }
    }
}

/// Clientbound packets the server can emit.
#[derive(Debug, Clone)]
pub enum ClientboundPacket {
    StatusResponse(status::CStatusResponse),
    PongResponse(status::CPongResponse),
    LoginDisconnect(login::CLoginDisconnect),
    EncryptionRequest(login::CEncryptionRequest),
    LoginSuccess(login::CLoginSuccess),
    SetCompression(login::CSetCompression),
    LoginPluginRequest(login::CLoginPluginRequest),
    CookieRequest(login::CCookieRequest),
    FinishConfiguration(configuration::CFinishConfiguration),
    BundleDelimiter(play::CBundleDelimiter),
}

impl ClientboundPacket {
    #[must_use]
    pub fn packet_id(&self) -> i32 {
        match self {
            Self::StatusResponse(_)
            | Self::LoginDisconnect(_)
            | Self::BundleDelimiter(_) => 0x00,
            Self::PongResponse(_) | Self::EncryptionRequest(_) => 0x01,
            Self::LoginSuccess(_) => 0x02,
            Self::SetCompression(_) | Self::FinishConfiguration(_) => 0x03,
            Self::LoginPluginRequest(_) => 0x04,
            Self::CookieRequest(_) => 0x05,
        }
    }

    /// Builds the packet payload ("Data" in the protocol docs) against the
    /// connection state. Some packets also adjust that state - compression
    /// and encryption parameters take effect for *later* packets.
    pub fn body(&self, p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        match self {
            Self::StatusResponse(packet) => packet.body(p_state),
            Self::PongResponse(packet) => packet.body(p_state),
            Self::LoginDisconnect(packet) => packet.body(p_state),
            Self::EncryptionRequest(packet) => packet.body(p_state),
            Self::LoginSuccess(packet) => packet.body(p_state),
            Self::SetCompression(packet) => packet.body(p_state),
            Self::LoginPluginRequest(packet) => packet.body(p_state),
            Self::CookieRequest(packet) => packet.body(p_state),
            Self::FinishConfiguration(packet) => packet.body(p_state),
            Self::BundleDelimiter(packet) => packet.body(p_state),
        }
    }

    /// The final on-wire frame. The compression threshold in force *before*
    /// this packet's body runs is the one used, so a `SetCompression` is
    /// itself sent under the old regime.
    pub fn get_bytes(&self, p_state: &mut PacketConnectionState) -> Result<Bytes> {
        let threshold = p_state.compress_threshold;
        let body = self.body(p_state)?;
        encode_frame(self.packet_id(), body.as_slice(), threshold)
    }
}
