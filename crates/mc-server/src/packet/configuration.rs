//! Configuration state: client settings and the finish handshake.

use mc_protocol::ByteBuffer;
use tracing::{debug, info};

use crate::connection::{ClientInformation, PacketConnectionState};
use crate::error::Result;
use crate::packet::ClientboundPacket;
use crate::protocol::ConnectionState;

/// Serverbound Client Information (0x00): the client settings snapshot.
#[derive(Debug, Clone)]
pub struct SClientInformation {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub displayed_skin_parts: u8,
    pub main_hand: i32,
    pub enable_text_filtering: bool,
    pub allow_server_listings: bool,
}

impl SClientInformation {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        Ok(Self {
            locale: buffer.read_string(16)?,
            view_distance: buffer.read_i8()?,
            chat_mode: buffer.read_varint()?,
            chat_colors: buffer.read_bool()?,
            displayed_skin_parts: buffer.read_u8()?,
            main_hand: buffer.read_varint()?,
            enable_text_filtering: buffer.read_bool()?,
            allow_server_listings: buffer.read_bool()?,
        })
    }

    /// Captures the snapshot and marks the connection ready for the initial
    /// configuration step.
    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        info!(locale = %self.locale, view_distance = self.view_distance, "client information");
        let mut client_info = p_state.client_information.lock().expect("client info lock");
        client_info.info = ClientInformation {
            locale: self.locale,
            view_distance: self.view_distance,
            chat_mode: self.chat_mode,
            chat_colors: self.chat_colors,
            displayed_skin_parts: self.displayed_skin_parts,
            main_hand: self.main_hand,
            enable_text_filtering: self.enable_text_filtering,
            allow_server_listings: self.allow_server_listings,
        };
        client_info.config_ready = true;
        Ok(Vec::new())
    }
}

/// Serverbound Plugin Message (0x02); `minecraft:brand` is the usual one.
#[derive(Debug, Clone)]
pub struct SPluginMessage {
    pub channel: String,
    pub data: Vec<u8>,
}

impl SPluginMessage {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        let channel = buffer.read_string(32767)?;
        let remaining = buffer.remaining();
        let data = buffer.read(remaining)?.to_vec();
        Ok(Self { channel, data })
    }

    pub fn handle(self, _p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        debug!(channel = %self.channel, bytes = self.data.len(), "plugin message");
        Ok(Vec::new())
    }
}

/// Serverbound Finish Configuration acknowledgement (0x03); enters play.
#[derive(Debug, Clone)]
pub struct SFinishConfigurationAck;

impl SFinishConfigurationAck {
    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        p_state.state = ConnectionState::Play;
        info!("configuration finished, entering play");
        Ok(Vec::new())
    }
}

/// Clientbound Finish Configuration (0x03); empty body.
#[derive(Debug, Clone)]
pub struct CFinishConfiguration;

impl CFinishConfiguration {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        Ok(ByteBuffer::new())
    }
}
