//! Login state: encryption negotiation and login success.
//!
//! The flow mirrors the Notchian server's: Login Start answers with an
//! encryption request carrying a fresh RSA public key and verify token; the
//! encryption response proves the token round-trip, installs the AES/CFB8
//! pair, optionally authenticates against the session server, and ends in
//! Login Success.

use mc_crypto::session::has_joined_at;
use mc_crypto::{ProfileProperty, ServerKeyPair, auth_hash, gen_ciphers};
use mc_protocol::{ByteBuffer, Uuid};
use tracing::{debug, info};

use crate::connection::PacketConnectionState;
use crate::error::{ConnectionError, EncryptionError, ProtocolViolation, Result};
use crate::packet::ClientboundPacket;
use crate::protocol::ConnectionState;

/// Offline-mode UUID derived from the username.
#[must_use]
pub fn offline_uuid(name: &str) -> Uuid {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let input = format!("OfflinePlayer:{}", name);
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    let hash1 = hasher.finish();
    input.hash(&mut hasher);
    let hash2 = hasher.finish();

    let mut uuid = ((hash1 as u128) << 64) | (hash2 as u128);
    uuid = (uuid & 0xFFFFFFFFFFFF0FFFFFFFFFFFFFFF) | 0x00000000000030000000000000000000;
    uuid = (uuid & 0xFFFFFFFFFFFFFFFF3FFFFFFFFFFFFFFF) | 0x00000000000000008000000000000000;
    Uuid(uuid)
}

/// Serverbound Login Start (0x00). The UUID the client sends is unused by
/// the Notchian server and only logged here.
#[derive(Debug, Clone)]
pub struct SLoginStart {
    pub username: String,
    pub uuid: Uuid,
}

impl SLoginStart {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        Ok(Self {
            username: buffer.read_string(16)?,
            uuid: buffer.read_uuid()?,
        })
    }

    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        info!(username = %self.username, client_uuid = %self.uuid, "login start");
        let keypair = ServerKeyPair::generate()?;
        let verify_token: [u8; 4] = rand::random();
        let request = CEncryptionRequest {
            server_id: p_state.config.server_id.clone(),
            public_der: keypair.public_der().to_vec(),
            verify_token,
            should_authenticate: p_state.config.online_mode,
        };
        p_state.username = Some(self.username);
        p_state.keypair = Some(keypair);
        p_state.verify_token = verify_token;
        Ok(vec![ClientboundPacket::EncryptionRequest(request)])
    }
}

/// Serverbound Encryption Response (0x01): RSA-encrypted shared secret and
/// verify token.
#[derive(Debug, Clone)]
pub struct SEncryptionResponse {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl SEncryptionResponse {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        let secret_len = buffer.read_varint()?;
        let shared_secret = buffer.read(secret_len.max(0) as usize)?.to_vec();
        let token_len = buffer.read_varint()?;
        let verify_token = buffer.read(token_len.max(0) as usize)?.to_vec();
        Ok(Self {
            shared_secret,
            verify_token,
        })
    }

    pub async fn handle(
        self,
        p_state: &mut PacketConnectionState,
    ) -> Result<Vec<ClientboundPacket>> {
        let state = p_state.state;
        let padding = p_state.config.rsa_padding;
        let keypair = p_state
            .keypair
            .clone()
            .ok_or(ProtocolViolation::UnexpectedPacket { state, id: 0x01 })?;
        let username = p_state
            .username
            .clone()
            .ok_or(ProtocolViolation::UnexpectedPacket { state, id: 0x01 })?;

        let token = keypair.decrypt(&self.verify_token, padding)?;
        if token != p_state.verify_token {
            return Err(EncryptionError::VerifyTokenMismatch.into());
        }
        let shared_secret = keypair.decrypt(&self.shared_secret, padding)?;
        let (encrypt, decrypt) = gen_ciphers(&shared_secret)?;
        {
            let mut ciphers = p_state.ciphers.lock().expect("cipher lock");
            ciphers.install(encrypt, decrypt);
        }
        info!(username = %username, "encryption enabled");

        let (uuid, properties) = if p_state.config.online_mode {
            let hash = auth_hash(&p_state.config.server_id, &shared_secret, keypair.public_der());
            let profile =
                has_joined_at(&p_state.config.session_server, &username, &hash).await?;
            info!(username = %profile.name, "session server accepted");
            let uuid = Uuid::parse_undashed(&profile.id).map_err(ConnectionError::Corrupted)?;
            (uuid, profile.properties)
        } else {
            (offline_uuid(&username), Vec::new())
        };

        let mut replies = Vec::new();
        let threshold = p_state.config.compression_threshold;
        if threshold >= 0 {
            replies.push(ClientboundPacket::SetCompression(CSetCompression {
                threshold,
            }));
        }
        replies.push(ClientboundPacket::LoginSuccess(CLoginSuccess {
            uuid,
            username,
            properties,
        }));
        Ok(replies)
    }
}

/// Serverbound Login Plugin Response (0x02). The Notchian client answers
/// unknown channels with `successful = false`.
#[derive(Debug, Clone)]
pub struct SLoginPluginResponse {
    pub message_id: i32,
    pub successful: bool,
    pub data: Vec<u8>,
}

impl SLoginPluginResponse {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        let message_id = buffer.read_varint()?;
        let successful = buffer.read_bool()?;
        let remaining = buffer.remaining();
        let data = buffer.read(remaining)?.to_vec();
        Ok(Self {
            message_id,
            successful,
            data,
        })
    }

    pub fn handle(self, _p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        debug!(
            message_id = self.message_id,
            successful = self.successful,
            "login plugin response"
        );
        Ok(Vec::new())
    }
}

/// Serverbound Login Acknowledged (0x03); moves the connection into
/// configuration.
#[derive(Debug, Clone)]
pub struct SLoginAcknowledged;

impl SLoginAcknowledged {
    pub fn handle(self, p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        p_state.state = ConnectionState::Configuration;
        debug!("login acknowledged");
        Ok(Vec::new())
    }
}

/// Serverbound Cookie Response (0x04).
#[derive(Debug, Clone)]
pub struct SCookieResponse {
    pub key: String,
    pub payload: Option<Vec<u8>>,
}

impl SCookieResponse {
    pub fn read(buffer: &mut ByteBuffer) -> Result<Self> {
        let key = buffer.read_string(32767)?;
        let payload = if buffer.read_bool()? {
            let len = buffer.read_varint()?;
            Some(buffer.read(len.max(0) as usize)?.to_vec())
        } else {
            None
        };
        Ok(Self { key, payload })
    }

    pub fn handle(self, _p_state: &mut PacketConnectionState) -> Result<Vec<ClientboundPacket>> {
        debug!(key = %self.key, present = self.payload.is_some(), "cookie response");
        Ok(Vec::new())
    }
}

/// Clientbound Disconnect (0x00) with a JSON text-component reason.
#[derive(Debug, Clone)]
pub struct CLoginDisconnect {
    pub reason: String,
}

impl CLoginDisconnect {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_string(&self.reason, 32767)?;
        Ok(body)
    }
}

/// Clientbound Encryption Request (0x01).
#[derive(Debug, Clone)]
pub struct CEncryptionRequest {
    pub server_id: String,
    pub public_der: Vec<u8>,
    pub verify_token: [u8; 4],
    pub should_authenticate: bool,
}

impl CEncryptionRequest {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_string(&self.server_id, 20)?;
        body.write_varint(self.public_der.len() as i32);
        body.write(&self.public_der);
        body.write_varint(self.verify_token.len() as i32);
        body.write(&self.verify_token);
        body.write_bool(self.should_authenticate);
        Ok(body)
    }
}

/// Clientbound Login Success (0x02).
#[derive(Debug, Clone)]
pub struct CLoginSuccess {
    pub uuid: Uuid,
    pub username: String,
    pub properties: Vec<ProfileProperty>,
}

impl CLoginSuccess {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_uuid(self.uuid);
        body.write_string(&self.username, 16)?;
        body.write_varint(self.properties.len() as i32);
        for property in &self.properties {
            body.write_string(&property.name, 32767)?;
            body.write_string(&property.value, 32767)?;
            match &property.signature {
                Some(signature) => {
                    body.write_bool(true);
                    body.write_string(signature, 32767)?;
                }
                None => body.write_bool(false),
            }
        }
        Ok(body)
    }
}

/// Clientbound Set Compression (0x03). Takes effect for packets after this
/// one, which is why the threshold is applied as a body side effect.
#[derive(Debug, Clone)]
pub struct CSetCompression {
    pub threshold: i32,
}

impl CSetCompression {
    pub fn body(&self, p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_varint(self.threshold);
        p_state.compress_threshold = self.threshold;
        Ok(body)
    }
}

/// Clientbound Login Plugin Request (0x04) for custom handshakes.
#[derive(Debug, Clone)]
pub struct CLoginPluginRequest {
    pub channel: String,
    pub data: Vec<u8>,
}

impl CLoginPluginRequest {
    pub fn body(&self, p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_varint(p_state.unique_message_id);
        body.write_string(&self.channel, 32767)?;
        body.write(&self.data);
        Ok(body)
    }
}

/// Clientbound Cookie Request (0x05).
#[derive(Debug, Clone)]
pub struct CCookieRequest {
    pub key: String,
}

impl CCookieRequest {
    pub fn body(&self, _p_state: &mut PacketConnectionState) -> Result<ByteBuffer> {
        let mut body = ByteBuffer::new();
        body.write_string(&self.key, 32767)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_crypto::{RsaPadding, decode_public_key_der, encrypt_rsa};

    fn login_start(p_state: &mut PacketConnectionState) -> CEncryptionRequest {
        let packet = SLoginStart {
            username: "TestPlayer".into(),
            uuid: Uuid(0),
        };
        let replies = packet.handle(p_state).unwrap();
        let [ClientboundPacket::EncryptionRequest(request)] = replies.as_slice() else {
            panic!("expected an encryption request");
        };
        request.clone()
    }

    #[test]
    fn login_start_issues_encryption_request() {
        let mut p_state = PacketConnectionState::for_tests();
        p_state.state = ConnectionState::Login;
        let request = login_start(&mut p_state);
        assert_eq!(request.verify_token, p_state.verify_token);
        assert!(!request.public_der.is_empty());
        assert!(p_state.keypair.is_some());
        assert_eq!(p_state.username.as_deref(), Some("TestPlayer"));
    }

    #[tokio::test]
    async fn encryption_response_enables_ciphers_offline() {
        let mut p_state = PacketConnectionState::for_tests();
        p_state.state = ConnectionState::Login;
        let request = login_start(&mut p_state);

        let public = decode_public_key_der(&request.public_der).unwrap();
        let secret = [3u8; 16];
        let response = SEncryptionResponse {
            shared_secret: encrypt_rsa(&public, &secret, RsaPadding::OaepSha1).unwrap(),
            verify_token: encrypt_rsa(&public, &request.verify_token, RsaPadding::OaepSha1)
                .unwrap(),
        };

        let replies = response.handle(&mut p_state).await.unwrap();
        assert!(p_state.ciphers.lock().unwrap().enabled);
        let [ClientboundPacket::LoginSuccess(success)] = replies.as_slice() else {
            panic!("expected login success");
        };
        assert_eq!(success.username, "TestPlayer");
        assert_eq!(success.uuid, offline_uuid("TestPlayer"));
        assert!(success.properties.is_empty());
    }

    #[tokio::test]
    async fn bad_verify_token_is_an_encryption_error() {
        let mut p_state = PacketConnectionState::for_tests();
        p_state.state = ConnectionState::Login;
        let request = login_start(&mut p_state);

        let public = decode_public_key_der(&request.public_der).unwrap();
        let response = SEncryptionResponse {
            shared_secret: encrypt_rsa(&public, &[3u8; 16], RsaPadding::OaepSha1).unwrap(),
            verify_token: encrypt_rsa(&public, &[0u8; 4], RsaPadding::OaepSha1).unwrap(),
        };

        let result = response.handle(&mut p_state).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Encryption(
                EncryptionError::VerifyTokenMismatch
            ))
        ));
        assert!(!p_state.ciphers.lock().unwrap().enabled);
    }

    #[test]
    fn offline_uuid_is_stable_and_versioned() {
        let a = offline_uuid("Steve");
        let b = offline_uuid("Steve");
        assert_eq!(a, b);
        assert_ne!(a, offline_uuid("Alex"));
        // RFC 4122 variant bits
        assert_eq!((a.0 >> 62) & 0x3, 0b10);
    }
}
