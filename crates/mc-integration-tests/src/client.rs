//! A minimal protocol client for driving the server over a real socket.

use std::io::{Read as _, Write as _};
use std::net::SocketAddr;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use mc_crypto::{Aes128Cfb8Dec, Aes128Cfb8Enc, decrypt_in_place, encrypt_in_place, gen_ciphers};
use mc_protocol::{ByteBuffer, Uuid};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Client half of a connection: varint framing, optional compression
/// envelope, optional stream encryption.
pub struct TestClient {
    stream: TcpStream,
    compression_threshold: Option<i32>,
    encrypt: Option<Aes128Cfb8Enc>,
    decrypt: Option<Aes128Cfb8Dec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> eyre::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            compression_threshold: None,
            encrypt: None,
            decrypt: None,
        })
    }

    /// Turns on AES/CFB8 with key = IV = `secret`, mirroring the server's
    /// transition after the encryption response.
    pub fn enable_encryption(&mut self, secret: &[u8; 16]) -> eyre::Result<()> {
        let (encrypt, decrypt) = gen_ciphers(secret)?;
        self.encrypt = Some(encrypt);
        self.decrypt = Some(decrypt);
        Ok(())
    }

    pub fn set_compression(&mut self, threshold: i32) {
        self.compression_threshold = Some(threshold);
    }

    /// Sends pre-framed bytes, encrypting when enabled.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> eyre::Result<()> {
        let mut data = bytes.to_vec();
        if let Some(cipher) = self.encrypt.as_mut() {
            encrypt_in_place(cipher, &mut data);
        }
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Frames and sends one packet under the current compression settings.
    pub async fn send_packet(&mut self, packet_id: i32, payload: &[u8]) -> eyre::Result<()> {
        let mut body = Vec::new();
        mc_protocol::write_varint(&mut body, packet_id)?;
        body.extend_from_slice(payload);

        let mut inner = Vec::new();
        match self.compression_threshold {
            None => inner = body,
            Some(threshold) if (body.len() as i32) < threshold => {
                mc_protocol::write_varint(&mut inner, 0)?;
                inner.extend_from_slice(&body);
            }
            Some(_) => {
                mc_protocol::write_varint(&mut inner, body.len() as i32)?;
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&body)?;
                inner.extend_from_slice(&encoder.finish()?);
            }
        }

        let mut frame = Vec::new();
        mc_protocol::write_varint(&mut frame, inner.len() as i32)?;
        frame.extend_from_slice(&inner);
        self.send_raw(&frame).await
    }

    async fn read_decrypted(&mut self, n: usize) -> eyre::Result<Vec<u8>> {
        let mut data = vec![0u8; n];
        self.stream.read_exact(&mut data).await?;
        if let Some(cipher) = self.decrypt.as_mut() {
            decrypt_in_place(cipher, &mut data);
        }
        Ok(data)
    }

    async fn read_varint(&mut self) -> eyre::Result<i32> {
        let mut result = 0i32;
        let mut shift = 0;
        loop {
            let byte = self.read_decrypted(1).await?[0];
            result |= ((byte & 0x7F) as i32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 32 {
                eyre::bail!("VarInt too large");
            }
        }
        Ok(result)
    }

    /// Reads one clientbound packet; the returned buffer is positioned
    /// after the packet id.
    pub async fn read_packet(&mut self) -> eyre::Result<(i32, ByteBuffer)> {
        let length = self.read_varint().await?;
        let frame = self.read_decrypted(length.max(0) as usize).await?;
        let mut buffer = ByteBuffer::wrap(frame);

        let body = if self.compression_threshold.is_some() {
            let data_len = buffer.read_varint()?;
            let remaining = buffer.remaining();
            let rest = buffer.read(remaining)?.to_vec();
            if data_len == 0 {
                rest
            } else {
                let mut inflated = Vec::new();
                ZlibDecoder::new(rest.as_slice()).read_to_end(&mut inflated)?;
                eyre::ensure!(
                    inflated.len() == data_len as usize,
                    "uncompressed length mismatch"
                );
                inflated
            }
        } else {
            let remaining = buffer.remaining();
            buffer.read(remaining)?.to_vec()
        };

        let mut body = ByteBuffer::wrap(body);
        let packet_id = body.read_varint()?;
        debug!(packet_id, "clientbound packet");
        Ok((packet_id, body))
    }

    /// True when the server dropped the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut probe = [0u8; 1];
        matches!(
            tokio::time::timeout(
                std::time::Duration::from_secs(2),
                self.stream.read(&mut probe),
            )
            .await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    // Flow helpers.

    pub async fn send_handshake(&mut self, protocol: i32, next_state: i32) -> eyre::Result<()> {
        let mut body = ByteBuffer::new();
        body.write_varint(protocol);
        body.write_string("localhost", 256)?;
        body.write_u16(25565);
        body.write_varint(next_state);
        self.send_packet(0x00, body.as_slice()).await
    }

    pub async fn send_login_start(&mut self, username: &str, uuid: Uuid) -> eyre::Result<()> {
        let mut body = ByteBuffer::new();
        body.write_string(username, 16)?;
        body.write_uuid(uuid);
        self.send_packet(0x00, body.as_slice()).await
    }

    pub async fn send_client_information(&mut self, locale: &str) -> eyre::Result<()> {
        let mut body = ByteBuffer::new();
        body.write_string(locale, 16)?;
        body.write_i8(10); // view distance
        body.write_varint(0); // chat mode: enabled
        body.write_bool(true); // chat colors
        body.write_u8(0x7f); // skin parts
        body.write_varint(1); // main hand: right
        body.write_bool(false); // text filtering
        body.write_bool(true); // server listings
        self.send_packet(0x00, body.as_slice()).await
    }
}
