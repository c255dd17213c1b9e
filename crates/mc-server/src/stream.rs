//! Socket-backed framed streams.
//!
//! The input side owns a background reader that pulls 1024-byte chunks off
//! the socket, pushes them through the decrypt cipher once encryption is
//! on, and appends to a shared buffer. The output side buffers framed
//! packet bytes and encrypts the whole buffer on flush.
//!
//! Frame layout (both directions):
//!
//! ```text
//! outer_length (varint)
//!   if threshold < 0:             varint(id) | payload
//!   elif body_len < threshold:    varint(0)  | varint(id) | payload
//!   else:                         varint(body_len) | zlib(varint(id) | payload)
//! ```

use std::collections::VecDeque;
use std::io::{Read as _, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use mc_crypto::{Aes128Cfb8Dec, Aes128Cfb8Enc, decrypt_in_place, encrypt_in_place};
use mc_protocol::ByteBuffer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{ConnectionError, ProtocolViolation, Result};

/// Size of each socket recv.
pub const RECV_CHUNK: usize = 1024;

/// How long blocking reads wait between stop-flag checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The cipher half of a connection's encryption guard. Once `enabled` flips,
/// every byte in either direction passes through the matching context
/// exactly once; the flag and both contexts are installed under one lock.
#[derive(Default)]
pub struct CipherState {
    pub enabled: bool,
    pub encrypt: Option<Aes128Cfb8Enc>,
    pub decrypt: Option<Aes128Cfb8Dec>,
}

impl CipherState {
    /// Atomically turns encryption on with the given contexts.
    pub fn install(&mut self, encrypt: Aes128Cfb8Enc, decrypt: Aes128Cfb8Dec) {
        self.encrypt = Some(encrypt);
        self.decrypt = Some(decrypt);
        self.enabled = true;
    }
}

pub type SharedCiphers = Arc<Mutex<CipherState>>;

struct InputShared {
    buffer: Mutex<VecDeque<u8>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Buffered inbound byte stream fed by a background reader task.
pub struct PacketInputStream {
    shared: Arc<InputShared>,
    stop: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl PacketInputStream {
    /// Spawns the reader task over the socket's read half.
    pub fn spawn<R>(mut read_half: R, ciphers: SharedCiphers, stop: Arc<AtomicBool>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(InputShared {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn({
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            async move {
                let mut chunk = [0u8; RECV_CHUNK];
                loop {
                    if stop.load(Ordering::Acquire) || shared.closed.load(Ordering::Acquire) {
                        break;
                    }
                    match read_half.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut data = chunk[..n].to_vec();
                            {
                                let mut ciphers = ciphers.lock().expect("cipher lock");
                                if ciphers.enabled {
                                    if let Some(decrypt) = ciphers.decrypt.as_mut() {
                                        decrypt_in_place(decrypt, &mut data);
                                    }
                                }
                            }
                            shared.buffer.lock().expect("input buffer lock").extend(data);
                            shared.notify.notify_waiters();
                        }
                    }
                }
                shared.closed.store(true, Ordering::Release);
                shared.notify.notify_waiters();
            }
        });
        Self {
            shared,
            stop,
            reader,
        }
    }

    /// Bytes currently buffered and ready to read.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.buffer.lock().expect("input buffer lock").len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Waits until data is buffered, the stream closes, or `timeout` passes.
    pub async fn wait_data(&self, timeout: Duration) {
        if self.available() > 0 || self.is_closed() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.shared.notify.notified()).await;
    }

    /// Consumes exactly `n` bytes from the front of the buffer, waiting for
    /// the reader as needed. Stop requests and peer close surface as
    /// [`ConnectionError::Closed`].
    pub async fn read(&self, n: usize) -> Result<Vec<u8>> {
        loop {
            {
                let mut buffer = self.shared.buffer.lock().expect("input buffer lock");
                if buffer.len() >= n {
                    return Ok(buffer.drain(..n).collect());
                }
            }
            if self.is_closed() || self.stop.load(Ordering::Acquire) {
                return Err(ConnectionError::Closed);
            }
            let _ = tokio::time::timeout(POLL_INTERVAL, self.shared.notify.notified()).await;
        }
    }

    async fn read_u8(&self) -> Result<u8> {
        Ok(self.read(1).await?[0])
    }

    /// Reads the outer frame-length VarInt byte by byte.
    async fn read_length_varint(&self) -> Result<i32> {
        let mut result = 0i32;
        let mut shift = 0;
        loop {
            let byte = self.read_u8().await?;
            result |= ((byte & 0x7F) as i32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 32 {
                return Err(ProtocolViolation::MalformedFrame("over-long length VarInt").into());
            }
        }
        Ok(result)
    }

    /// Reads one whole frame and splits it into packet id and payload.
    pub async fn read_frame(&self, compress_threshold: i32) -> Result<(i32, ByteBuffer)> {
        let length = self.read_length_varint().await?;
        if length <= 0 {
            return Err(ProtocolViolation::MalformedFrame("non-positive frame length").into());
        }
        let frame = self.read(length as usize).await?;
        trace!(length, "frame received");
        let mut buffer = ByteBuffer::wrap(frame);
        decode_frame_body(&mut buffer, compress_threshold)
    }

    /// Tears down the reader task.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
        self.reader.abort();
    }
}

impl Drop for PacketInputStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Buffered outbound stream; bytes written here hit the socket on `flush`,
/// passing through the encrypt cipher when encryption is on.
pub struct PacketOutputStream<W> {
    write_half: W,
    buffer: Vec<u8>,
    ciphers: SharedCiphers,
}

impl<W> PacketOutputStream<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(write_half: W, ciphers: SharedCiphers) -> Self {
        Self {
            write_half,
            buffer: Vec::new(),
            ciphers,
        }
    }

    /// Appends framed packet bytes to the pending buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Encrypts (when enabled) and sends everything buffered so far.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut data = std::mem::take(&mut self.buffer);
        {
            let mut ciphers = self.ciphers.lock().expect("cipher lock");
            if ciphers.enabled {
                if let Some(encrypt) = ciphers.encrypt.as_mut() {
                    encrypt_in_place(encrypt, &mut data);
                }
            }
        }
        self.write_half.write_all(&data).await?;
        self.write_half.flush().await?;
        Ok(())
    }
}

/// Splits a deframed packet (everything after the outer length) into packet
/// id and payload, inflating the body when the compression envelope says so.
///
/// Compressed frames whose declared uncompressed size is below the threshold
/// are rejected; uncompressed frames of any size are accepted.
pub fn decode_frame_body(
    buffer: &mut ByteBuffer,
    compress_threshold: i32,
) -> Result<(i32, ByteBuffer)> {
    let mut body = if compress_threshold >= 0 {
        let data_len = buffer.read_varint().map_err(ConnectionError::Corrupted)?;
        if data_len == 0 {
            let remaining = buffer.remaining();
            ByteBuffer::wrap(buffer.read(remaining).map_err(ConnectionError::Corrupted)?.to_vec())
        } else {
            if data_len < compress_threshold {
                return Err(ProtocolViolation::CompressedBelowThreshold {
                    length: data_len.max(0) as usize,
                    threshold: compress_threshold,
                }
                .into());
            }
            let remaining = buffer.remaining();
            let compressed = buffer.read(remaining).map_err(ConnectionError::Corrupted)?;
            let mut inflated = Vec::new();
            ZlibDecoder::new(compressed)
                .read_to_end(&mut inflated)
                .map_err(|_| ProtocolViolation::MalformedFrame("bad zlib body"))?;
            if inflated.len() != data_len as usize {
                return Err(
                    ProtocolViolation::MalformedFrame("uncompressed length mismatch").into(),
                );
            }
            ByteBuffer::wrap(inflated)
        }
    } else {
        let remaining = buffer.remaining();
        ByteBuffer::wrap(buffer.read(remaining).map_err(ConnectionError::Corrupted)?.to_vec())
    };
    let packet_id = body.read_varint().map_err(ConnectionError::Corrupted)?;
    Ok((packet_id, body))
}

/// Assembles the full clientbound frame for a packet id and payload.
pub fn encode_frame(packet_id: i32, payload: &[u8], compress_threshold: i32) -> Result<Bytes> {
    let mut body = Vec::new();
    mc_protocol::write_varint(&mut body, packet_id).map_err(ConnectionError::Corrupted)?;
    body.extend_from_slice(payload);

    let mut inner = Vec::new();
    if compress_threshold < 0 {
        inner = body;
    } else if body.len() < compress_threshold as usize {
        mc_protocol::write_varint(&mut inner, 0).map_err(ConnectionError::Corrupted)?;
        inner.extend_from_slice(&body);
    } else {
        mc_protocol::write_varint(&mut inner, body.len() as i32)
            .map_err(ConnectionError::Corrupted)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        let compressed = encoder.finish()?;
        inner.extend_from_slice(&compressed);
    }

    let mut length_prefix = Vec::new();
    mc_protocol::write_varint(&mut length_prefix, inner.len() as i32)
        .map_err(ConnectionError::Corrupted)?;

    let mut frame = BytesMut::with_capacity(length_prefix.len() + inner.len());
    frame.put_slice(&length_prefix);
    frame.put_slice(&inner);
    Ok(frame.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_crypto::gen_ciphers;

    fn deframe(frame: &[u8], threshold: i32) -> Result<(i32, Vec<u8>)> {
        let mut buffer = ByteBuffer::wrap(frame.to_vec());
        let outer = buffer.read_varint().unwrap();
        assert_eq!(outer as usize, buffer.remaining());
        let inner = buffer.read(outer as usize).unwrap().to_vec();
        let (id, mut body) = decode_frame_body(&mut ByteBuffer::wrap(inner), threshold)?;
        let remaining = body.remaining();
        Ok((id, body.read(remaining).unwrap().to_vec()))
    }

    #[test]
    fn frame_round_trip_no_compression() {
        let frame = encode_frame(0x01, b"payload", -1).unwrap();
        let (id, body) = deframe(&frame, -1).unwrap();
        assert_eq!(id, 0x01);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn frame_below_threshold_is_marked_uncompressed() {
        let frame = encode_frame(0x02, b"tiny", 256).unwrap();
        // outer length, then a 0 data-length marker
        let mut buffer = ByteBuffer::wrap(frame.to_vec());
        let _outer = buffer.read_varint().unwrap();
        assert_eq!(buffer.read_varint().unwrap(), 0);
        let (id, body) = deframe(&frame, 256).unwrap();
        assert_eq!(id, 0x02);
        assert_eq!(body, b"tiny");
    }

    #[test]
    fn frame_above_threshold_round_trips_compressed() {
        let payload = vec![7u8; 1024];
        let frame = encode_frame(0x03, &payload, 64).unwrap();
        assert!(frame.len() < payload.len()); // actually compressed
        let (id, body) = deframe(&frame, 64).unwrap();
        assert_eq!(id, 0x03);
        assert_eq!(body, payload);
    }

    #[test]
    fn compressed_frame_below_threshold_rejected() {
        // Forge a compressed frame whose declared size is under the threshold.
        let mut body = Vec::new();
        mc_protocol::write_varint(&mut body, 0x01).unwrap();
        body.extend_from_slice(b"ab");
        let mut inner = Vec::new();
        mc_protocol::write_varint(&mut inner, body.len() as i32).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).unwrap();
        inner.extend_from_slice(&encoder.finish().unwrap());

        let result = decode_frame_body(&mut ByteBuffer::wrap(inner), 256);
        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(
                ProtocolViolation::CompressedBelowThreshold { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn input_stream_buffers_and_reads() {
        let (mut client, server) = tokio::io::duplex(4096);
        let ciphers: SharedCiphers = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));
        let input = PacketInputStream::spawn(server, ciphers, stop);

        client.write_all(b"hello").await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(input.read(5).await.unwrap(), b"hello");
        input.shutdown();
    }

    #[tokio::test]
    async fn streams_round_trip_encrypted_frames() {
        let secret = [5u8; 16];

        // Server side cipher state, installed mid-stream.
        let server_ciphers: SharedCiphers = Arc::default();
        let stop = Arc::new(AtomicBool::new(false));

        let (client, server) = tokio::io::duplex(4096);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, client_write) = tokio::io::split(client);

        let input = PacketInputStream::spawn(server_read, Arc::clone(&server_ciphers), stop);

        // Client writes one plaintext frame, then an encrypted one.
        let client_ciphers: SharedCiphers = Arc::default();
        let mut output = PacketOutputStream::new(client_write, Arc::clone(&client_ciphers));
        let plain_frame = encode_frame(0x00, b"plaintext", -1).unwrap();
        output.write(&plain_frame);
        output.flush().await.unwrap();

        let (id, mut body) = input.read_frame(-1).await.unwrap();
        assert_eq!(id, 0x00);
        assert_eq!(body.read(9).unwrap(), b"plaintext");

        // Flip encryption on both sides; key = IV = the shared secret, so
        // the client's encryptor pairs with the server's decryptor.
        let (client_enc, client_dec) = gen_ciphers(&secret).unwrap();
        let (server_enc, server_dec) = gen_ciphers(&secret).unwrap();
        client_ciphers.lock().unwrap().install(client_enc, client_dec);
        server_ciphers.lock().unwrap().install(server_enc, server_dec);

        let secret_frame = encode_frame(0x01, b"ciphertext", -1).unwrap();
        output.write(&secret_frame);
        output.flush().await.unwrap();

        let (id, mut body) = input.read_frame(-1).await.unwrap();
        assert_eq!(id, 0x01);
        assert_eq!(body.read(10).unwrap(), b"ciphertext");

        input.shutdown();
    }
}
