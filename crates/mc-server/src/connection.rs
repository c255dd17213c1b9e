//! Per-connection state and the dispatcher task.
//!
//! Each accepted socket gets one dispatcher task owning the connection
//! state and both stream halves (the input stream runs its own background
//! reader). The loop: leave on close, decode-and-handle inbound frames,
//! run the initial configuration step once the client settings arrived,
//! then drain the server-initiated bundle queue.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use mc_crypto::ServerKeyPair;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ConnectionError, ProtocolViolation, Result};
use crate::packet::configuration::CFinishConfiguration;
use crate::packet::{ClientboundPacket, ServerboundPacket};
use crate::protocol::ConnectionState;
use crate::stream::{PacketInputStream, PacketOutputStream, SharedCiphers};

/// Most packets one bundle may group.
pub const MAX_BUNDLE_SIZE: usize = 4096;

const IDLE_WAIT: Duration = Duration::from_millis(50);
const RESPONSE_POLL: Duration = Duration::from_millis(100);

/// The client settings snapshot from Client Information.
#[derive(Debug, Clone)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub displayed_skin_parts: u8,
    pub main_hand: i32,
    pub enable_text_filtering: bool,
    pub allow_server_listings: bool,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: "en_us".to_string(),
            view_distance: 10,
            chat_mode: 0,
            chat_colors: true,
            displayed_skin_parts: 0x7f,
            main_hand: 1,
            enable_text_filtering: false,
            allow_server_listings: true,
        }
    }
}

/// Snapshot plus the two flags the configuration step runs on.
#[derive(Debug, Default)]
pub struct ClientInfoState {
    pub config_ready: bool,
    pub initial_config_sent: bool,
    pub info: ClientInformation,
}

/// Per-connection mutable state, owned by the dispatcher task. The cipher
/// state and the client-information snapshot sit behind their own locks
/// because the reader task and server-side callers look at them too.
pub struct PacketConnectionState {
    pub config: Arc<ServerConfig>,
    pub state: ConnectionState,
    /// Effective threshold; stays -1 until a Set Compression went out.
    pub compress_threshold: i32,
    pub client_ip: String,
    pub username: Option<String>,
    pub connection_id: u64,
    pub unique_message_id: i32,
    pub protocol_version: Option<i32>,
    pub client_information: Arc<StdMutex<ClientInfoState>>,
    pub ciphers: SharedCiphers,
    pub keypair: Option<ServerKeyPair>,
    pub verify_token: [u8; 4],
}

impl PacketConnectionState {
    fn new(
        config: Arc<ServerConfig>,
        connection_id: u64,
        client_ip: String,
        ciphers: SharedCiphers,
    ) -> Self {
        Self {
            config,
            state: ConnectionState::Handshake,
            compress_threshold: -1,
            client_ip,
            username: None,
            connection_id,
            unique_message_id: rand::random(),
            protocol_version: None,
            client_information: Arc::new(StdMutex::new(ClientInfoState::default())),
            ciphers,
            keypair: None,
            verify_token: [0x12, 0x34, 0x56, 0x78],
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let config = ServerConfig {
            online_mode: false,
            ..ServerConfig::default()
        };
        Self::new(
            Arc::new(config),
            0,
            "127.0.0.1:0".to_string(),
            Arc::default(),
        )
    }
}

#[derive(Default)]
struct BundleShared {
    /// Serializes concurrent `send_packets` callers: first come, first
    /// served between calls, FIFO within one.
    sender_lock: AsyncMutex<()>,
    queue: StdMutex<VecDeque<ClientboundPacket>>,
    response: StdMutex<Option<ServerboundPacket>>,
    response_notify: Notify,
    closed: AtomicBool,
}

/// Cheap handle for server-initiated sends and interrupts.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    bundle: Arc<BundleShared>,
    stop: Arc<AtomicBool>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueues a bundle of clientbound packets and waits until the
    /// dispatcher has flushed them and captured the client's next packet,
    /// which is returned. Packets within one call go out in order.
    pub async fn send_packets(
        &self,
        packets: Vec<ClientboundPacket>,
    ) -> Result<ServerboundPacket> {
        if packets.len() > MAX_BUNDLE_SIZE {
            return Err(ProtocolViolation::BundleTooLarge(packets.len()).into());
        }
        let _guard = self.bundle.sender_lock.lock().await;
        if self.bundle.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }
        *self.bundle.response.lock().expect("response lock") = None;
        self.bundle
            .queue
            .lock()
            .expect("bundle queue lock")
            .extend(packets);
        loop {
            if let Some(response) = self.bundle.response.lock().expect("response lock").take() {
                return Ok(response);
            }
            if self.bundle.closed.load(Ordering::Acquire) {
                return Err(ConnectionError::Closed);
            }
            let _ = tokio::time::timeout(RESPONSE_POLL, self.bundle.response_notify.notified())
                .await;
        }
    }

    /// Asks the dispatcher to stop; it notices between blocking reads.
    pub fn interrupt(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// One accepted client connection and its dispatcher task.
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    handle: ConnectionHandle,
    task: JoinHandle<()>,
}

impl Connection {
    /// Takes ownership of the socket and spawns the dispatcher.
    pub fn spawn(stream: TcpStream, peer: SocketAddr, id: u64, config: Arc<ServerConfig>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let bundle = Arc::new(BundleShared::default());
        let ciphers: SharedCiphers = Arc::default();

        let (read_half, write_half) = stream.into_split();
        let input = PacketInputStream::spawn(read_half, Arc::clone(&ciphers), Arc::clone(&stop));
        let output = PacketOutputStream::new(write_half, Arc::clone(&ciphers));
        let p_state = PacketConnectionState::new(config, id, peer.to_string(), ciphers);

        let handle = ConnectionHandle {
            id,
            bundle: Arc::clone(&bundle),
            stop: Arc::clone(&stop),
        };
        let task = tokio::spawn(run(p_state, input, output, bundle, stop));
        Self {
            id,
            peer,
            handle,
            task,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the dispatcher to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn run(
    mut p_state: PacketConnectionState,
    input: PacketInputStream,
    mut output: PacketOutputStream<OwnedWriteHalf>,
    bundle: Arc<BundleShared>,
    stop: Arc<AtomicBool>,
) {
    let id = p_state.connection_id;
    let peer = p_state.client_ip.clone();
    match dispatch_loop(&mut p_state, &input, &mut output, &bundle, &stop).await {
        Ok(()) => info!(connection = id, peer = %peer, "connection closed"),
        Err(ConnectionError::Closed) => {
            info!(connection = id, peer = %peer, "peer disconnected");
        }
        Err(err) => warn!(connection = id, peer = %peer, error = %err, "closing connection"),
    }
    input.shutdown();
    bundle.closed.store(true, Ordering::Release);
    bundle.response_notify.notify_waiters();
}

async fn dispatch_loop(
    p_state: &mut PacketConnectionState,
    input: &PacketInputStream,
    output: &mut PacketOutputStream<OwnedWriteHalf>,
    bundle: &BundleShared,
    stop: &AtomicBool,
) -> Result<()> {
    loop {
        if stop.load(Ordering::Acquire) || p_state.state == ConnectionState::Close {
            return Ok(());
        }

        // Inbound data first: decode one frame and let the packet drive the
        // state machine.
        if input.available() > 0 {
            let (id, mut body) = input.read_frame(p_state.compress_threshold).await?;
            let packet = ServerboundPacket::decode(p_state.state, id, &mut body)?;
            let replies = packet.handle(p_state).await?;
            if !replies.is_empty() {
                for reply in &replies {
                    let frame = reply.get_bytes(p_state)?;
                    output.write(&frame);
                }
                output.flush().await?;
            }
            continue;
        }

        // Quiet socket: once the client settings are in and the initial
        // configuration has not run yet, finish configuration now.
        if p_state.state == ConnectionState::Configuration {
            let pending = {
                let client_info = p_state.client_information.lock().expect("client info lock");
                client_info.config_ready && !client_info.initial_config_sent
            };
            if pending {
                initial_configuration(p_state, input, output).await?;
                continue;
            }
        }

        // Drain server-initiated bundles: send FIFO, then capture the
        // client's next packet for the waiting caller.
        let queued: Vec<ClientboundPacket> = {
            let mut queue = bundle.queue.lock().expect("bundle queue lock");
            queue.drain(..).collect()
        };
        if !queued.is_empty() {
            for packet in &queued {
                let frame = packet.get_bytes(p_state)?;
                output.write(&frame);
            }
            output.flush().await?;
            let (id, mut body) = input.read_frame(p_state.compress_threshold).await?;
            let response = ServerboundPacket::decode(p_state.state, id, &mut body)?;
            *bundle.response.lock().expect("response lock") = Some(response);
            bundle.response_notify.notify_waiters();
            continue;
        }

        if input.is_closed() {
            return Err(ConnectionError::Closed);
        }
        input.wait_data(IDLE_WAIT).await;
    }
}

/// The initial configuration exchange: run the hook, emit Finish
/// Configuration, and require the client's acknowledgement as the very next
/// frame.
async fn initial_configuration(
    p_state: &mut PacketConnectionState,
    input: &PacketInputStream,
    output: &mut PacketOutputStream<OwnedWriteHalf>,
) -> Result<()> {
    initial_configuration_hook(p_state);
    {
        let mut client_info = p_state.client_information.lock().expect("client info lock");
        client_info.initial_config_sent = true;
    }
    let finish = ClientboundPacket::FinishConfiguration(CFinishConfiguration);
    let frame = finish.get_bytes(p_state)?;
    output.write(&frame);
    output.flush().await?;

    let (id, mut body) = input.read_frame(p_state.compress_threshold).await?;
    if id != 0x03 {
        return Err(ProtocolViolation::MissingConfigurationAck(id).into());
    }
    let packet = ServerboundPacket::decode(p_state.state, id, &mut body)?;
    let replies = packet.handle(p_state).await?;
    debug_assert!(replies.is_empty());
    Ok(())
}

/// Per-connection hook between the settings snapshot and Finish
/// Configuration. Registry and feature-flag sync belong to the gameplay
/// core; the engine only records what it saw.
fn initial_configuration_hook(p_state: &mut PacketConnectionState) {
    let client_info = p_state.client_information.lock().expect("client info lock");
    debug!(
        connection = p_state.connection_id,
        locale = %client_info.info.locale,
        view_distance = client_info.info.view_distance,
        "initial configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_protocol::ByteBuffer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    async fn read_client_frame(client: &mut TcpStream) -> (i32, ByteBuffer) {
        let mut length = 0i32;
        let mut shift = 0;
        loop {
            let byte = client.read_u8().await.unwrap();
            length |= ((byte & 0x7F) as i32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut frame = vec![0u8; length as usize];
        client.read_exact(&mut frame).await.unwrap();
        let mut buffer = ByteBuffer::wrap(frame);
        let id = buffer.read_varint().unwrap();
        (id, buffer)
    }

    fn test_config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            online_mode: false,
            ..ServerConfig::default()
        })
    }

    #[tokio::test]
    async fn status_request_gets_json_response() {
        let (mut client, server) = socket_pair().await;
        let peer = server.peer_addr().unwrap();
        let connection = Connection::spawn(server, peer, 0, test_config());

        // handshake (next = status) + status request, framed
        let mut handshake = ByteBuffer::new();
        handshake.write_varint(769);
        handshake.write_string("localhost", 256).unwrap();
        handshake.write_u16(25565);
        handshake.write_varint(1);
        let frame = crate::stream::encode_frame(0x00, handshake.as_slice(), -1).unwrap();
        client.write_all(&frame).await.unwrap();
        let frame = crate::stream::encode_frame(0x00, &[], -1).unwrap();
        client.write_all(&frame).await.unwrap();

        let (id, mut body) = read_client_frame(&mut client).await;
        assert_eq!(id, 0x00);
        let json = body.read_string(32767).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"]["protocol"], 769);
        assert_eq!(value["description"]["text"], "Hello world!");

        connection.interrupt();
        connection.join().await;
    }

    #[tokio::test]
    async fn ping_gets_pong_then_close() {
        let (mut client, server) = socket_pair().await;
        let peer = server.peer_addr().unwrap();
        let connection = Connection::spawn(server, peer, 0, test_config());

        let mut handshake = ByteBuffer::new();
        handshake.write_varint(769);
        handshake.write_string("localhost", 256).unwrap();
        handshake.write_u16(25565);
        handshake.write_varint(1);
        let frame = crate::stream::encode_frame(0x00, handshake.as_slice(), -1).unwrap();
        client.write_all(&frame).await.unwrap();

        let mut ping = ByteBuffer::new();
        ping.write_i64(42);
        let frame = crate::stream::encode_frame(0x01, ping.as_slice(), -1).unwrap();
        client.write_all(&frame).await.unwrap();

        let (id, mut body) = read_client_frame(&mut client).await;
        assert_eq!(id, 0x01);
        assert_eq!(body.read_i64().unwrap(), 42);

        // The dispatcher reaches CLOSE and exits on its own.
        connection.join().await;
    }

    #[tokio::test]
    async fn interrupt_stops_an_idle_connection() {
        let (_client, server) = socket_pair().await;
        let peer = server.peer_addr().unwrap();
        let connection = Connection::spawn(server, peer, 7, test_config());
        assert!(!connection.is_finished());
        connection.interrupt();
        connection.join().await;
    }

    #[tokio::test]
    async fn oversized_bundle_is_rejected() {
        let (_client, server) = socket_pair().await;
        let peer = server.peer_addr().unwrap();
        let connection = Connection::spawn(server, peer, 1, test_config());
        let handle = connection.handle();

        let packets: Vec<ClientboundPacket> = (0..=MAX_BUNDLE_SIZE)
            .map(|_| {
                ClientboundPacket::FinishConfiguration(CFinishConfiguration)
            })
            .collect();
        let result = handle.send_packets(packets).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Protocol(
                ProtocolViolation::BundleTooLarge(_)
            ))
        ));

        connection.interrupt();
        connection.join().await;
    }
}
