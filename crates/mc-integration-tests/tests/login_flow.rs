//! Offline-mode login, end to end: encryption negotiation, configuration,
//! entry into play, and a server-initiated bundle.

use mc_crypto::{RsaPadding, decode_public_key_der, encrypt_rsa};
use mc_integration_tests::{TestClient, TestServer};
use mc_protocol::Uuid;
use mc_server::ServerConfig;
use mc_server::packet::login::offline_uuid;
use mc_server::packet::{ClientboundPacket, ServerboundPacket, login};
use pretty_assertions::assert_eq;

/// Runs the login dance up to (and including) Login Success, leaving the
/// client stream encrypted. Returns the shared secret for reference.
async fn login(client: &mut TestClient, username: &str) -> eyre::Result<[u8; 16]> {
    client.send_handshake(769, 2).await?;
    client.send_login_start(username, Uuid(0)).await?;

    // Encryption Request: server id, public key DER, verify token, online flag.
    let (packet_id, mut body) = client.read_packet().await?;
    eyre::ensure!(packet_id == 0x01, "expected encryption request");
    let _server_id = body.read_string(20)?;
    let der_len = body.read_varint()?;
    let der = body.read(der_len as usize)?.to_vec();
    let token_len = body.read_varint()?;
    let token = body.read(token_len as usize)?.to_vec();
    let should_authenticate = body.read_bool()?;
    eyre::ensure!(!should_authenticate, "offline server must not authenticate");

    let public = decode_public_key_der(&der)?;
    let secret: [u8; 16] = rand::random();
    let mut response = mc_protocol::ByteBuffer::new();
    let encrypted_secret = encrypt_rsa(&public, &secret, RsaPadding::OaepSha1)?;
    response.write_varint(encrypted_secret.len() as i32);
    response.write(&encrypted_secret);
    let encrypted_token = encrypt_rsa(&public, &token, RsaPadding::OaepSha1)?;
    response.write_varint(encrypted_token.len() as i32);
    response.write(&encrypted_token);
    client.send_packet(0x01, response.as_slice()).await?;

    // Everything from here on is AES/CFB8 on both directions.
    client.enable_encryption(&secret)?;

    // Set Compression may precede Login Success.
    let (packet_id, mut body) = client.read_packet().await?;
    let (packet_id, mut body) = if packet_id == 0x03 {
        let threshold = body.read_varint()?;
        client.set_compression(threshold);
        client.read_packet().await?
    } else {
        (packet_id, body)
    };
    eyre::ensure!(packet_id == 0x02, "expected login success");
    let uuid = body.read_uuid()?;
    let name = body.read_string(16)?;
    assert_eq!(name, username);
    assert_eq!(uuid, offline_uuid(username));
    let property_count = body.read_varint()?;
    assert_eq!(property_count, 0);

    Ok(secret)
}

/// Configuration: acknowledge login, push client settings, wait for Finish
/// Configuration, acknowledge it.
async fn configure(client: &mut TestClient) -> eyre::Result<()> {
    client.send_packet(0x03, &[]).await?; // Login Acknowledged
    client.send_client_information("en_us").await?;

    let (packet_id, _) = client.read_packet().await?;
    eyre::ensure!(packet_id == 0x03, "expected finish configuration");
    client.send_packet(0x03, &[]).await?; // Finish Configuration Ack
    Ok(())
}

#[tokio::test]
async fn encrypted_login_reaches_play() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    login(&mut client, "TestPlayer").await.unwrap();
    configure(&mut client).await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn login_with_compression_enabled() {
    let server = TestServer::start_with(ServerConfig {
        online_mode: false,
        compression_threshold: 64,
        ..ServerConfig::default()
    })
    .await
    .unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    login(&mut client, "Compressed").await.unwrap();
    configure(&mut client).await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn server_initiated_bundle_round_trips() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    // Park the connection in the login state before the server-side send,
    // so the captured "next inbound packet" is the plugin response and not
    // the handshake itself.
    client.send_handshake(769, 2).await.unwrap();
    let handle = server.wait_for_connection().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Server pushes a plugin request; the client answers; the caller gets
    // the captured response back.
    let request = ClientboundPacket::LoginPluginRequest(login::CLoginPluginRequest {
        channel: "test:channel".to_string(),
        data: b"ping".to_vec(),
    });
    let send = tokio::spawn(async move { handle.send_packets(vec![request]).await });

    // Give the dispatcher a moment to reach the login state.
    let (packet_id, mut body) = client.read_packet().await.unwrap();
    assert_eq!(packet_id, 0x04);
    let message_id = body.read_varint().unwrap();
    let channel = body.read_string(32767).unwrap();
    assert_eq!(channel, "test:channel");

    let mut answer = mc_protocol::ByteBuffer::new();
    answer.write_varint(message_id);
    answer.write_bool(false); // not understood, like the Notchian client
    client.send_packet(0x02, answer.as_slice()).await.unwrap();

    let response = send.await.unwrap().unwrap();
    let ServerboundPacket::LoginPluginResponse(response) = response else {
        panic!("expected a login plugin response, got {response:?}");
    };
    assert_eq!(response.message_id, message_id);
    assert!(!response.successful);

    server.stop().await;
}
