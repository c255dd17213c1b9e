//! The status handshake, driven with the exact wire bytes a 1.19.3-era
//! client sends when pinging the server list.

use mc_integration_tests::{TestClient, TestServer};
use pretty_assertions::assert_eq;

/// Handshake: protocol 761, "localhost", port 25565, next state 1 (status).
const HANDSHAKE_FRAME: &[u8] = b"\x10\x00\xf9\x05\x09localhost\x63\xdd\x01";
/// Status request.
const STATUS_REQUEST_FRAME: &[u8] = b"\x01\x00";
/// Ping with the 8-byte payload 42.
const PING_FRAME: &[u8] = b"\x09\x01\x00\x00\x00\x00\x00\x00\x00\x2a";

#[tokio::test]
async fn status_request_returns_the_list_document() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    client.send_raw(HANDSHAKE_FRAME).await.unwrap();
    client.send_raw(STATUS_REQUEST_FRAME).await.unwrap();

    let (packet_id, mut body) = client.read_packet().await.unwrap();
    assert_eq!(packet_id, 0x00);
    let json = body.read_string(32767).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "version": {"name": "1.21.4", "protocol": 769},
            "players": {"max": 20, "online": 10, "sample": []},
            "description": {"text": "Hello world!"}
        })
    );

    server.stop().await;
}

#[tokio::test]
async fn ping_is_echoed_then_the_connection_drops() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    client.send_raw(HANDSHAKE_FRAME).await.unwrap();
    client.send_raw(STATUS_REQUEST_FRAME).await.unwrap();
    let (packet_id, _) = client.read_packet().await.unwrap();
    assert_eq!(packet_id, 0x00);

    client.send_raw(PING_FRAME).await.unwrap();
    let (packet_id, mut body) = client.read_packet().await.unwrap();
    assert_eq!(packet_id, 0x01);
    assert_eq!(body.read_i64().unwrap(), 42);

    // Pong transitions the connection to CLOSE; the socket goes away.
    assert!(client.is_closed().await);

    server.stop().await;
}

#[tokio::test]
async fn bad_next_state_closes_the_connection() {
    let server = TestServer::start().await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    client.send_handshake(769, 9).await.unwrap();
    assert!(client.is_closed().await);

    server.stop().await;
}
