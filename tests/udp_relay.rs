//! End-to-end tests for the UDP relays on loopback

mod common;

use common::*;
use ssrelay::crypto::CipherKind;
use ssrelay::socks::TargetAddr;
use ssrelay::transport::Shadow;
use ssrelay::udp::run_relays;
use std::time::Duration;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(2);
const TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_tunnel_round_trip_through_remote() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Aes256Gcm);
    let remote = start_remote(shadow.clone(), TIMEOUT).await;
    let local = start_local(remote.addr, echo, shadow, TIMEOUT).await;

    let (client, _) = create_test_socket().await;
    for payload in [&b"ping"[..], &b"second datagram"[..]] {
        client.send_to(payload, local.addr).await.unwrap();
        let (data, from) = recv_within(&client, WAIT).await.unwrap();
        assert_eq!(data, payload);
        assert_eq!(from, local.addr);
    }

    assert_eq!(local.relay.session_count().await, 1);
    assert_eq!(remote.relay.session_count().await, 1);
}

#[tokio::test]
async fn test_tunnel_sessions_per_client() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Chacha20IetfPoly1305);
    let remote = start_remote(shadow.clone(), TIMEOUT).await;
    let local = start_local(remote.addr, echo, shadow, TIMEOUT).await;

    let (first, _) = create_test_socket().await;
    let (second, _) = create_test_socket().await;

    first.send_to(b"one", local.addr).await.unwrap();
    second.send_to(b"two", local.addr).await.unwrap();

    assert_eq!(recv_within(&first, WAIT).await.unwrap().0, b"one");
    assert_eq!(recv_within(&second, WAIT).await.unwrap().0, b"two");
    assert_eq!(local.relay.session_count().await, 2);
    assert_eq!(remote.relay.session_count().await, 2);
}

#[tokio::test]
async fn test_socks_round_trip_through_remote() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Aes128Gcm);
    let remote = start_remote(shadow.clone(), TIMEOUT).await;
    let socks = start_socks_local(remote.addr, shadow, TIMEOUT).await;

    let prefix = TargetAddr::from(echo).to_bytes();
    let mut datagram = vec![0, 0, 0];
    datagram.extend_from_slice(&prefix);
    datagram.extend_from_slice(b"hello");

    let (client, _) = create_test_socket().await;
    client.send_to(&datagram, socks.addr).await.unwrap();

    let (data, from) = recv_within(&client, WAIT).await.unwrap();
    assert_eq!(from, socks.addr);
    assert_eq!(data, datagram);
    assert_eq!(socks.relay.session_count().await, 1);
}

#[tokio::test]
async fn test_socks_drops_fragments() {
    let echo = spawn_echo_server().await;
    let shadow = Shadow::plain();
    let remote = start_remote(shadow.clone(), TIMEOUT).await;
    let socks = start_socks_local(remote.addr, shadow, TIMEOUT).await;

    let mut datagram = vec![0, 0, 1];
    datagram.extend_from_slice(&TargetAddr::from(echo).to_bytes());
    datagram.extend_from_slice(b"fragment");

    let (client, _) = create_test_socket().await;
    client.send_to(&datagram, socks.addr).await.unwrap();

    assert!(recv_within(&client, Duration::from_millis(300)).await.is_none());
    assert_eq!(socks.relay.session_count().await, 0);
}

#[tokio::test]
async fn test_idle_sessions_expire_and_reopen() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Aes256Gcm);
    let idle = Duration::from_millis(300);
    let remote = start_remote(shadow.clone(), idle).await;
    let local = start_local(remote.addr, echo, shadow, idle).await;

    let (client, _) = create_test_socket().await;
    client.send_to(b"first", local.addr).await.unwrap();
    assert_eq!(recv_within(&client, WAIT).await.unwrap().0, b"first");
    assert_eq!(local.relay.session_count().await, 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(local.relay.session_count().await, 0);
    assert_eq!(remote.relay.session_count().await, 0);

    client.send_to(b"again", local.addr).await.unwrap();
    assert_eq!(recv_within(&client, WAIT).await.unwrap().0, b"again");
    assert_eq!(local.relay.session_count().await, 1);
}

#[tokio::test]
async fn test_remote_survives_malformed_prefix() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Aes256Gcm);
    let remote = start_remote(shadow.clone(), TIMEOUT).await;

    let (socket, _) = create_test_socket().await;
    let client = shadow.wrap(socket);

    client.send_to(&[9, 1, 2, 3], remote.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut datagram = TargetAddr::from(echo).to_bytes();
    datagram.extend_from_slice(b"valid");
    client.send_to(&datagram, remote.addr).await.unwrap();

    let mut buf = vec![0u8; 65536];
    let (n, from) = tokio::time::timeout(WAIT, client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, remote.addr);
    assert_eq!(&buf[..n], &datagram[..]);
}

#[tokio::test]
async fn test_password_mismatch_gets_no_reply() {
    let echo = spawn_echo_server().await;
    let remote = start_remote(aead_shadow(CipherKind::Aes256Gcm), TIMEOUT).await;
    let wrong = Shadow::new(CipherKind::Aes256Gcm, "not-the-password").unwrap();
    let local = start_local(remote.addr, echo, wrong, TIMEOUT).await;

    let (client, _) = create_test_socket().await;
    client.send_to(b"ping", local.addr).await.unwrap();

    assert!(recv_within(&client, Duration::from_millis(300)).await.is_none());
    assert_eq!(remote.relay.session_count().await, 0);
}

#[tokio::test]
async fn test_shutdown_stops_relay() {
    let remote = start_remote(Shadow::plain(), TIMEOUT).await;
    remote.shutdown.send(true).unwrap();

    let result = tokio::time::timeout(WAIT, remote.handle).await.unwrap();
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_releases_ports_with_live_sessions() {
    let echo = spawn_echo_server().await;
    let shadow = aead_shadow(CipherKind::Aes256Gcm);
    let remote = start_remote(shadow.clone(), TIMEOUT).await;
    let local = start_local(remote.addr, echo, shadow.clone(), TIMEOUT).await;
    let socks = start_socks_local(remote.addr, shadow, TIMEOUT).await;

    let (client, _) = create_test_socket().await;
    client.send_to(b"ping", local.addr).await.unwrap();
    assert_eq!(recv_within(&client, WAIT).await.unwrap().0, b"ping");

    let mut datagram = vec![0, 0, 0];
    datagram.extend_from_slice(&TargetAddr::from(echo).to_bytes());
    datagram.extend_from_slice(b"pong");
    client.send_to(&datagram, socks.addr).await.unwrap();
    assert_eq!(recv_within(&client, WAIT).await.unwrap().0, datagram);

    assert_eq!(local.relay.session_count().await, 1);
    assert_eq!(socks.relay.session_count().await, 1);
    assert_eq!(remote.relay.session_count().await, 2);

    let mut addrs = Vec::new();
    for (addr, shutdown, handle) in [
        (local.addr, local.shutdown, local.handle),
        (socks.addr, socks.shutdown, socks.handle),
        (remote.addr, remote.shutdown, remote.handle),
    ] {
        shutdown.send(true).unwrap();
        let result = tokio::time::timeout(WAIT, handle).await.unwrap();
        assert!(result.unwrap().is_ok());
        addrs.push(addr);
    }

    assert_eq!(local.relay.session_count().await, 0);
    assert_eq!(socks.relay.session_count().await, 0);
    assert_eq!(remote.relay.session_count().await, 0);

    drop(local.relay);
    drop(socks.relay);
    drop(remote.relay);
    for addr in addrs {
        tokio::net::UdpSocket::bind(addr).await.unwrap();
    }
}

#[tokio::test]
async fn test_remote_reaches_ipv6_target() {
    let Some(echo) = spawn_echo_server_v6().await else {
        // Host without IPv6
        return;
    };
    let remote = start_remote(Shadow::plain(), TIMEOUT).await;

    let mut datagram = TargetAddr::from(echo).to_bytes();
    datagram.extend_from_slice(b"v6");

    let (client, _) = create_test_socket().await;
    client.send_to(&datagram, remote.addr).await.unwrap();

    let (data, from) = recv_within(&client, WAIT).await.unwrap();
    assert_eq!(from, remote.addr);
    assert_eq!(data, datagram);
}

#[tokio::test]
async fn test_remote_tags_ipv4_replies_as_ipv4() {
    let echo = spawn_echo_server().await;
    let remote = start_remote(Shadow::plain(), TIMEOUT).await;

    let mut datagram = TargetAddr::from(echo).to_bytes();
    datagram.extend_from_slice(b"v4");

    let (client, _) = create_test_socket().await;
    client.send_to(&datagram, remote.addr).await.unwrap();

    let (data, _) = recv_within(&client, WAIT).await.unwrap();
    assert_eq!(data[0], ssrelay::socks::SOCKS5_ADDR_TYPE_IPV4);
    assert_eq!(data, datagram);
}

#[tokio::test]
async fn test_run_relays_until_shutdown() {
    let config = TestConfigBuilder::new()
        .remote("127.0.0.1:0")
        .server("127.0.0.1:8488")
        .socks("127.0.0.1:0")
        .tunnel("127.0.0.1:0", "127.0.0.1:53")
        .build();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(run_relays(config, shutdown_rx));
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(WAIT, handle).await.unwrap();
    assert!(result.unwrap().is_ok());
}

#[tokio::test]
async fn test_run_relays_fails_when_nothing_starts() {
    let config = TestConfigBuilder::new()
        .method("none")
        .remote("not-an-address")
        .build();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    assert!(run_relays(config, shutdown_rx).await.is_err());
}
