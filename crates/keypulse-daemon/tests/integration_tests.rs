//! Integration tests for the keypulse display server.
//!
//! These run the real server on a loopback socket and act as a display
//! client would: read 8-byte stats packets, optionally answer with a
//! one-byte ack, and disconnect. Timing assertions stay generous because a
//! handler cycle spans a CPU sampling window, an ack timeout, and the
//! inter-cycle pause.

use std::net::SocketAddr;
use std::time::Duration;

use keypulse_daemon::{DaemonError, ServerEvent, StatsServer};
use keypulse_proto::{PACKET_LEN, StatsPacket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;

/// Generous upper bound for anything the server does on its own schedule.
const WAIT: Duration = Duration::from_secs(10);

async fn start_server() -> (StatsServer, UnboundedReceiver<ServerEvent>, SocketAddr) {
    let (server, events) = StatsServer::new();
    server
        .start("127.0.0.1", 0)
        .await
        .expect("server should start on an ephemeral port");
    let addr = server
        .local_addr()
        .expect("running server should expose its bound address");
    (server, events, addr)
}

/// Consume events until a connection count of `expected` is reported.
async fn wait_for_count(events: &mut UnboundedReceiver<ServerEvent>, expected: usize) {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a connection-count event")
            .expect("event channel closed");
        if let ServerEvent::ConnectionsChanged { count } = event {
            if count == expected {
                return;
            }
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> StatsPacket {
    let mut buf = [0u8; PACKET_LEN];
    timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for a stats packet")
        .expect("failed to read a full packet");
    StatsPacket::decode(&buf)
}

fn assert_in_range(packet: StatsPacket) {
    assert!(
        (0.0..=1.0).contains(&packet.cpu_fraction),
        "cpu fraction out of range: {}",
        packet.cpu_fraction
    );
    assert!(
        (0.0..=1.0).contains(&packet.mem_fraction),
        "mem fraction out of range: {}",
        packet.mem_fraction
    );
}

#[tokio::test]
async fn start_twice_fails() {
    let (server, _events, _addr) = start_server().await;

    let err = server.start("127.0.0.1", 0).await.unwrap_err();
    assert!(matches!(err, DaemonError::AlreadyRunning));
    assert!(server.is_running(), "failed restart must not stop the server");

    server.stop().await;
}

#[tokio::test]
async fn stop_when_not_running_is_a_noop() {
    let (server, mut events) = StatsServer::new();

    server.stop().await;

    assert!(!server.is_running());
    assert!(
        matches!(events.try_recv(), Err(TryRecvError::Empty)),
        "stopping a stopped server must fire no notifications"
    );
}

#[tokio::test]
async fn start_emits_status_and_stats_events() {
    let (server, mut events, _addr) = start_server().await;

    let mut saw_status = false;
    let mut saw_stats = false;
    while !(saw_status && saw_stats) {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for startup events")
            .expect("event channel closed");
        match event {
            ServerEvent::StatusChanged { running } => {
                assert!(running);
                saw_status = true;
            }
            ServerEvent::Stats { cpu, mem } => {
                assert!((0.0..=100.0).contains(&cpu));
                assert!((0.0..=100.0).contains(&mem));
                saw_stats = true;
            }
            _ => {}
        }
    }

    server.stop().await;
}

#[tokio::test]
async fn client_receives_decodable_packet() {
    let (server, _events, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let packet = read_packet(&mut client).await;
    assert_in_range(packet);

    server.stop().await;
}

#[tokio::test]
async fn missing_ack_keeps_the_connection() {
    let (server, mut events, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&mut events, 1).await;

    // Never ack; the server must keep pushing packets anyway.
    assert_in_range(read_packet(&mut client).await);
    assert_in_range(read_packet(&mut client).await);
    assert_in_range(read_packet(&mut client).await);

    server.stop().await;
}

#[tokio::test]
async fn client_disconnect_updates_count() {
    let (server, mut events, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&mut events, 1).await;
    let _ = read_packet(&mut client).await;

    drop(client);
    wait_for_count(&mut events, 0).await;

    server.stop().await;
}

#[tokio::test]
async fn stop_with_clients_notifies_once_and_closes_sockets() {
    let (server, mut events, addr) = start_server().await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&mut events, 2).await;

    server.stop().await;

    let mut stopped = 0;
    let mut zeroed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ServerEvent::StatusChanged { running: false } => stopped += 1,
            ServerEvent::ConnectionsChanged { count: 0 } => zeroed += 1,
            _ => {}
        }
    }
    assert_eq!(stopped, 1, "exactly one status-changed(false) expected");
    assert_eq!(zeroed, 1, "exactly one connection-count(0) expected");

    for client in [&mut first, &mut second] {
        let mut buf = [0u8; PACKET_LEN];
        loop {
            match timeout(WAIT, client.read(&mut buf))
                .await
                .expect("timed out waiting for the socket to close")
            {
                Ok(0) | Err(_) => break,
                Ok(_) => {} // buffered packets drain first
            }
        }
    }
}

#[tokio::test]
async fn full_display_session() {
    let (server, mut events, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&mut events, 1).await;

    let first = read_packet(&mut client).await;
    assert_in_range(first);

    // Any single byte is a valid ack; the next packet follows within the
    // cycle pause plus one sampling window.
    client.write_all(&[0xA5]).await.unwrap();
    let mut buf = [0u8; PACKET_LEN];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("second packet should arrive well within two seconds")
        .expect("failed to read the second packet");
    assert_in_range(StatsPacket::decode(&buf));

    drop(client);
    wait_for_count(&mut events, 0).await;

    server.stop().await;
}

#[tokio::test]
async fn restart_after_stop_works() {
    let (server, mut events, addr) = start_server().await;

    let client = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&mut events, 1).await;
    drop(client);

    server.stop().await;
    assert!(!server.is_running());

    server
        .start("127.0.0.1", 0)
        .await
        .expect("server should start again after stop");
    let addr = server.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert_in_range(read_packet(&mut client).await);

    server.stop().await;
}
