//! End-to-end relay tests against a loopback UDP server and an in-memory host.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use skywire_vpn::{Connection, Error, RelayState, VirtualInterface, DEFAULT_MAX_ATTEMPTS};
use tokio::time::{sleep, timeout, Instant};

const MAX_WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn outbound_packets_arrive_in_order_and_unmodified() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    let tunnel = MockTunnel::new();

    let packets = vec![ip_packet(40, 1), ip_packet(1500, 2), ip_packet(28, 3)];
    for p in &packets {
        host.push_outgoing(p.clone());
    }

    let conn = Arc::new(Connection::new(fast_config(&server), host.clone(), tunnel));
    let handle = conn.start();

    let mut buf = vec![0u8; 4096];
    for expected in &packets {
        let (n, _) = timeout(MAX_WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf[..n], expected.as_slice());
    }

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
    assert_eq!(conn.state(), RelayState::Stopped);
}

#[tokio::test]
async fn inbound_datagrams_reach_interface_and_control_messages_do_not() {
    let server = server().await;
    let (host, mut delivered) = MockHost::new();
    let tunnel = MockTunnel::new();

    let conn = Arc::new(Connection::new(fast_config(&server), host.clone(), tunnel.clone()));
    let handle = conn.start();

    wait_for_state(&conn, RelayState::is_connected).await;
    eventually(|| tunnel.local_addr().is_some()).await;
    let client = tunnel.local_addr().unwrap();
    assert_eq!(client.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));

    let packet = ip_packet(60, 7);
    server.send_to(&[0, 1, 2], client).await.unwrap();
    server.send_to(&packet, client).await.unwrap();

    let got = timeout(MAX_WAIT, delivered.recv()).await.unwrap().unwrap();
    assert_eq!(got, packet);

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
    assert!(delivered.try_recv().is_err());
}

#[tokio::test]
async fn idle_link_sends_keepalive() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let mut config = fast_config(&server);
    config.keepalive_interval_ms = 50;

    let conn = Arc::new(Connection::new(config, host, MockTunnel::new()));
    let handle = conn.start();

    let mut buf = [0u8; 64];
    let (n, _) = timeout(MAX_WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], &[0u8]);

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn keepalive_is_due_one_interval_after_the_last_send() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let mut config = fast_config(&server);
    config.keepalive_interval_ms = 300;

    let conn = Arc::new(Connection::new(config, host.clone(), MockTunnel::new()));
    let handle = conn.start();
    wait_for_state(&conn, RelayState::is_connected).await;

    // Traffic partway through the first interval.
    sleep(Duration::from_millis(120)).await;
    host.push_outgoing(ip_packet(40, 5));

    let mut buf = [0u8; 64];
    let (n, _) = timeout(MAX_WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 40);
    let sent_at = Instant::now();

    let (n, _) = timeout(MAX_WAIT, server.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], &[0u8]);
    let gap = sent_at.elapsed();
    assert!(gap >= Duration::from_millis(250), "keepalive too early: {gap:?}");
    assert!(gap < Duration::from_millis(450), "keepalive too late: {gap:?}");

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn silent_server_triggers_a_new_attempt() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let mut config = fast_config(&server);
    config.receive_timeout_ms = 100;

    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let conn = Arc::new(
        Connection::new(config, host.clone(), MockTunnel::new()).with_establish_listener(
            Arc::new(move |_iface: &Arc<dyn VirtualInterface>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ),
    );
    let handle = conn.start();

    eventually(|| host.establish_calls() >= 2).await;
    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();

    // Every established interface was announced once and closed once.
    assert_eq!(fired.load(Ordering::SeqCst), host.establish_calls());
    assert_eq!(host.closed.load(Ordering::SeqCst), host.establish_calls());
}

#[tokio::test]
async fn refused_protection_exhausts_attempts() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    host.protect_ok.store(false, Ordering::SeqCst);

    let mut config = fast_config(&server);
    config.max_attempts = 3;

    let conn = Connection::new(config, host.clone(), MockTunnel::new());
    let result = timeout(MAX_WAIT, conn.run()).await.unwrap();

    assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 3 })));
    assert_eq!(host.protect_calls(), 3);
    assert_eq!(host.establish_calls(), 0);
    assert!(matches!(conn.state(), RelayState::Failed(_)));
}

#[tokio::test]
async fn refused_protection_uses_the_default_budget() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    host.protect_ok.store(false, Ordering::SeqCst);

    let config = fast_config(&server);
    assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);

    let conn = Connection::new(config, host.clone(), MockTunnel::new());
    let result = timeout(MAX_WAIT, conn.run()).await.unwrap();

    assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 10 })));
    assert_eq!(host.protect_calls(), 10);
    assert_eq!(host.establish_calls(), 0);
}

#[tokio::test]
async fn refused_auxiliary_socket_aborts_the_attempt() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    host.refused_fds.lock().push(101);
    let tunnel = MockTunnel::with_auxiliary(vec![100, 101]);

    let mut config = fast_config(&server);
    config.max_attempts = 1;

    let conn = Connection::new(config, host.clone(), tunnel);
    let result = timeout(MAX_WAIT, conn.run()).await.unwrap();

    assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 1 })));
    assert_eq!(host.establish_calls(), 0);
    let protected = host.protected.lock();
    assert_eq!(protected.len(), 3);
    assert_eq!(&protected[1..], &[100, 101]);
}

#[tokio::test]
async fn stop_cuts_the_retry_pause_short() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    host.protect_ok.store(false, Ordering::SeqCst);

    let mut config = fast_config(&server);
    config.retry_interval_ms = 60_000;

    let conn = Arc::new(Connection::new(config, host.clone(), MockTunnel::new()));
    let handle = conn.start();
    wait_for_state(&conn, |s| matches!(s, RelayState::Reconnecting { .. })).await;

    conn.stop();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(host.protect_calls(), 1);
    assert_eq!(conn.state(), RelayState::Stopped);
}

#[tokio::test]
async fn interface_error_is_a_lost_connection() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    // Fail, connect then lose the link, fail, connect.
    host.establish_plan.lock().extend([false, true, false]);
    host.fail_next_reads(1);

    let mut config = fast_config(&server);
    config.max_attempts = 2;

    let conn = Arc::new(Connection::new(config, host.clone(), MockTunnel::new()));
    let handle = conn.start();

    eventually(|| host.establish_calls() == 4).await;
    wait_for_state(&conn, RelayState::is_connected).await;
    assert!(!handle.is_finished());

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
    assert_eq!(host.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connected_attempt_resets_the_failure_count() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    host.establish_plan.lock().push_back(true);
    host.establish_default.store(false, Ordering::SeqCst);

    let mut config = fast_config(&server);
    config.max_attempts = 3;
    config.receive_timeout_ms = 50;

    let conn = Connection::new(config, host.clone(), MockTunnel::new());
    let result = timeout(MAX_WAIT, conn.run()).await.unwrap();

    assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 3 })));
    // One connected attempt, then the full budget of failures.
    assert_eq!(host.establish_calls(), 4);
}

#[tokio::test]
async fn stop_before_start_touches_nothing() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let conn = Connection::new(fast_config(&server), host.clone(), MockTunnel::new());
    conn.stop();
    conn.stop();

    timeout(MAX_WAIT, conn.run()).await.unwrap().unwrap();
    assert_eq!(host.protect_calls(), 0);
    assert_eq!(host.establish_calls(), 0);
    assert_eq!(conn.state(), RelayState::Stopped);
}

#[tokio::test]
async fn stop_while_connected_ends_forwarding() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let conn = Arc::new(Connection::new(fast_config(&server), host.clone(), MockTunnel::new()));
    let handle = conn.start();
    wait_for_state(&conn, RelayState::is_connected).await;

    conn.stop();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(host.closed.load(Ordering::SeqCst), 1);

    host.push_outgoing(ip_packet(40, 9));
    let mut buf = [0u8; 64];
    assert!(timeout(Duration::from_millis(200), server.recv_from(&mut buf))
        .await
        .is_err());
}

#[tokio::test]
async fn sockets_are_protected_before_use() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();
    let tunnel = MockTunnel::with_auxiliary(vec![100, 101]);

    let conn = Arc::new(Connection::new(fast_config(&server), host.clone(), tunnel.clone()));
    let handle = conn.start();
    wait_for_state(&conn, RelayState::is_connected).await;

    {
        let protected = host.protected.lock();
        assert_eq!(protected.len(), 3);
        assert_eq!(&protected[1..], &[100, 101]);
    }
    assert!(tunnel.local_addr().is_some());

    let settings = host.last_settings.lock().clone().unwrap();
    assert_eq!(settings.session, "127.0.0.1");
    assert_eq!(settings.address, Ipv4Addr::new(192, 168, 255, 6));
    assert_eq!(settings.dns_servers, vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))]);
    assert_eq!(settings.routes.len(), 2);

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn second_run_is_rejected() {
    let server = server().await;
    let (host, _delivered) = MockHost::new();

    let conn = Arc::new(Connection::new(fast_config(&server), host, MockTunnel::new()));
    let handle = conn.start();
    wait_for_state(&conn, RelayState::is_connected).await;

    assert!(matches!(conn.run().await, Err(Error::AlreadyRunning)));

    conn.stop();
    timeout(MAX_WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn unresolvable_server_is_terminal() {
    let (host, _delivered) = MockHost::new();
    let config = skywire_vpn::RelayConfig::new("relay.invalid", 7000);

    let conn = Connection::new(config, host.clone(), MockTunnel::new());
    let result = timeout(Duration::from_secs(30), conn.run()).await.unwrap();

    assert!(matches!(result, Err(Error::DnsResolution(_))));
    assert_eq!(host.protect_calls(), 0);
}
