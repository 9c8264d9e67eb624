//! Reconnection behaviour seen from the service.

use std::time::Duration;

use tokio::time::Instant;

use alarm_core::Event;
use alarm_link::test_utils::ConnectOutcome;

use crate::{settle, spawn_agent};

#[tokio::test(start_paused = true)]
async fn test_refused_connections_back_off_then_connect() {
    let mut agent = spawn_agent(false);
    for _ in 0..4 {
        agent
            .server
            .push(ConnectOutcome::Refuse("connection refused".to_string()));
    }

    let started = Instant::now();
    agent.handle.start_core();
    let _peer = agent.server.next_peer().await;
    settle().await;

    // 5s + 10s + 20s + 40s
    assert_eq!(started.elapsed().as_secs(), 75);
    assert_eq!(agent.server.attempts(), 5);
    assert_eq!(agent.observer.count(&Event::ServerStarted), 1);
    assert_eq!(agent.handle.channel().current_delay(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_commands_work_after_reconnect() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();

    let first = agent.server.next_peer().await;
    first.fail("broken pipe").await;
    settle().await;
    assert_eq!(agent.observer.lost().len(), 1);

    let second = agent.server.next_peer().await;
    second.send_text(r#"{"action":"play"}"#).await;
    settle().await;

    assert!(agent.handle.state().alarm_playing);
    assert_eq!(agent.observer.count(&Event::ServerStarted), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ends_location_streaming() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let first = agent.server.next_peer().await;
    first.send_text(r#"{"action":"location_on"}"#).await;
    settle().await;
    assert!(agent.handle.state().location_enabled);

    first.close("going away").await;
    settle().await;

    assert!(!agent.handle.state().location_enabled);
    assert_eq!(agent.location.active_subscriptions(), 0);
    assert_eq!(agent.observer.count(&Event::LocationStopped), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_after_stop_reconnects() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let _first = agent.server.next_peer().await;
    settle().await;

    agent.handle.stop_core();
    settle().await;
    assert!(!agent.handle.state().connected);

    agent.handle.start_core();
    let _second = agent.server.next_peer().await;
    settle().await;

    assert!(agent.handle.state().connected);
    assert_eq!(agent.server.attempts(), 2);
    assert_eq!(agent.observer.connecting(), 2);
}
