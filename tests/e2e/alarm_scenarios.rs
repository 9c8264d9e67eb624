//! Command scenarios over a live (in-memory) controller connection.

use std::time::Duration;

use alarm_app::ControlAction;
use alarm_core::{encode_event, Event, LocationFix, WireMessage};
use alarm_link::test_utils::ConnectOutcome;

use crate::{settle, spawn_agent};

// ─────────────────────────────────────────────────────────
// Alarm
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_connect_play_stop() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let peer = agent.server.next_peer().await;
    settle().await;
    assert!(agent.handle.state().connected);

    peer.send_text(r#"{"action":"play"}"#).await;
    settle().await;
    assert_eq!(agent.audio.starts(), 1);
    assert_eq!(agent.observer.count(&Event::AlarmStarted), 1);
    assert!(agent.handle.state().alarm_playing);

    peer.send_text(r#"{"action":"stop"}"#).await;
    settle().await;
    assert_eq!(agent.audio.stops(), 1);
    assert_eq!(agent.observer.count(&Event::AlarmStopped), 1);
    assert!(!agent.handle.state().alarm_playing);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_play_rings_once() {
    let mut agent = spawn_agent(true);
    agent.handle.start_core();
    let mut peer = agent.server.next_peer().await;

    for _ in 0..5 {
        peer.send_text(r#"{"action":"play"}"#).await;
    }
    settle().await;

    assert_eq!(agent.audio.starts(), 1);
    assert_eq!(agent.observer.count(&Event::AlarmStarted), 1);
    assert_eq!(
        peer.recv_text().await,
        Some(encode_event(&Event::AlarmStarted).unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_ignored() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let peer = agent.server.next_peer().await;

    peer.send_text(r#"{"action":"bogus"}"#).await;
    peer.send_text("{{{").await;
    peer.send_text(r#"{"volume":11}"#).await;
    peer.send_text(r#"{"action":"play"}"#).await;
    settle().await;

    assert!(agent.handle.is_connected());
    assert!(agent.handle.state().alarm_playing);
    assert_eq!(agent.server.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_alarm_keeps_ringing_through_disconnect() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let peer = agent.server.next_peer().await;
    peer.send_text(r#"{"action":"play"}"#).await;
    settle().await;

    peer.close("server restart").await;
    settle().await;

    let state = agent.handle.state();
    assert!(!state.connected);
    assert!(state.alarm_playing);
    assert_eq!(agent.audio.stops(), 0);
}

// ─────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_location_on_off_without_fix_sends_no_sample() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let mut peer = agent.server.next_peer().await;

    peer.send_text(r#"{"action":"location_on"}"#).await;
    peer.send_text(r#"{"action":"location_off"}"#).await;
    settle().await;
    agent.location.emit(LocationFix::new(52.1, 21.0));

    agent.handle.stop_core();
    // The only frame on the wire is the close
    assert!(matches!(
        peer.recv().await,
        Some(alarm_link::Outbound::Close { .. })
    ));
    assert_eq!(agent.observer.count(&Event::LocationStarted), 1);
    assert_eq!(agent.observer.count(&Event::LocationStopped), 1);
}

#[tokio::test(start_paused = true)]
async fn test_location_sample_round_trip() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let mut peer = agent.server.next_peer().await;

    peer.send_text(r#"{"action":"location_on"}"#).await;
    settle().await;
    agent.location.emit(LocationFix::new(52.1, 21.0));

    let text = peer.recv_text().await.expect("sample");
    match WireMessage::parse(&text).unwrap() {
        WireMessage::Location { lat, lng } => {
            assert!((lat - 52.1).abs() < 1e-9);
            assert!((lng - 21.0).abs() < 1e-9);
        }
        other => panic!("expected location, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_location_unavailable_absorbed() {
    let mut agent = spawn_agent(true);
    agent.location.set_available(false);
    agent.handle.start_core();
    let peer = agent.server.next_peer().await;

    peer.send_text(r#"{"action":"location_on"}"#).await;
    settle().await;

    assert!(!agent.handle.state().location_enabled);
    assert_eq!(agent.location.subscribes(), 0);
    assert_eq!(agent.observer.count(&Event::LocationStarted), 0);
}

// ─────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_stop_during_connect_produces_no_server_started() {
    let mut agent = spawn_agent(false);
    let (release, gate) = tokio::sync::oneshot::channel();
    agent.server.push(ConnectOutcome::Gate(gate));

    agent.handle.start_core();
    settle().await;
    agent.actions.send(ControlAction::StopCore).await.unwrap();
    settle().await;

    // The pending attempt was abandoned along with its gate
    assert!(release.is_closed());
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(agent.observer.count(&Event::ServerStarted), 0);
    assert_eq!(agent.observer.count(&Event::ServerStopped), 1);
    assert!(!agent.handle.state().connected);
    assert_eq!(agent.server.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_core_racing_play_leaves_alarm_silent() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let peer = agent.server.next_peer().await;
    settle().await;

    peer.send_text(r#"{"action":"play"}"#).await;
    agent.actions.send(ControlAction::StopCore).await.unwrap();
    settle().await;

    assert!(!agent.handle.state().alarm_playing);
    assert_eq!(agent.audio.starts(), agent.audio.stops());
    assert_eq!(agent.observer.count(&Event::ServerStopped), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quit_ends_run_loop() {
    let mut agent = spawn_agent(false);
    agent.handle.start_core();
    let _peer = agent.server.next_peer().await;
    settle().await;

    agent.actions.send(ControlAction::Quit).await.unwrap();
    agent.task.await.unwrap();

    assert!(!agent.handle.state().connected);
    assert!(!agent.handle.channel().should_reconnect());
}
