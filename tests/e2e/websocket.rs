//! The agent against a real WebSocket controller on localhost.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use alarm_app::test_utils::{ManualLocationProvider, RecordingAudio};
use alarm_app::{AlarmService, ControlAction, ServiceOptions};
use alarm_core::WireMessage;
use alarm_link::{BackoffPolicy, Transport, WebSocketTransport};

const WAIT: Duration = Duration::from_secs(5);

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("agent connects")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .unwrap();
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn test_play_over_websocket_then_shutdown_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let audio = Arc::new(RecordingAudio::default());
    let service = AlarmService::new(
        WebSocketTransport::new(url, None),
        audio.clone(),
        Arc::new(ManualLocationProvider::available()),
        ServiceOptions {
            backoff: BackoffPolicy::default(),
            report_state_changes: true,
        },
    );
    let handle = service.handle();
    let (actions, actions_rx) = mpsc::channel(4);
    let task = tokio::spawn(service.run(actions_rx));

    handle.start_core();
    let mut ws = accept(&listener).await;

    ws.send(Message::Text(r#"{"action":"play"}"#.into()))
        .await
        .unwrap();
    let reply = next_text(&mut ws).await;
    assert_eq!(
        WireMessage::parse(&reply).unwrap(),
        WireMessage::Status {
            event: "alarm_started".to_string()
        }
    );
    assert_eq!(audio.starts(), 1);
    assert!(handle.state().connected);

    actions.send(ControlAction::Quit).await.unwrap();
    task.await.unwrap();

    // Stopping the alarm on shutdown is reported before the close
    let reply = next_text(&mut ws).await;
    assert_eq!(
        WireMessage::parse(&reply).unwrap(),
        WireMessage::Status {
            event: "alarm_stopped".to_string()
        }
    );

    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("close within timeout")
            .expect("stream open")
            .unwrap();
        if let Message::Close(frame) = msg {
            let frame = frame.expect("close frame");
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason.as_str(), "Service destroyed");
            break;
        }
    }
}

#[tokio::test]
async fn test_keep_alive_pings() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let transport = WebSocketTransport::new(url, Some(Duration::from_millis(20)));

    let (link, mut ws) = tokio::join!(transport.connect(), accept(&listener));
    let _link = link.unwrap();

    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("ping within timeout")
            .expect("stream open")
            .unwrap();
        if matches!(msg, Message::Ping(_)) {
            break;
        }
    }
}
