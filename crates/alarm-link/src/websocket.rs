//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each successful [`connect`](Transport::connect) splits the socket and
//! spawns two pumps:
//!
//! ```text
//!   Link.outbound ──▶ writer pump ──▶ ws sink     (+ keep-alive pings)
//!   ws stream     ──▶ reader pump ──▶ Link.inbound
//! ```
//!
//! A write failure is reported on the inbound queue as [`Inbound::Failed`],
//! so the supervision loop sees read and write errors the same way. With
//! keep-alive enabled, a ping that gets no pong (or any other frame) back
//! before the next ping is due fails the link the same way, which catches
//! half-open connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use alarm_core::prelude::*;

use crate::transport::{Inbound, Link, Outbound, Transport, CLOSE_NORMAL};

/// Capacity of the outbound queue. Telemetry beyond this is dropped by the
/// channel rather than queued.
const OUTBOUND_CAPACITY: usize = 32;

/// Capacity of the inbound queue.
const INBOUND_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connects to the controller over `ws://` or `wss://`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    ping_interval: Option<Duration>,
}

impl WebSocketTransport {
    /// `ping_interval` of `None` disables keep-alive pings.
    pub fn new(url: impl Into<String>, ping_interval: Option<Duration>) -> Self {
        Self {
            url: url.into(),
            ping_interval,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Link> {
        debug!("Opening WebSocket to {}", self.url);
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| Error::transport(format!("Failed to connect to {}: {err}", self.url)))?;

        let (ws_sink, ws_stream) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(INBOUND_CAPACITY);

        let heard = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(run_reader(ws_stream, in_tx.clone(), Arc::clone(&heard)));
        let keep_alive = self.ping_interval.map(|period| KeepAlive {
            period,
            heard,
            reader: reader.abort_handle(),
        });
        tokio::spawn(run_writer(ws_sink, out_rx, in_tx, keep_alive));

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Ping schedule plus the liveness flag the reader sets on every frame.
struct KeepAlive {
    period: Duration,
    heard: Arc<AtomicBool>,
    reader: AbortHandle,
}

/// Drain the outbound queue into the socket, pinging on an interval.
async fn run_writer(
    mut ws_sink: SplitSink<WsStream, WsMessage>,
    mut out_rx: mpsc::Receiver<Outbound>,
    in_tx: mpsc::Sender<Inbound>,
    keep_alive: Option<KeepAlive>,
) {
    let mut ping = keep_alive.as_ref().map(|keep_alive| {
        let period = keep_alive.period;
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                match frame {
                    Some(Outbound::Text(text)) => {
                        if let Err(err) = ws_sink.send(WsMessage::Text(text.into())).await {
                            warn!("WebSocket write failed: {}", err);
                            let _ = in_tx.send(Inbound::Failed(err.to_string())).await;
                            return;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        send_close(&mut ws_sink, code, reason).await;
                        return;
                    }
                    None => {
                        // Link dropped without an explicit close
                        send_close(&mut ws_sink, CLOSE_NORMAL, String::new()).await;
                        return;
                    }
                }
            }

            _ = tick(&mut ping) => {
                if let Some(keep_alive) = &keep_alive {
                    if !keep_alive.heard.swap(false, Ordering::SeqCst) {
                        warn!("No pong within {:?}, dropping connection", keep_alive.period);
                        // The read half of a half-open socket never ends on its own
                        keep_alive.reader.abort();
                        let _ = in_tx
                            .send(Inbound::Failed(format!(
                                "no pong within {:?}",
                                keep_alive.period
                            )))
                            .await;
                        return;
                    }
                }
                if let Err(err) = ws_sink.send(WsMessage::Ping(Default::default())).await {
                    warn!("WebSocket keep-alive ping failed: {}", err);
                    let _ = in_tx.send(Inbound::Failed(err.to_string())).await;
                    return;
                }
                trace!("WebSocket ping sent");
            }
        }
    }
}

/// Forward socket frames to the inbound queue until the socket ends.
async fn run_reader(
    mut ws_stream: SplitStream<WsStream>,
    in_tx: mpsc::Sender<Inbound>,
    heard: Arc<AtomicBool>,
) {
    while let Some(frame) = ws_stream.next().await {
        if frame.is_ok() {
            heard.store(true, Ordering::SeqCst);
        }
        let inbound = match frame {
            Ok(WsMessage::Text(text)) => Inbound::Text(text.as_str().to_owned()),
            Ok(WsMessage::Close(frame)) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                    None => (None, String::new()),
                };
                debug!("WebSocket closed by peer: {:?} {}", code, reason);
                let _ = in_tx.send(Inbound::Closed { code, reason }).await;
                return;
            }
            Ok(_) => {
                // Ping/Pong/Binary; tungstenite answers pings itself
                continue;
            }
            Err(err) => {
                let _ = in_tx.send(Inbound::Failed(err.to_string())).await;
                return;
            }
        };

        if in_tx.send(inbound).await.is_err() {
            // The supervision loop dropped this link
            return;
        }
    }

    let _ = in_tx
        .send(Inbound::Closed {
            code: None,
            reason: "stream ended".to_string(),
        })
        .await;
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Send a Close frame, ignoring any write errors.
async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    let _ = ws_sink.send(WsMessage::Close(Some(frame))).await;
    let _ = ws_sink.close().await;
}
