//! Test utilities for the supervised channel
//!
//! Provides an in-memory [`Transport`] whose connect outcomes are scripted by
//! the test, plus the controller-side end of every link it opens.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use alarm_core::prelude::*;

use crate::transport::{Inbound, Link, Outbound, Transport};

/// Capacity of each scripted link queue.
const LINK_CAPACITY: usize = 32;

/// What the next `connect()` call does.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// Open a link immediately
    Accept,
    /// Fail with a transport error
    Refuse(String),
    /// Wait until the sender side fires (or is dropped), then open a link
    Gate(oneshot::Receiver<()>),
}

type Script = Arc<Mutex<VecDeque<ConnectOutcome>>>;

/// Creates a scripted transport and the server handle that controls it.
///
/// With an empty script every attempt is accepted.
pub fn scripted_transport() -> (ScriptedTransport, MockServer) {
    let script: Script = Arc::new(Mutex::new(VecDeque::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let (peer_tx, peer_rx) = mpsc::unbounded_channel();

    (
        ScriptedTransport {
            script: Arc::clone(&script),
            attempts: Arc::clone(&attempts),
            peer_tx,
        },
        MockServer {
            script,
            attempts,
            peer_rx,
        },
    )
}

/// In-memory transport driven by a [`MockServer`].
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Script,
    attempts: Arc<AtomicUsize>,
    peer_tx: mpsc::UnboundedSender<PeerLink>,
}

impl ScriptedTransport {
    fn open_link(&self) -> Link {
        let (out_tx, out_rx) = mpsc::channel(LINK_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(LINK_CAPACITY);
        let _ = self.peer_tx.send(PeerLink {
            to_agent: in_tx,
            from_agent: out_rx,
        });
        Link {
            outbound: out_tx,
            inbound: in_rx,
        }
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept);

        match outcome {
            ConnectOutcome::Accept => Ok(self.open_link()),
            ConnectOutcome::Refuse(message) => Err(Error::transport(message)),
            ConnectOutcome::Gate(gate) => {
                let _ = gate.await;
                Ok(self.open_link())
            }
        }
    }
}

/// Test-side controller for a [`ScriptedTransport`].
#[derive(Debug)]
pub struct MockServer {
    script: Script,
    attempts: Arc<AtomicUsize>,
    peer_rx: mpsc::UnboundedReceiver<PeerLink>,
}

impl MockServer {
    /// Queue the outcome of a future connect attempt.
    pub fn push(&self, outcome: ConnectOutcome) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next opened link.
    pub async fn next_peer(&mut self) -> PeerLink {
        self.peer_rx
            .recv()
            .await
            .expect("scripted transport dropped")
    }
}

/// The controller's end of one scripted link.
#[derive(Debug)]
pub struct PeerLink {
    to_agent: mpsc::Sender<Inbound>,
    from_agent: mpsc::Receiver<Outbound>,
}

impl PeerLink {
    /// Deliver a text message to the agent.
    pub async fn send_text(&self, text: &str) {
        let _ = self.to_agent.send(Inbound::Text(text.to_string())).await;
    }

    /// Close the link from the controller side.
    pub async fn close(&self, reason: &str) {
        let _ = self
            .to_agent
            .send(Inbound::Closed {
                code: Some(1000),
                reason: reason.to_string(),
            })
            .await;
    }

    /// Report a transport failure on the link.
    pub async fn fail(&self, error: &str) {
        let _ = self.to_agent.send(Inbound::Failed(error.to_string())).await;
    }

    /// Next frame written by the agent, or `None` once the agent dropped it.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.from_agent.recv().await
    }

    /// Next text frame written by the agent, skipping anything else.
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.from_agent.recv().await {
            if let Outbound::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }
}
