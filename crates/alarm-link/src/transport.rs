//! Transport seam between the supervised channel and a physical connection.
//!
//! A [`Transport`] opens one connection per call and hands it back as a
//! [`Link`]: a pair of message queues. The transport owns whatever I/O tasks
//! pump those queues; the supervision loop only ever sees typed frames, so a
//! WebSocket, a test double, or any other duplex message transport plug in
//! the same way.

use tokio::sync::mpsc;

use alarm_core::prelude::*;

/// Normal-closure status code sent when the agent closes a connection.
pub const CLOSE_NORMAL: u16 = 1000;

/// Frames the agent writes to an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text message
    Text(String),
    /// Close the connection with the given status code and reason
    Close { code: u16, reason: String },
}

/// Frames delivered from an open link to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text message from the controller
    Text(String),
    /// The peer closed the connection
    Closed { code: Option<u16>, reason: String },
    /// The connection failed (read/write error)
    Failed(String),
}

/// One open connection, as a pair of queues.
///
/// Dropping `outbound` asks the transport to close the connection; the
/// `inbound` queue ends with a [`Inbound::Closed`] or [`Inbound::Failed`]
/// frame (or simply closes) when the connection is gone.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Opens connections to the remote controller.
///
/// Implement [`Transport`]; the `Send` bound on the returned future lets the
/// supervision loop run each attempt on its own task.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Open a new connection. Any failure is reported as
    /// [`Error::Transport`] and routed through the backoff path.
    async fn connect(&self) -> Result<Link>;
}
