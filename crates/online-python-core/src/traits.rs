//! Seams between the relay and the wire.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Direction, Inbound, Outbound};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Connection lost: {0}")]
    Connection(String),
    #[error("Connection closed")]
    Closed,
}

/// One live connection to the remote interpreter.
///
/// Implementations own the wire format; the relay only sees
/// [`Outbound`] and [`Inbound`].
#[async_trait]
pub trait RemoteSession: Send {
    /// Send a message. Implementations may stage a message and put it on
    /// the wire together with a later one.
    async fn send(&mut self, message: Outbound) -> Result<(), TransportError>;

    /// Wait for the next message. `Ok(None)` means the peer closed the connection.
    ///
    /// Must be cancel safe: the relay races it against local input, and a
    /// dropped call must not lose a message.
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Receiver for every raw frame crossing the wire.
#[async_trait]
pub trait TrafficSink: Send + Sync {
    /// Record one raw frame.
    async fn record(&self, direction: Direction, raw: &str);
}
