//! Adapter for the online-python websocket interface.
//!
//! Provides:
//! - Engine.IO / Socket.IO framing codec (`protocol`)
//! - WebSocket-backed `RemoteSession` (`websocket`)

pub mod protocol;
pub mod websocket;

pub use protocol::{DEFAULT_ENDPOINT, InboundDecoder, OutboundEncoder, ProtocolError};
pub use websocket::{WebSocketSession, connect};
