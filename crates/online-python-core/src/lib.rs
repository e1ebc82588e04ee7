//! Core types for driving a remote online-python session.
//!
//! This crate provides the fundamental building blocks:
//! - `InputFile` / `RunRequest` - What gets uploaded and how it is run
//! - `Inbound` / `Outbound` - Closed message sets exchanged with the remote side
//! - `RemoteSession` and `TrafficSink` traits

pub mod context;
pub mod message;
pub mod traits;

pub use context::{InputError, InputFile, RunRequest};
pub use message::{Direction, Inbound, Outbound};
pub use traits::{RemoteSession, TrafficSink, TransportError};
