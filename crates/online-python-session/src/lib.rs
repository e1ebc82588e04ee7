//! Session relay for remote online-python runs.
//!
//! Provides:
//! - `SessionRelay` - Drive one remote run and relay its terminal I/O
//! - `TrafficLog` - Append-only record of raw frames
//! - `RelayConfig` - Endpoint, timeout and log settings

pub mod config;
pub mod relay;
pub mod traffic_log;

pub use config::RelayConfig;
pub use relay::{
    Console, FAILURE_EXIT_CODE, INTERRUPTED_EXIT_CODE, RelayError, RelayState, SessionRelay,
    Termination, start,
};
pub use traffic_log::TrafficLog;
