//! Relay configuration.

use std::{path::PathBuf, time::Duration};

use online_python_transport::DEFAULT_ENDPOINT;

/// Settings for one relay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket endpoint of the remote interpreter.
    pub url: String,
    /// Give up if no message arrives within this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Append raw traffic to this file.
    pub log_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
            read_timeout: None,
            log_path: None,
        }
    }
}

impl RelayConfig {
    /// Override the endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the traffic log path.
    #[must_use]
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }
}
