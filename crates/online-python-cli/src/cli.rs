//! Command line surface.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use online_python_session::RelayConfig;
use online_python_transport::DEFAULT_ENDPOINT;

#[derive(Parser, Debug)]
#[command(name = "online-python")]
#[command(
    version,
    about = "A command line client to execute files on https://www.online-python.com/",
    long_about = None
)]
pub struct Cli {
    /// Append every raw message exchanged with the remote side to this file
    #[arg(long, value_name = "LOG_PATH")]
    pub log: Option<PathBuf>,

    /// Input file(s). The first one is executed
    #[arg(value_name = "file", required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Run with optional arguments for the remote program
    #[arg(long, value_name = "arg", num_args = 0..)]
    pub run: Option<Vec<String>>,

    /// Socket endpoint of the remote interpreter
    #[arg(long, env = "ONLINE_PYTHON_URL", default_value = DEFAULT_ENDPOINT, hide_default_value = true)]
    pub url: String,

    /// Seconds to wait for each message before giving up
    #[arg(long, value_name = "SECS", env = "ONLINE_PYTHON_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Arguments forwarded to the remote program.
    #[must_use]
    pub fn run_args(&self) -> Vec<String> {
        self.run.clone().unwrap_or_default()
    }

    /// Relay settings from the parsed flags.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_url(self.url.clone())
            .with_read_timeout(self.timeout.map(Duration::from_secs))
            .with_log_path(self.log.clone())
    }
}
