//! Raw traffic log.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use online_python_core::{Direction, TrafficSink};
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::Mutex,
};

/// Appends every raw frame, one per line, prefixed with its direction.
///
/// Frames are written in `Debug` form so embedded newlines stay on one line.
#[derive(Clone)]
pub struct TrafficLog {
    writer: Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl TrafficLog {
    /// Create a log over any writer.
    #[must_use]
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(Box::new(writer)))),
        }
    }

    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened.
    pub async fn open(path: &Path) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(file))
    }

    /// Log a raw frame.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn log_raw(&self, direction: Direction, raw: &str) -> Result<(), std::io::Error> {
        let line = format!("{direction} {raw:?}\n");
        let mut guard = self.writer.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TrafficSink for TrafficLog {
    async fn record(&self, direction: Direction, raw: &str) {
        if let Err(e) = self.log_raw(direction, raw).await {
            tracing::error!("Failed to log message: {e}");
        }
    }
}
