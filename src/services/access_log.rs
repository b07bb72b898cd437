//! Append-only request log
//!
//! Sessions record one line per parsed request; a dedicated writer task
//! drains the channel and appends to the log file. Write failures are
//! reported and swallowed so logging can never take a session down.

use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Cheap cloneable handle held by every session.
#[derive(Clone)]
pub struct AccessLog {
    sender: mpsc::UnboundedSender<String>,
}

impl AccessLog {
    /// Record a forwarded request target as `<unix-timestamp>: <url>`.
    pub fn record(&self, target: &str) {
        let line = format!("{}: {}\n", Utc::now().timestamp(), target);
        if self.sender.send(line).is_err() {
            debug!("access log writer gone, line dropped");
        }
    }
}

/// The writer half, run as a background task.
pub struct AccessLogWriter {
    path: String,
    receiver: mpsc::UnboundedReceiver<String>,
}

/// Create a connected handle/writer pair for the given log path.
pub fn channel(path: String) -> (AccessLog, AccessLogWriter) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (AccessLog { sender }, AccessLogWriter { path, receiver })
}

impl AccessLogWriter {
    /// Drain log lines until shutdown, appending each to the log file.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut file = match OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
        {
            Ok(file) => {
                info!("access log open at {}", self.path);
                Some(file)
            }
            Err(e) => {
                warn!("failed to open access log {}: {}", self.path, e);
                None
            }
        };

        loop {
            tokio::select! {
                line = self.receiver.recv() => match line {
                    Some(line) => write_line(&mut file, &line).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("access log writer shutting down");
                        break;
                    }
                }
            }
        }

        // Drain anything still queued before closing out.
        while let Ok(line) = self.receiver.try_recv() {
            write_line(&mut file, &line).await;
        }
        if let Some(file) = file.as_mut() {
            if let Err(e) = file.flush().await {
                warn!("access log flush failed: {}", e);
            }
        }
    }
}

async fn write_line(file: &mut Option<File>, line: &str) {
    if let Some(f) = file.as_mut() {
        if let Err(e) = f.write_all(line.as_bytes()).await {
            warn!("access log write failed: {}", e);
        }
    }
}
