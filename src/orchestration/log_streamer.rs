//! Persists builder output line by line.
//!
//! Builders call the log callback synchronously from wherever they read
//! subprocess output, so the callback only pushes onto an unbounded channel.
//! One writer task per build drains it into the log store, which keeps the
//! entries in production order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::executors::LogCallback;
use crate::models::LogEntry;
use crate::store::SharedStore;

enum StreamMessage {
    Line(String),
    Close,
}

pub struct LogStreamer {
    deployment_id: String,
    sender: mpsc::UnboundedSender<StreamMessage>,
    closed: Arc<AtomicBool>,
    writer: JoinHandle<()>,
}

impl LogStreamer {
    /// Spawn the writer task for one deployment's build output
    pub fn start(store: SharedStore, deployment_id: impl Into<String>) -> Self {
        let deployment_id = deployment_id.into();
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let writer_deployment = deployment_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let StreamMessage::Line(line) = message else {
                    break;
                };
                let entry = LogEntry::build_line(writer_deployment.as_str(), line);
                if let Err(e) = store.logs().create(&entry).await {
                    error!(
                        deployment_id = %writer_deployment,
                        error = %e,
                        "Failed to stream log entry"
                    );
                }
            }
        });

        Self {
            deployment_id,
            sender,
            closed: Arc::new(AtomicBool::new(false)),
            writer,
        }
    }

    /// Callback that queues each line for persistence. Lines arriving after
    /// [`LogStreamer::finish`] are dropped.
    pub fn callback(&self) -> LogCallback {
        let sender = self.sender.clone();
        let closed = self.closed.clone();
        Arc::new(move |line: &str| {
            if closed.load(Ordering::Acquire) {
                return;
            }
            let _ = sender.send(StreamMessage::Line(line.to_string()));
        })
    }

    /// Flush every queued line and stop the writer
    pub async fn finish(self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.sender.send(StreamMessage::Close);
        if let Err(e) = self.writer.await {
            warn!(
                deployment_id = %self.deployment_id,
                error = %e,
                "Log writer task ended abnormally"
            );
        }
    }
}

impl std::fmt::Debug for LogStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamer")
            .field("deployment_id", &self.deployment_id)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_lines_are_persisted_in_order() {
        let memory = Arc::new(MemoryStore::new());
        let streamer = LogStreamer::start(memory.clone(), "dep-1");
        let callback = streamer.callback();

        for i in 0..50 {
            callback(&format!("line {i}"));
        }
        streamer.finish().await;

        let expected: Vec<_> = (0..50).map(|i| format!("line {i}")).collect();
        assert_eq!(memory.log_messages("dep-1"), expected);

        let entry = &memory.log_entries("dep-1")[0];
        assert_eq!(entry.source, "build");
        assert_eq!(entry.level, "info");
    }

    #[tokio::test]
    async fn test_lines_after_finish_are_dropped() {
        let memory = Arc::new(MemoryStore::new());
        let streamer = LogStreamer::start(memory.clone(), "dep-1");
        let callback = streamer.callback();

        callback("kept");
        streamer.finish().await;
        callback("dropped");

        assert_eq!(memory.log_messages("dep-1"), vec!["kept"]);
    }
}
