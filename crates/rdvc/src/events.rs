//! User-facing event lines.
//!
//! Chat output is not diagnostics: it goes through a dedicated sink
//! rather than `tracing`, so the interactive surface stays a single
//! ordered stream of `< ` lines no matter which task produced them.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Destination for user-visible event lines.
pub trait EventSink: Send + Sync + 'static {
    /// Queues one line for display.
    fn emit(&self, line: String);
}

/// Shared handle to an event sink.
pub type Events = Arc<dyn EventSink>;

/// An [`EventSink`] backed by an unbounded queue, drained by a single
/// printer task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates the sink and the receiving end for its printer.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, line: String) {
        // Failure means the printer is gone, which only happens at
        // shutdown; the line is not worth keeping.
        let _ = self.tx.send(line);
    }
}

/// Spawns the printer task: one `< ` prefixed line per event.
pub fn spawn_printer(mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("< {line}");
        }
    })
}
