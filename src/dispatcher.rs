use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::ingest::{InboundMessage, MessageHandler};

/// Single consumer loop: drains the inbound queue one message at a time.
pub struct Dispatcher {
    rx: mpsc::Receiver<InboundMessage>,
    handler: Arc<MessageHandler>,
}

impl Dispatcher {
    pub fn new(rx: mpsc::Receiver<InboundMessage>, handler: Arc<MessageHandler>) -> Self {
        Self { rx, handler }
    }

    /// Runs until every sender is dropped. Returns the number of messages handled.
    pub async fn run(mut self) -> u64 {
        let mut handled = 0;
        while let Some(msg) = self.rx.recv().await {
            self.handler.handle(msg).await;
            handled += 1;
        }
        info!(handled, "dispatcher stopped");
        handled
    }
}
