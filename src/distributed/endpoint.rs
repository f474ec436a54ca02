use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{AppError, AppResult, DistributedError};

use super::ChannelMessage;

/// Outbound side of a controller/agent link.
pub trait MessageEndpoint: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the peer is gone.
    fn send_message(&self, message: ChannelMessage) -> AppResult<()>;
}

/// Endpoint backed by an unbounded channel. The receiving half is usually
/// drained by a wire writer task, or read directly in-process.
#[derive(Debug)]
pub struct ChannelEndpoint {
    name: String,
    sender: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelEndpoint {
    #[must_use]
    pub fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                name: name.to_owned(),
                sender,
            }),
            receiver,
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MessageEndpoint for ChannelEndpoint {
    fn send_message(&self, message: ChannelMessage) -> AppResult<()> {
        self.sender.send(message).map_err(|_err| {
            AppError::distributed(DistributedError::EndpointClosed {
                channel: self.name.clone(),
            })
        })
    }
}
