// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish/subscribe channel shared by all contexts

use super::message::ElectionMessage;
use thiserror::Error;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("broadcast channel unavailable: {0}")]
    Unavailable(String),
    #[error("broadcast channel closed")]
    Closed,
}

/// A channel every same-origin context can post to and listen on
///
/// Subscribers may receive their own messages; receivers filter by sender.
pub trait BroadcastChannel: Send + Sync + 'static {
    fn post(&self, message: ElectionMessage) -> Result<(), ChannelError>;

    fn subscribe(&self) -> Result<broadcast::Receiver<ElectionMessage>, ChannelError>;
}

/// In-process channel backed by `tokio::sync::broadcast`
///
/// Every clone shares the same underlying channel, so handing one clone to
/// each simulated context connects them.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<ElectionMessage>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for LocalBus {
    fn post(&self, message: ElectionMessage) -> Result<(), ChannelError> {
        tracing::trace!(kind = message.name(), from = %message.sender(), "posting");
        // No receivers is not an error: nobody else is listening yet
        let _ = self.tx.send(message);
        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<ElectionMessage>, ChannelError> {
        Ok(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::ContextId;

    #[tokio::test]
    async fn clones_share_one_channel() {
        let bus = LocalBus::new();
        let other = bus.clone();
        let mut rx = other.subscribe().unwrap();

        let msg = ElectionMessage::Heartbeat {
            context_id: ContextId::new("tab-1"),
        };
        bus.post(msg.clone()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), msg);
    }

    #[test]
    fn post_without_subscribers_succeeds() {
        let bus = LocalBus::new();
        assert!(bus
            .post(ElectionMessage::Candidate {
                context_id: ContextId::new("tab-1"),
            })
            .is_ok());
    }
}
