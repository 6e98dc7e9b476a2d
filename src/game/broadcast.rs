//! Fan-out of server messages to every member of a session

use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::ws::protocol::ServerMsg;

use super::PlayerId;

/// Per-connection outbound queue
pub type Outbox = mpsc::Sender<ServerMsg>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Queue full; the frame was dropped for this recipient only
    Dropped,
    /// Receiver gone
    Closed,
    UnknownRecipient,
}

#[derive(Default)]
pub struct BroadcastManager {
    recipients: BTreeMap<PlayerId, Outbox>,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: PlayerId, outbox: Outbox) {
        self.recipients.insert(id, outbox);
    }

    pub fn unregister(&mut self, id: PlayerId) {
        self.recipients.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn send_to(&self, id: PlayerId, msg: ServerMsg) -> Delivery {
        let Some(outbox) = self.recipients.get(&id) else {
            return Delivery::UnknownRecipient;
        };
        match outbox.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                debug!(player_id = id, "Outbox full, dropping frame");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Send to everyone. Returns recipients whose queue is closed; the
    /// caller removes them.
    pub fn broadcast(&self, msg: &ServerMsg) -> Vec<PlayerId> {
        let mut closed = Vec::new();
        for id in self.recipients.keys() {
            if self.send_to(*id, msg.clone()) == Delivery::Closed {
                warn!(player_id = *id, "Outbox closed, pruning recipient");
                closed.push(*id);
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_recipients_are_reported() {
        let mut broadcast = BroadcastManager::new();
        let (alive_tx, mut alive_rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);
        broadcast.register(1, alive_tx);
        broadcast.register(2, dead_tx);
        drop(dead_rx);

        let closed = broadcast.broadcast(&ServerMsg::GameStarted { round: 0 });
        assert_eq!(closed, vec![2]);
        assert!(matches!(alive_rx.recv().await, Some(ServerMsg::GameStarted { round: 0 })));
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_that_frame() {
        let mut broadcast = BroadcastManager::new();
        let (tx, mut rx) = mpsc::channel(1);
        broadcast.register(1, tx);

        assert_eq!(broadcast.send_to(1, ServerMsg::GameStarted { round: 0 }), Delivery::Sent);
        assert_eq!(broadcast.send_to(1, ServerMsg::GameStarted { round: 1 }), Delivery::Dropped);
        assert!(broadcast.broadcast(&ServerMsg::GameStarted { round: 2 }).is_empty());

        assert!(matches!(rx.recv().await, Some(ServerMsg::GameStarted { round: 0 })));
        assert_eq!(broadcast.send_to(9, ServerMsg::GameStarted { round: 0 }), Delivery::UnknownRecipient);
    }
}
