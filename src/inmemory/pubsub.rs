use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::ports::pubsub::MemoryEvent;
use crate::ports::{Capabilities, PubSub};

/// Broadcast-channel pub/sub. Topics are logical only — every subscriber on
/// the shared channel receives every event and filters by topic itself,
/// which is adequate for the single-process reference deployment.
pub struct InMemoryPubSub {
    sender: broadcast::Sender<(String, MemoryEvent)>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, MemoryEvent)> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, topic: &str, event: MemoryEvent) -> Result<()> {
        // No subscribers is not an error: events are fire-and-forget.
        let _ = self.sender.send((topic.to_string(), event));
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemoryId;
    use crate::scope::Scope;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let pubsub = InMemoryPubSub::new();
        let mut rx = pubsub.subscribe();
        pubsub
            .publish(
                "memory.saved",
                MemoryEvent::Saved {
                    scope: Scope::new("t1", "u1"),
                    id: MemoryId::from_hex("11111111111111111111111111111111"),
                },
            )
            .await
            .unwrap();
        let (topic, _event) = rx.recv().await.unwrap();
        assert_eq!(topic, "memory.saved");
    }
}
