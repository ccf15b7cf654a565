use super::StreamEvent;
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        // slow gate waiters fall back to polling when they lag
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Returns how many subscribers saw the event. Nobody listening is fine.
    pub fn publish(&self, event: StreamEvent) -> usize {
        tracing::trace!(id = %event.id, kind = ?event.kind, "Stream event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::events::StreamEventKind;
    use crate::domain::ContentId;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let id = ContentId::parse("abc").unwrap();

        assert_eq!(
            hub.publish(StreamEvent::new(&id, StreamEventKind::RenditionReady { height: 720 })),
            1
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.kind, StreamEventKind::RenditionReady { height: 720 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = EventHub::new();
        let id = ContentId::parse("abc").unwrap();
        assert_eq!(hub.publish(StreamEvent::new(&id, StreamEventKind::Started)), 0);
    }

    #[test]
    fn test_event_json_shape() {
        let id = ContentId::parse("abc").unwrap();
        let event = StreamEvent::new(&id, StreamEventKind::Aborted { reason: "boom".into() });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["type"], "aborted");
        assert_eq!(value["reason"], "boom");
    }
}
