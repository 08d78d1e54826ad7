use serde::Serialize;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Named SSE payloads fanned out to every stream of one host session.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// New receiver; only events sent afterwards are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Serialise `payload` as event `name` and send it. Returns how many
    /// streams received it; zero when nobody listens.
    pub fn publish<T: Serialize>(&self, name: &str, payload: &T) -> serde_json::Result<usize> {
        let event = ServerEvent::json(Some(name.to_owned()), payload)?;
        Ok(self.sender.send(event).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = SseHub::new(4);
        assert_eq!(hub.publish("ping", &1).unwrap(), 0);

        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.publish("ping", &serde_json::json!({"n": 2})).unwrap(), 2);

        for receiver in [&mut first, &mut second] {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.event.as_deref(), Some("ping"));
            assert_eq!(event.data, r#"{"n":2}"#);
        }
    }
}
