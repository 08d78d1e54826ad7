//! Per-room change notification bus.
//!
//! Every successful write made through [`crate::dao::room::RoomRepository`] is
//! published on the topic of its room. Subscribers hold a [`Subscription`];
//! dropping it detaches from the topic and prunes the topic once empty.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::dao::models::{PlayerEntity, RoomEntity};

/// Change observed on a room topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A player row was inserted.
    PlayerJoined(PlayerEntity),
    /// A player row was replaced.
    PlayerUpdated(PlayerEntity),
    /// The room row was inserted or replaced.
    RoomUpdated(RoomEntity),
    /// Device ids currently attached to the room's presence channel.
    PresenceSync {
        /// Attached devices, in join order.
        device_ids: Vec<String>,
    },
}

impl ChangeEvent {
    /// Short name used for logs and SSE event types.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::PlayerJoined(_) => "player.joined",
            ChangeEvent::PlayerUpdated(_) => "player.updated",
            ChangeEvent::RoomUpdated(_) => "room.updated",
            ChangeEvent::PresenceSync { .. } => "presence.sync",
        }
    }
}

/// Typed fan-out of [`ChangeEvent`]s keyed by room id.
pub struct ChangeBus {
    topics: DashMap<Uuid, broadcast::Sender<ChangeEvent>>,
    capacity: usize,
}

impl ChangeBus {
    /// Empty bus; each topic buffers `capacity` events.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        })
    }

    /// Attach to the topic of `room_id`, creating it when needed.
    pub fn subscribe(self: &Arc<Self>, room_id: Uuid) -> Subscription {
        let receiver = self
            .topics
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            room_id,
            receiver,
            bus: Arc::clone(self),
        }
    }

    /// Deliver `event` to the current subscribers of `room_id`. Events for
    /// topics nobody listens to are dropped.
    pub fn publish(&self, room_id: Uuid, event: ChangeEvent) {
        if let Some(sender) = self.topics.get(&room_id) {
            let _ = sender.send(event);
        }
    }

    /// Number of live subscriptions on `room_id`.
    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.topics
            .get(&room_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Whether a topic currently exists for `room_id`.
    pub fn has_topic(&self, room_id: Uuid) -> bool {
        self.topics.contains_key(&room_id)
    }
}

/// RAII handle on a room topic.
pub struct Subscription {
    room_id: Uuid,
    receiver: broadcast::Receiver<ChangeEvent>,
    bus: Arc<ChangeBus>,
}

impl Subscription {
    /// Room this subscription listens to.
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Wait for the next event. `RecvError::Lagged` means events were lost and
    /// the caller should resynchronise from the store.
    pub async fn recv(&mut self) -> Result<ChangeEvent, RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our own receiver is still alive at this point.
        self.bus
            .topics
            .remove_if(&self.room_id, |_, sender| sender.receiver_count() <= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_of_a_room_receive_its_events_only() {
        let bus = ChangeBus::new(8);
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let mut sub_a = bus.subscribe(room_a);
        let mut sub_b = bus.subscribe(room_b);

        bus.publish(
            room_a,
            ChangeEvent::PresenceSync {
                device_ids: vec!["d1".into()],
            },
        );

        assert_eq!(
            sub_a.recv().await.unwrap(),
            ChangeEvent::PresenceSync {
                device_ids: vec!["d1".into()]
            }
        );
        assert!(sub_b.receiver.try_recv().is_err());
    }

    #[test]
    fn dropping_last_subscription_prunes_topic() {
        let bus = ChangeBus::new(8);
        let room = Uuid::new_v4();
        let first = bus.subscribe(room);
        let second = bus.subscribe(room);
        assert_eq!(bus.subscriber_count(room), 2);

        drop(first);
        assert!(bus.has_topic(room));
        assert_eq!(bus.subscriber_count(room), 1);

        drop(second);
        assert!(!bus.has_topic(room));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = ChangeBus::new(8);
        let room = Uuid::new_v4();
        bus.publish(
            room,
            ChangeEvent::PresenceSync {
                device_ids: vec![],
            },
        );
        assert!(!bus.has_topic(room));
    }
}
