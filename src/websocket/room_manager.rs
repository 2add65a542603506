use crate::types::{Identity, PresenceData, ServerMessage, Topic};
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bounded per-connection outbound buffer.
///
/// Publishing never waits: when the buffer is full the oldest message is
/// dropped to make room.
pub struct OutboundQueue {
    messages: Mutex<VecDeque<String>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    /// Enqueue a message. Returns false once the queue is closed.
    pub fn push(&self, message: String) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut messages = self.messages.lock().unwrap();
            if messages.len() >= self.capacity {
                messages.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            messages.push_back(message);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next message. `None` once closed and drained.
    pub async fn recv(&self) -> Option<String> {
        loop {
            if let Some(message) = self.messages.lock().unwrap().pop_front() {
                return Some(message);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Take the next message without waiting.
    pub fn try_recv(&self) -> Option<String> {
        self.messages.lock().unwrap().pop_front()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages discarded because the client fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A connected client.
pub struct ClientConnection {
    pub identity: Identity,
    /// Topics the client is a member of.
    pub topics: HashSet<Topic>,
    /// Messages waiting to be written to the socket.
    pub queue: Arc<OutboundQueue>,
}

/// Manages topic membership and delivery for WebSocket clients.
pub struct RoomManager {
    /// Connected clients keyed by connection ID.
    clients: DashMap<Uuid, ClientConnection>,
    /// Topic -> set of connection IDs.
    rooms: DashMap<Topic, HashSet<Uuid>>,
    queue_capacity: usize,
}

impl RoomManager {
    /// Create a new room manager with the given per-connection queue size.
    pub fn new(queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            queue_capacity,
        })
    }

    /// Register a new connection.
    ///
    /// The connection joins `general` and its own `user:{id}` topic, and the
    /// new presence count is announced.
    pub fn register(&self, identity: Identity) -> (Uuid, Arc<OutboundQueue>) {
        let client_id = Uuid::new_v4();
        let queue = OutboundQueue::new(self.queue_capacity);
        let user_topic = Topic::User(identity.user_id.clone());

        self.clients.insert(
            client_id,
            ClientConnection {
                identity,
                topics: HashSet::new(),
                queue: queue.clone(),
            },
        );
        self.join(client_id, Topic::General);
        self.join(client_id, user_topic);
        self.broadcast_presence();

        (client_id, queue)
    }

    /// Remove a connection from every topic and announce the new presence count.
    pub fn unregister(&self, client_id: Uuid) {
        let Some((_, connection)) = self.clients.remove(&client_id) else {
            return;
        };
        for topic in &connection.topics {
            self.remove_from_room(topic, client_id);
        }
        connection.queue.close();
        self.broadcast_presence();
    }

    /// Add a connection to a topic. Returns false if it was already a member.
    pub fn join(&self, client_id: Uuid, topic: Topic) -> bool {
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.topics.insert(topic.clone()) {
            return false;
        }
        self.rooms.entry(topic).or_default().insert(client_id);
        true
    }

    /// Remove a connection from a topic. Returns false if it was not a member.
    pub fn leave(&self, client_id: Uuid, topic: &Topic) -> bool {
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.topics.remove(topic) {
            return false;
        }
        self.remove_from_room(topic, client_id);
        true
    }

    fn remove_from_room(&self, topic: &Topic, client_id: Uuid) {
        let now_empty = match self.rooms.get_mut(topic) {
            Some(mut room) => {
                room.remove(&client_id);
                room.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(topic, |_, room| room.is_empty());
        }
    }

    /// Deliver a message to every member of a topic.
    ///
    /// Returns the number of connections it was queued for.
    pub fn publish(&self, topic: &Topic, message: &ServerMessage) -> usize {
        self.publish_multi(std::slice::from_ref(topic), message)
    }

    /// Deliver a message to the union of several topics, once per connection.
    pub fn publish_multi(&self, topics: &[Topic], message: &ServerMessage) -> usize {
        let targets: HashSet<Uuid> = topics
            .iter()
            .filter_map(|topic| self.rooms.get(topic).map(|room| room.clone()))
            .flatten()
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                return 0;
            }
        };

        let delivered = targets
            .iter()
            .filter(|id| self.deliver(id, &json))
            .count();
        debug!("Published to {:?}: {} recipients", topics, delivered);
        delivered
    }

    /// Send a message to a single connection.
    pub fn send_to(&self, client_id: Uuid, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.deliver(&client_id, &json),
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                false
            }
        }
    }

    fn deliver(&self, client_id: &Uuid, json: &str) -> bool {
        self.clients
            .get(client_id)
            .map(|client| client.queue.push(json.to_string()))
            .unwrap_or(false)
    }

    /// Announce the number of connected clients on `general`.
    pub fn broadcast_presence(&self) {
        let message = ServerMessage::Presence {
            data: PresenceData {
                online: self.client_count(),
            },
        };
        self.publish(&Topic::General, &message);
    }

    /// Identity behind a connection.
    pub fn identity(&self, client_id: Uuid) -> Option<Identity> {
        self.clients.get(&client_id).map(|c| c.identity.clone())
    }

    /// Topics a connection belongs to.
    pub fn topics(&self, client_id: Uuid) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .clients
            .get(&client_id)
            .map(|c| c.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Number of connections in a topic.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.rooms.get(topic).map(|room| room.len()).unwrap_or(0)
    }

    /// Get the number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of topics with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.iter().filter(|r| !r.is_empty()).count()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
            queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            user_id: id.to_string(),
            username: id.to_string(),
            guest: false,
        }
    }

    fn drain(queue: &OutboundQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.try_recv()).collect()
    }

    #[test]
    fn test_queue_drops_oldest() {
        let queue = OutboundQueue::new(2);
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.push("c".to_string());

        assert_eq!(queue.dropped(), 1);
        assert_eq!(drain(&queue), vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_queue_recv_after_close() {
        let queue = OutboundQueue::new(4);
        queue.push("last".to_string());
        queue.close();

        assert_eq!(queue.recv().await, Some("last".to_string()));
        assert_eq!(queue.recv().await, None);
        assert!(!queue.push("late".to_string()));
    }

    #[test]
    fn test_register_auto_joins() {
        let manager = RoomManager::new(16);
        let (id, _queue) = manager.register(identity("u1"));

        assert_eq!(
            manager.topics(id),
            vec![Topic::General, Topic::User("u1".to_string())]
        );
        assert_eq!(manager.subscriber_count(&Topic::General), 1);
    }

    #[test]
    fn test_publish_multi_delivers_once() {
        let manager = RoomManager::new(16);
        let (id, queue) = manager.register(identity("u1"));
        manager.join(id, Topic::Player("p1".to_string()));
        drain(&queue);

        let delivered = manager.publish_multi(
            &[Topic::General, Topic::Player("p1".to_string())],
            &ServerMessage::Pong { timestamp: 1 },
        );
        assert_eq!(delivered, 1);
        assert_eq!(drain(&queue).len(), 1);
    }

    #[test]
    fn test_unregister_announces_presence() {
        let manager = RoomManager::new(16);
        let (a, _qa) = manager.register(identity("a"));
        let (_b, qb) = manager.register(identity("b"));
        drain(&qb);

        manager.unregister(a);
        assert_eq!(manager.client_count(), 1);
        let messages = drain(&qb);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("\"online\":1"));
        assert_eq!(manager.subscriber_count(&Topic::User("a".to_string())), 0);
    }

    #[test]
    fn test_leave_stops_delivery() {
        let manager = RoomManager::new(16);
        let (id, queue) = manager.register(identity("u1"));
        let topic = Topic::Player("p1".to_string());
        assert!(manager.join(id, topic.clone()));
        assert!(!manager.join(id, topic.clone()));
        assert!(manager.leave(id, &topic));
        assert!(!manager.leave(id, &topic));
        drain(&queue);

        assert_eq!(manager.publish(&topic, &ServerMessage::Pong { timestamp: 1 }), 0);
        assert!(queue.is_empty());
    }
}
