//! Publish/subscribe and point-to-point addressing between agents (§4.3).
//! Telemetry topics use drop-oldest backpressure; direct request/response
//! uses block-with-timeout, since a lost control message is not harmless the
//! way a lost sensor frame is.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration,
};

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::mailbox::DropOldestQueue;
use crate::message::Message;

const TELEMETRY_QUEUE_CAPACITY: usize = 256;
const MAILBOX_CAPACITY: usize = 64;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Subscription {
    queue: Arc<DropOldestQueue<Message>>,
}

/// A registered agent's point-to-point inbox, separate from any topic
/// subscriptions it may also hold.
struct Mailbox {
    sender: mpsc::Sender<Message>,
}

#[derive(Default)]
struct PendingResponses {
    waiters: BTreeMap<uuid::Uuid, oneshot::Sender<Message>>,
}

/// A2A message bus: topic fan-out plus addressed delivery. `register_agent`
/// creates the agent's inbox; `subscribe` attaches it to zero or more
/// topics. Neither implies the other.
pub struct Bus {
    mailboxes: RwLock<BTreeMap<String, Mailbox>>,
    mailbox_receivers: RwLock<BTreeMap<String, Arc<tokio::sync::Mutex<mpsc::Receiver<Message>>>>>,
    topics: RwLock<BTreeMap<String, Vec<(String, Subscription)>>>,
    pending: RwLock<PendingResponses>,
    request_timeout: Duration,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Bus {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            mailboxes: RwLock::new(BTreeMap::new()),
            mailbox_receivers: RwLock::new(BTreeMap::new()),
            topics: RwLock::new(BTreeMap::new()),
            pending: RwLock::new(PendingResponses::default()),
            request_timeout,
        }
    }

    /// Creates `agent_id`'s inbox. Re-registering replaces the inbox,
    /// dropping any messages still queued for the old one.
    pub async fn register_agent(&self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.mailboxes.write().await.insert(agent_id.clone(), Mailbox { sender: tx });
        self.mailbox_receivers
            .write()
            .await
            .insert(agent_id, Arc::new(tokio::sync::Mutex::new(rx)));
    }

    pub async fn deregister_agent(&self, agent_id: &str) {
        self.mailboxes.write().await.remove(agent_id);
        self.mailbox_receivers.write().await.remove(agent_id);
        let mut topics = self.topics.write().await;
        for subscribers in topics.values_mut() {
            subscribers.retain(|(id, _)| id != agent_id);
        }
    }

    pub async fn subscribe(&self, agent_id: impl Into<String>, topic: impl Into<String>) {
        let agent_id = agent_id.into();
        let topic = topic.into();
        let mut topics = self.topics.write().await;
        let subscribers = topics.entry(topic).or_default();
        if !subscribers.iter().any(|(id, _)| id == &agent_id) {
            subscribers.push((
                agent_id,
                Subscription { queue: Arc::new(DropOldestQueue::new(TELEMETRY_QUEUE_CAPACITY)) },
            ));
        }
    }

    pub async fn unsubscribe(&self, agent_id: &str, topic: &str) {
        if let Some(subscribers) = self.topics.write().await.get_mut(topic) {
            subscribers.retain(|(id, _)| id != agent_id);
        }
    }

    /// Fan-out with drop-oldest backpressure: a slow subscriber loses the
    /// oldest buffered frame rather than stalling the publisher. Delivery
    /// order within a single (publisher, topic) pair is FIFO.
    #[instrument(skip(self, message), fields(topic))]
    pub async fn publish(&self, topic: &str, message: Message) {
        let topics = self.topics.read().await;
        let Some(subscribers) = topics.get(topic) else {
            return;
        };
        for (subscriber_id, subscription) in subscribers {
            if subscription.queue.push(message.clone()) {
                warn!(topic, subscriber = subscriber_id, "telemetry frame dropped under load");
            }
        }
    }

    /// Pulls the next buffered frame for `agent_id` on `topic`, waiting if
    /// none is queued yet.
    pub async fn next_on_topic(&self, agent_id: &str, topic: &str) -> Option<Message> {
        let queue = {
            let topics = self.topics.read().await;
            topics
                .get(topic)?
                .iter()
                .find(|(id, _)| id == agent_id)
                .map(|(_, sub)| Arc::clone(&sub.queue))?
        };
        Some(queue.recv().await)
    }

    /// Sends `message` directly to its `to` address, blocking up to the
    /// bus's configured timeout if the inbox is full (§5 block-with-timeout).
    #[instrument(skip(self, message), fields(to = %message.to))]
    pub async fn send(&self, message: Message) -> Result<(), CoreError> {
        let sender = {
            let mailboxes = self.mailboxes.read().await;
            mailboxes
                .get(&message.to)
                .map(|mailbox| mailbox.sender.clone())
                .ok_or_else(|| CoreError::Addressing(message.to.clone()))?
        };
        match sender.send_timeout(message.clone(), self.request_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                Err(CoreError::MailboxFull(message.to.clone()))
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(CoreError::AgentUnavailable(message.to.clone()))
            }
        }
    }

    /// Sends a request and waits for its matching response, bounded by the
    /// bus's request timeout (§8 property: every request eventually
    /// resolves to a response or a timeout, never hangs silently).
    pub async fn request(&self, message: Message) -> Result<Message, CoreError> {
        let (tx, rx) = oneshot::channel();
        let request_id = message.id;
        self.pending.write().await.waiters.insert(request_id, tx);

        let to = message.to.clone();
        let deadline_ms = self.request_timeout.as_millis() as u64;
        if let Err(err) = self.send(message).await {
            self.pending.write().await.waiters.remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CoreError::AgentUnavailable(to)),
            Err(_) => {
                self.pending.write().await.waiters.remove(&request_id);
                Err(CoreError::Timeout { to, deadline_ms })
            }
        }
    }

    /// Resolves a pending `request` call once the corresponding response
    /// arrives. No-op if nothing is waiting on `response.parent_id`.
    pub async fn resolve_response(&self, response: Message) {
        let Some(parent_id) = response.parent_id else { return };
        if let Some(waiter) = self.pending.write().await.waiters.remove(&parent_id) {
            let _ = waiter.send(response);
        }
    }

    /// Broadcasts to every registered mailbox except the sender.
    pub async fn broadcast(&self, message: Message) {
        let mailboxes = self.mailboxes.read().await;
        for (agent_id, mailbox) in mailboxes.iter() {
            if *agent_id == message.from {
                continue;
            }
            let _ = mailbox.sender.send_timeout(message.clone(), self.request_timeout).await;
        }
    }

    /// Receives the next message addressed directly to `agent_id`.
    pub async fn receive(&self, agent_id: &str) -> Option<Message> {
        let receiver = {
            let receivers = self.mailbox_receivers.read().await;
            Arc::clone(receivers.get(agent_id)?)
        };
        receiver.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn unknown_agent_addressing_fails_cleanly() {
        let bus = Bus::default();
        let msg = Message::event("sensor-relay", "nonexistent", json!({})).unwrap();
        let err = bus.send(msg).await.unwrap_err();
        assert!(matches!(err, CoreError::Addressing(id) if id == "nonexistent"));
    }

    #[tokio::test]
    async fn direct_send_then_receive_round_trips() {
        let bus = Bus::default();
        bus.register_agent("watcher").await;
        bus.send(Message::event("origin", "watcher", json!({"n": 1})).unwrap())
            .await
            .unwrap();
        let received = bus.receive("watcher").await.unwrap();
        assert_eq!(received.content, json!({"n": 1}));
    }

    #[tokio::test]
    async fn publish_respects_per_subscriber_fifo_order() {
        let bus = Bus::default();
        bus.subscribe("sub-a", "telemetry").await;
        for n in 0..5 {
            bus.publish("telemetry", Message::event("twin", "*", json!({"n": n})).unwrap())
                .await;
        }
        for n in 0..5 {
            let msg = bus.next_on_topic("sub-a", "telemetry").await.unwrap();
            assert_eq!(msg.content, json!({"n": n}));
        }
    }

    #[tokio::test]
    async fn request_resolves_once_response_arrives() {
        let bus = Arc::new(Bus::default());
        bus.register_agent("responder").await;

        let request = Message::request("caller", "responder", json!({"q": true})).unwrap();
        let request_id = request.id;

        let bus_clone = Arc::clone(&bus);
        tokio::spawn(async move {
            let incoming = bus_clone.receive("responder").await.unwrap();
            let reply =
                Message::response("responder", "caller", json!({"ok": true}), incoming.id)
                    .unwrap();
            bus_clone.resolve_response(reply).await;
        });

        let response = bus.request(request).await.unwrap();
        assert_eq!(response.parent_id, Some(request_id));
        assert_eq!(response.content, json!({"ok": true}));
    }
}
