//! Message validation, queuing, and routing between agents.
//!
//! The dispatcher owns the append-only message history and the pending
//! delivery queue. Messages for receivers that have not registered yet stay
//! queued; delivery is retried on every pass until the receiver appears or
//! the optional attempt bound runs out.

use std::collections::{HashMap, VecDeque};

use crate::error::Result;
use crate::protocol::{Content, Message, MessageType};

/// Callback invoked when a message is delivered to an agent.
///
/// `Ok(Some(response))` hands a response back to the caller of
/// `deliver_pending`; `Err` marks a receiver-side failure, which drops the
/// message without retry.
pub type ReceiveCallback =
    Box<dyn FnMut(&Message) -> std::result::Result<Option<Message>, String> + Send>;

struct Registration {
    kind: String,
    callback: ReceiveCallback,
}

struct PendingMessage {
    message: Message,
    /// Delivery passes that found the receiver unregistered.
    attempts: u32,
}

/// Outcome of one `deliver_pending` pass.
#[derive(Default)]
pub struct DeliveryReport {
    /// Messages handed to a receiver callback.
    pub delivered: usize,
    /// Receiver-side failures; these messages were dropped.
    pub failed: usize,
    /// Responses produced by receivers during this pass.
    pub responses: Vec<Message>,
    /// Messages addressed to the system facade, pulled out for it to handle.
    pub system: Vec<Message>,
    /// Messages dropped because their delivery attempts ran out.
    pub expired: Vec<Message>,
}

/// The message bus between agents.
pub struct Dispatcher {
    history: Vec<Message>,
    pending: VecDeque<PendingMessage>,
    registry: HashMap<String, Registration>,
    /// Registration order, used for broadcast fan-out.
    order: Vec<String>,
    max_queue_size: usize,
    delivery_max_attempts: Option<u32>,
}

impl Dispatcher {
    pub fn new(max_queue_size: usize, delivery_max_attempts: Option<u32>) -> Self {
        Self {
            history: Vec::new(),
            pending: VecDeque::new(),
            registry: HashMap::new(),
            order: Vec::new(),
            max_queue_size,
            delivery_max_attempts,
        }
    }

    /// Register an agent's receive callback. One-shot: a name can only be
    /// registered once, and a duplicate attempt leaves the registry unchanged.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        callback: ReceiveCallback,
    ) -> bool {
        let name = name.into();
        if self.registry.contains_key(&name) {
            tracing::warn!("Agent {} already registered", name);
            return false;
        }

        self.registry.insert(
            name.clone(),
            Registration {
                kind: kind.into(),
                callback,
            },
        );
        self.order.push(name.clone());
        tracing::info!("Registered agent: {}", name);
        true
    }

    /// Whether a name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// The registered kind for a name, if any.
    pub fn kind_of(&self, name: &str) -> Option<&str> {
        self.registry.get(name).map(|r| r.kind.as_str())
    }

    /// Validate and enqueue a message. Returns the assigned message id.
    ///
    /// A malformed message is rejected before anything is recorded: neither
    /// history nor the pending queue changes.
    pub fn submit(&mut self, mut message: Message) -> Result<String> {
        message.ensure_identity();
        message.validate()?;

        let id = message.id.clone();
        tracing::debug!(
            "Queued message {} from {} to {} ({:?}/{})",
            id,
            message.sender,
            message.receiver,
            message.message_type,
            message.content.action
        );

        self.history.push(message.clone());
        self.pending.push_back(PendingMessage {
            message,
            attempts: 0,
        });

        if self.pending.len() > self.max_queue_size {
            tracing::warn!(
                "Pending queue size {} exceeds configured bound {}",
                self.pending.len(),
                self.max_queue_size
            );
        }

        Ok(id)
    }

    /// Run one delivery pass over the pending queue, in submission order.
    ///
    /// Registered receivers get their callback invoked and the message leaves
    /// the queue; a callback error also removes the message (receiver-side
    /// failures are not retried). Unregistered receivers keep the message
    /// queued unless the attempt bound is exhausted.
    pub fn deliver_pending(&mut self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut remaining = VecDeque::new();

        for mut entry in std::mem::take(&mut self.pending) {
            if entry.message.is_for_system() {
                report.system.push(entry.message);
                continue;
            }

            let Some(registration) = self.registry.get_mut(&entry.message.receiver) else {
                entry.attempts += 1;
                match self.delivery_max_attempts {
                    Some(max) if entry.attempts >= max => {
                        tracing::warn!(
                            "Delivery expired for message {} to unregistered receiver {} after {} attempts",
                            entry.message.id,
                            entry.message.receiver,
                            entry.attempts
                        );
                        report.expired.push(entry.message);
                    }
                    _ => remaining.push_back(entry),
                }
                continue;
            };

            match (registration.callback)(&entry.message) {
                Ok(response) => {
                    report.delivered += 1;
                    if let Some(response) = response {
                        report.responses.push(response);
                    }
                }
                Err(err) => {
                    tracing::error!(
                        "Error delivering message {} to {}: {}",
                        entry.message.id,
                        entry.message.receiver,
                        err
                    );
                    report.failed += 1;
                }
            }
        }

        self.pending = remaining;
        report
    }

    /// Broadcast to every registered agent except the sender, in
    /// registration order. Returns the assigned message ids.
    pub fn broadcast(
        &mut self,
        sender: &str,
        message_type: MessageType,
        content: Content,
    ) -> Vec<String> {
        let receivers: Vec<String> = self
            .order
            .iter()
            .filter(|name| name.as_str() != sender)
            .cloned()
            .collect();

        let mut ids = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            let message = Message::new(sender, receiver, message_type, content.clone());
            match self.submit(message) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::error!("Broadcast submission failed: {}", e),
            }
        }
        ids
    }

    /// All history messages addressed to an agent.
    pub fn messages_for(&self, name: &str) -> Vec<&Message> {
        self.history.iter().filter(|m| m.receiver == name).collect()
    }

    /// The conversation between two agents, in history order. Symmetric.
    pub fn conversation(&self, a: &str, b: &str) -> Vec<&Message> {
        self.history
            .iter()
            .filter(|m| {
                (m.sender == a && m.receiver == b) || (m.sender == b && m.receiver == a)
            })
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Names in registration order.
    pub fn registered_names(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Priority;
    use std::sync::{Arc, Mutex};

    fn recording_callback(log: Arc<Mutex<Vec<Message>>>) -> ReceiveCallback {
        Box::new(move |message| {
            log.lock().unwrap().push(message.clone());
            Ok(None)
        })
    }

    fn message(sender: &str, receiver: &str) -> Message {
        Message::new(
            sender,
            receiver,
            MessageType::Notification,
            Content::new("ping"),
        )
    }

    #[test]
    fn duplicate_registration_fails_and_registry_is_unchanged() {
        let mut bus = Dispatcher::new(100, None);
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(bus.register("alpha", "developer", recording_callback(log.clone())));
        assert!(!bus.register("alpha", "reviewer", recording_callback(log)));
        assert_eq!(bus.kind_of("alpha"), Some("developer"));
        assert_eq!(bus.registered_names().len(), 1);
    }

    #[test]
    fn malformed_messages_leave_history_unchanged() {
        let mut bus = Dispatcher::new(100, None);

        let mut missing_sender = message("a", "b");
        missing_sender.sender = String::new();
        assert!(bus.submit(missing_sender).is_err());

        let mut missing_receiver = message("a", "b");
        missing_receiver.receiver = String::new();
        assert!(bus.submit(missing_receiver).is_err());

        let mut missing_action = message("a", "b");
        missing_action.content.action = String::new();
        assert!(bus.submit(missing_action).is_err());

        assert_eq!(bus.history_len(), 0);
        assert_eq!(bus.pending_len(), 0);
    }

    #[test]
    fn undelivered_message_waits_and_is_delivered_exactly_once() {
        let mut bus = Dispatcher::new(100, None);
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.submit(message("a", "late")).unwrap();

        for _ in 0..5 {
            let report = bus.deliver_pending();
            assert_eq!(report.delivered, 0);
            assert_eq!(bus.pending_len(), 1);
        }

        assert!(bus.register("late", "developer", recording_callback(log.clone())));

        let report = bus.deliver_pending();
        assert_eq!(report.delivered, 1);
        assert_eq!(bus.pending_len(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);

        let report = bus.deliver_pending();
        assert_eq!(report.delivered, 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn attempt_bound_expires_undeliverable_messages() {
        let mut bus = Dispatcher::new(100, Some(2));
        bus.submit(message("a", "ghost")).unwrap();

        let first = bus.deliver_pending();
        assert!(first.expired.is_empty());
        assert_eq!(bus.pending_len(), 1);

        let second = bus.deliver_pending();
        assert_eq!(second.expired.len(), 1);
        assert_eq!(second.expired[0].receiver, "ghost");
        assert_eq!(bus.pending_len(), 0);
    }

    #[test]
    fn receiver_failure_drops_without_retry() {
        let mut bus = Dispatcher::new(100, None);
        bus.register(
            "crashy",
            "developer",
            Box::new(|_| Err("handler exploded".to_string())),
        );

        bus.submit(message("a", "crashy")).unwrap();
        let report = bus.deliver_pending();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(bus.pending_len(), 0);
    }

    #[test]
    fn failed_delivery_does_not_block_other_receivers() {
        let mut bus = Dispatcher::new(100, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("ok", "developer", recording_callback(log.clone()));

        bus.submit(message("a", "ghost")).unwrap();
        bus.submit(message("a", "ok")).unwrap();

        let report = bus.deliver_pending();
        assert_eq!(report.delivered, 1);
        assert_eq!(bus.pending_len(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn broadcast_skips_sender_and_preserves_registration_order() {
        let mut bus = Dispatcher::new(100, None);
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["one", "two", "three"] {
            bus.register(name, "developer", recording_callback(log.clone()));
        }

        let ids = bus.broadcast(
            "two",
            MessageType::Notification,
            Content::new("phase_changed").with_priority(Priority::Low),
        );
        assert_eq!(ids.len(), 2);

        bus.deliver_pending();
        let delivered = log.lock().unwrap();
        let receivers: Vec<&str> = delivered.iter().map(|m| m.receiver.as_str()).collect();
        assert_eq!(receivers, vec!["one", "three"]);
    }

    #[test]
    fn conversation_is_symmetric() {
        let mut bus = Dispatcher::new(100, None);
        bus.submit(message("a", "b")).unwrap();
        bus.submit(message("b", "a")).unwrap();
        bus.submit(message("a", "c")).unwrap();

        let ab: Vec<&str> = bus.conversation("a", "b").iter().map(|m| m.id.as_str()).collect();
        let ba: Vec<&str> = bus.conversation("b", "a").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn system_messages_are_pulled_out_not_forwarded() {
        let mut bus = Dispatcher::new(100, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register("worker", "developer", recording_callback(log.clone()));

        bus.submit(message("worker", "system")).unwrap();
        let report = bus.deliver_pending();

        assert_eq!(report.system.len(), 1);
        assert_eq!(report.delivered, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn messages_for_filters_by_receiver() {
        let mut bus = Dispatcher::new(100, None);
        bus.submit(message("a", "b")).unwrap();
        bus.submit(message("c", "b")).unwrap();
        bus.submit(message("b", "a")).unwrap();

        assert_eq!(bus.messages_for("b").len(), 2);
        assert_eq!(bus.messages_for("a").len(), 1);
    }
}
