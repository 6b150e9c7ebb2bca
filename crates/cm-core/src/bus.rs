//! Message bus port and the in-process implementation.
//!
//! The core only defines what is published and when; transport mechanics
//! belong to the bus implementation. Broadcast is best-effort relative to
//! the persistence path: publishers log failures and never roll back.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::types::SessionId;

/// Topic carrying alerts and presence counts for one session.
#[must_use]
pub fn session_topic(session: SessionId) -> String {
    format!("session/{session}")
}

/// Topic carrying mode-change broadcasts for one session.
#[must_use]
pub fn session_mode_topic(session: SessionId) -> String {
    format!("session/{session}/mode")
}

/// Bus transport errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying transport rejected the publish.
    #[error("bus transport failure: {0}")]
    Transport(String),
}

/// Fan-out publisher for session topics.
pub trait Bus: Send + Sync {
    /// Publishes a payload to every subscriber of the topic.
    ///
    /// Publishing to a topic with no subscribers is not an error.
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError>;
}

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// In-process bus fanning out over `std::sync::mpsc` channels.
///
/// Disconnected subscribers are dropped on the next publish to their topic.
#[derive(Debug, Default)]
pub struct InProcessBus {
    topics: Mutex<HashMap<String, Vec<Sender<BusMessage>>>>,
}

impl InProcessBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic, returning the receiving end of the channel.
    pub fn subscribe(&self, topic: impl Into<String>) -> Receiver<BusMessage> {
        let (tx, rx) = channel();
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.into())
            .or_default()
            .push(tx);
        rx
    }
}

impl Bus for InProcessBus {
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = topics.get_mut(topic) else {
            return Ok(());
        };

        let before = senders.len();
        senders.retain(|tx| {
            tx.send(BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            })
            .is_ok()
        });
        let dropped = before - senders.len();
        if dropped > 0 {
            tracing::debug!(topic, dropped, "dropped disconnected subscribers");
        }
        if senders.is_empty() {
            topics.remove(topic);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = InProcessBus::new();
        let topic = session_topic(SessionId::new(3));
        let rx_a = bus.subscribe(topic.as_str());
        let rx_b = bus.subscribe(topic.as_str());

        bus.publish(&topic, json!({"kind": "away"})).unwrap();

        for rx in [&rx_a, &rx_b] {
            let msg = rx.try_recv().expect("message delivered");
            assert_eq!(msg.topic, topic);
            assert_eq!(msg.payload["kind"], "away");
        }
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = InProcessBus::new();
        assert!(bus.publish("session/9", json!({})).is_ok());
    }

    #[test]
    fn topics_are_isolated() {
        let bus = InProcessBus::new();
        let rx_alerts = bus.subscribe(session_topic(SessionId::new(1)));
        let rx_mode = bus.subscribe(session_mode_topic(SessionId::new(1)));

        bus.publish(&session_mode_topic(SessionId::new(1)), json!({"mode": "DIGITAL"}))
            .unwrap();

        assert!(rx_alerts.try_recv().is_err());
        assert_eq!(rx_mode.try_recv().unwrap().payload["mode"], "DIGITAL");
    }

    #[test]
    fn disconnected_subscribers_are_dropped() {
        let bus = InProcessBus::new();
        let topic = "session/5";
        drop(bus.subscribe(topic));
        let rx = bus.subscribe(topic);

        bus.publish(topic, json!({"n": 1})).unwrap();
        assert_eq!(rx.try_recv().unwrap().payload["n"], 1);
    }

    #[test]
    fn topic_names_follow_session_pattern() {
        assert_eq!(session_topic(SessionId::new(12)), "session/12");
        assert_eq!(session_mode_topic(SessionId::new(12)), "session/12/mode");
    }
}
