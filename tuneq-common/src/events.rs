//! Job lifecycle events and broadcast bus
//!
//! Events are broadcast via `EventBus` and serialized for SSE transmission.
//! Every event carries the job key and the attempt it belongs to, so a
//! subscriber can tell a retried attempt apart from the one it replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// TuneQ event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TuneqEvent {
    /// A request claimed a key and a pipeline attempt was started
    JobClaimed {
        key: String,
        attempt_id: Uuid,
        resolved_term: String,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline attempt stored the audio and recorded a retrieval URL
    JobReady {
        key: String,
        attempt_id: Uuid,
        file_url: String,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline attempt failed; the key is now in `error`
    JobFailed {
        key: String,
        attempt_id: Uuid,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A terminal write from a superseded attempt was rejected by the store
    StaleWriteRejected {
        key: String,
        attempt_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl TuneqEvent {
    /// Get event type as string for SSE event names and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            TuneqEvent::JobClaimed { .. } => "JobClaimed",
            TuneqEvent::JobReady { .. } => "JobReady",
            TuneqEvent::JobFailed { .. } => "JobFailed",
            TuneqEvent::StaleWriteRejected { .. } => "StaleWriteRejected",
        }
    }

    /// Key of the job this event belongs to
    pub fn key(&self) -> &str {
        match self {
            TuneqEvent::JobClaimed { key, .. }
            | TuneqEvent::JobReady { key, .. }
            | TuneqEvent::JobFailed { key, .. }
            | TuneqEvent::StaleWriteRejected { key, .. } => key,
        }
    }
}

/// Central event distribution bus
///
/// Cloning is cheap; all clones share the same broadcast channel. Slow
/// subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TuneqEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Subscribers more than `capacity` events behind are told they lagged.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TuneqEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TuneqEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_event(key: &str) -> TuneqEvent {
        TuneqEvent::JobReady {
            key: key.to_string(),
            attempt_id: Uuid::new_v4(),
            file_url: "tg://audio/abc".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit_lossy(ready_event("k"));

        // Late subscribers see only what comes after them
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(ready_event("first"));
        bus.emit_lossy(ready_event("second"));

        assert_eq!(rx.recv().await.unwrap().key(), "first");
        assert_eq!(rx.recv().await.unwrap().key(), "second");
    }

    #[test]
    fn test_serialization_uses_type_tag() {
        let json = serde_json::to_value(ready_event("shape of you")).unwrap();
        assert_eq!(json["type"], "JobReady");
        assert_eq!(json["key"], "shape of you");
        assert_eq!(json["file_url"], "tg://audio/abc");
    }
}
