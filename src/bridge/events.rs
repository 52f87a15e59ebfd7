use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::remote::RemoteUser;

/// Session summary broadcast to the host: `{id}` for anonymous sessions,
/// `{id, profile: {email}}` when the identity provider reports an email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<SessionProfile>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub email: String,
}

impl SessionInfo {
    pub fn from_user(user: &RemoteUser) -> Self {
        Self {
            id: user.id.clone(),
            profile: user.email.clone().map(|email| SessionProfile { email }),
        }
    }
}

/// Notification re-emitted to the embedding host. Best-effort, synchronous,
/// in-process; there is no acknowledgment or delivery guarantee.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEvent {
    /// Session state changed; `None` means logged out.
    AuthChange { session: Option<SessionInfo> },
    /// A watched collection changed; `payload` is the JSON text
    /// `{"_id": <identifier>}`.
    WatchEvent {
        database: String,
        collection: String,
        payload: String,
    },
}

impl BridgeEvent {
    /// Channel name hosts key their dispatch on: `authChange`, or
    /// `watchEvent.<database>.<collection>`.
    pub fn channel(&self) -> String {
        match self {
            BridgeEvent::AuthChange { .. } => "authChange".to_string(),
            BridgeEvent::WatchEvent {
                database,
                collection,
                ..
            } => format!("watchEvent.{database}.{collection}"),
        }
    }

    /// The event payload as JSON text; auth changes serialize their session
    /// summary (`null` when logged out).
    pub fn payload_json(&self) -> String {
        match self {
            BridgeEvent::AuthChange { session } => {
                crate::util::stringify(session).unwrap_or_else(|_| "null".to_string())
            }
            BridgeEvent::WatchEvent { payload, .. } => payload.clone(),
        }
    }
}

/// Host-provided destination for bridge notifications.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &BridgeEvent);
}

/// Sink that drops every event; for embeddings that only call methods and
/// never listen.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &BridgeEvent) {}
}

/// Sink that records every emission in order; the assertion point for tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(BridgeEvent::channel)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &BridgeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_channel_is_fixed() {
        let event = BridgeEvent::AuthChange { session: None };
        assert_eq!(event.channel(), "authChange");
        assert_eq!(event.payload_json(), "null");
    }

    #[test]
    fn watch_channel_is_scoped_to_database_and_collection() {
        let event = BridgeEvent::WatchEvent {
            database: "app".into(),
            collection: "items".into(),
            payload: r#"{"_id":"abc"}"#.into(),
        };
        assert_eq!(event.channel(), "watchEvent.app.items");
        assert_eq!(event.payload_json(), r#"{"_id":"abc"}"#);
    }

    #[test]
    fn null_sink_discards_silently() {
        NullSink.emit(&BridgeEvent::AuthChange { session: None });
    }

    #[test]
    fn anonymous_sessions_serialize_without_profile() {
        let session = SessionInfo {
            id: "abc".into(),
            profile: None,
        };
        let event = BridgeEvent::AuthChange {
            session: Some(session),
        };
        assert_eq!(event.payload_json(), r#"{"id":"abc"}"#);
    }

    #[test]
    fn password_sessions_carry_the_email() {
        let user = RemoteUser {
            id: "abc".into(),
            email: Some("a@example.com".into()),
        };
        let event = BridgeEvent::AuthChange {
            session: Some(SessionInfo::from_user(&user)),
        };
        assert_eq!(
            event.payload_json(),
            r#"{"id":"abc","profile":{"email":"a@example.com"}}"#
        );
    }
}
