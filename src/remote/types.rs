use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::object_id::ObjectId;

/// Credential accepted by the identity provider's `login` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    UsernamePassword { username: String, password: String },
}

/// Identity attached to the active session, as reported by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: String,
    pub email: Option<String>,
}

/// Delete summary in the service's wire shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Update summary in the service's wire shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
}

/// One entry of a collection's live change stream. `full_document` is absent
/// for deletes; `document_key` is present for every operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub document_key: Value,
    pub full_document: Option<Value>,
}

/// Unbounded sequence of change events delivered by an open subscription.
/// The channel stays open until the subscriber closes it or the backing
/// client goes away.
pub type ChangeStream = async_channel::Receiver<ChangeEvent>;

/// Canonical description of which documents a live subscription observes:
/// either an explicit match-document evaluated by the service, or a fixed set
/// of document identifiers.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchSpec {
    Ids(Vec<ObjectId>),
    Filter(Value),
}
