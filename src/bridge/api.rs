use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::bridge::error::{no_active_session, parse_error, uninitialized, BridgeResult};
use crate::bridge::events::{BridgeEvent, EventSink, SessionInfo};
use crate::bridge::watch::{self, WatchArgument, WatchSubscription};
use crate::remote::{AppClient, Credential, RemoteCollection, ServiceConnector};
use crate::util::{json_eval_value, stringify};

/// Single entry point for document, auth, function, and subscription
/// operations against the hosted backend. Arguments and results cross as
/// JSON text so a non-Rust host embedding a web view can drive the bridge
/// without sharing native types.
///
/// The bridge owns exactly one remote handle, established by
/// [`StoreBridge::initialize`]; every other operation fails with
/// `bridge/uninitialized` until then. Remote failures are forwarded to the
/// caller unchanged, with no retries and no fallbacks.
#[derive(Clone)]
pub struct StoreBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    connector: Arc<dyn ServiceConnector>,
    sink: Arc<dyn EventSink>,
    client: Mutex<Option<Arc<dyn AppClient>>>,
}

impl StoreBridge {
    pub fn new(connector: Arc<dyn ServiceConnector>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                connector,
                sink,
                client: Mutex::new(None),
            }),
        }
    }

    /// Establishes the remote handle for `app_id` and announces the empty
    /// session on `authChange`. Expected to run once at startup; a repeat
    /// call replaces the handle (last writer wins).
    pub async fn initialize(&self, app_id: &str) -> BridgeResult<()> {
        let client = self.inner.connector.connect(app_id).await?;
        {
            let mut guard = self.inner.client.lock().unwrap();
            if guard.is_some() {
                log::warn!("bridge re-initialized; replacing the existing remote handle");
            }
            *guard = Some(client);
        }
        self.emit_auth_state(None);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.client.lock().unwrap().is_some()
    }

    /// Resolves a collection handle. Pure lookup; the only way it fails
    /// before the remote sees anything is an uninitialized bridge.
    pub fn collection(
        &self,
        database: &str,
        collection: &str,
    ) -> BridgeResult<Arc<dyn RemoteCollection>> {
        Ok(self.client()?.collection(database, collection)?)
    }

    pub async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document_json: &str,
    ) -> BridgeResult<()> {
        let handle = self.collection(database, collection)?;
        let document = parse_argument(document_json, "document")?;
        Ok(handle.insert_one(document).await?)
    }

    /// Parses every element before the first insert; one malformed element
    /// aborts the whole call with nothing written.
    pub async fn insert_many<I, S>(
        &self,
        database: &str,
        collection: &str,
        documents_json: I,
    ) -> BridgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let handle = self.collection(database, collection)?;
        let documents = documents_json
            .into_iter()
            .map(|text| parse_argument(text.as_ref(), "document"))
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(handle.insert_many(documents).await?)
    }

    /// Returns the first match re-serialized, or the JSON text `null`.
    pub async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
    ) -> BridgeResult<String> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let found = handle.find_one(filter).await?;
        to_json_text(&found.unwrap_or(Value::Null))
    }

    /// Returns every match, each re-serialized independently, in the order
    /// the service produced them.
    pub async fn find_many(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
    ) -> BridgeResult<Vec<String>> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let matches = handle.find(filter).await?;
        matches.iter().map(to_json_text).collect()
    }

    pub async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
    ) -> BridgeResult<String> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let result = handle.delete_one(filter).await?;
        to_json_text(&result)
    }

    /// Deleting zero documents is a success carrying `{"deletedCount":0}`.
    pub async fn delete_many(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
    ) -> BridgeResult<String> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let result = handle.delete_many(filter).await?;
        to_json_text(&result)
    }

    pub async fn count(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
    ) -> BridgeResult<u64> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        Ok(handle.count(filter).await?)
    }

    pub async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
        update_json: &str,
    ) -> BridgeResult<String> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let update = parse_argument(update_json, "update")?;
        let result = handle.update_one(filter, update).await?;
        to_json_text(&result)
    }

    pub async fn update_many(
        &self,
        database: &str,
        collection: &str,
        filter_json: &str,
        update_json: &str,
    ) -> BridgeResult<String> {
        let handle = self.collection(database, collection)?;
        let filter = parse_argument(filter_json, "filter")?;
        let update = parse_argument(update_json, "update")?;
        let result = handle.update_many(filter, update).await?;
        to_json_text(&result)
    }

    /// Starts a session without credentials; announces `{id}` on
    /// `authChange` and resolves the same payload.
    pub async fn login_anonymously(&self) -> BridgeResult<String> {
        let auth = self.client()?.auth();
        let user = auth.login(Credential::Anonymous).await?;
        let session = SessionInfo::from_user(&user);
        self.emit_auth_state(Some(session.clone()));
        to_json_text(&session)
    }

    /// Credential sign-in; announces and resolves
    /// `{id, profile: {email}}`. Invalid credentials surface as
    /// `bridge/authentication` with nothing announced.
    pub async fn sign_in_with_username_password(
        &self,
        username: &str,
        password: &str,
    ) -> BridgeResult<String> {
        let auth = self.client()?.auth();
        let user = auth
            .login(Credential::UsernamePassword {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        let session = SessionInfo::from_user(&user);
        self.emit_auth_state(Some(session.clone()));
        to_json_text(&session)
    }

    /// Creates the account only; the new identity is not signed in and no
    /// session notification fires.
    pub async fn register_with_email(&self, email: &str, password: &str) -> BridgeResult<()> {
        let auth = self.client()?.auth();
        auth.register_with_email(email, password).await?;
        log::debug!("registration request completed for {email}");
        Ok(())
    }

    /// Ends the session and announces `null` on `authChange`, also when no
    /// session was active.
    pub async fn logout(&self) -> BridgeResult<()> {
        let auth = self.client()?.auth();
        auth.logout().await?;
        self.emit_auth_state(None);
        log::debug!("session cleared");
        Ok(())
    }

    pub fn user_id(&self) -> BridgeResult<String> {
        let auth = self.client()?.auth();
        auth.current_user()
            .map(|user| user.id)
            .ok_or_else(no_active_session)
    }

    pub fn user(&self) -> BridgeResult<String> {
        let auth = self.client()?.auth();
        let user = auth.current_user().ok_or_else(no_active_session)?;
        to_json_text(&SessionInfo::from_user(&user))
    }

    pub async fn send_reset_password_email(&self, email: &str) -> BridgeResult<()> {
        let auth = self.client()?.auth();
        Ok(auth.send_reset_password_email(email).await?)
    }

    /// Invokes a named server-side function; the result is opaque to this
    /// layer and returned untouched.
    pub async fn call_function(&self, name: &str, args: &[Value]) -> BridgeResult<Value> {
        Ok(self.client()?.call_function(name, args).await?)
    }

    /// Opens one live subscription on `(database, collection)` and re-emits
    /// every change on `watchEvent.<database>.<collection>` as
    /// `{"_id": <identifier>}`. Each call opens an independent subscription;
    /// nothing de-duplicates repeated calls. The returned handle is the only
    /// way to close the stream.
    pub async fn watch_collection(
        &self,
        database: &str,
        collection: &str,
        argument: WatchArgument,
    ) -> BridgeResult<WatchSubscription> {
        let handle = self.collection(database, collection)?;
        let spec = watch::normalize(argument)?;
        log::debug!("opening change subscription on {database}.{collection}");
        let stream = handle.watch(spec).await?;
        let subscription = WatchSubscription::new(database, collection, stream.clone());
        watch::spawn_pump(
            database.to_string(),
            collection.to_string(),
            stream,
            Arc::clone(&self.inner.sink),
        );
        Ok(subscription)
    }

    fn client(&self) -> BridgeResult<Arc<dyn AppClient>> {
        self.inner
            .client
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(uninitialized)
    }

    fn emit_auth_state(&self, session: Option<SessionInfo>) {
        self.inner.sink.emit(&BridgeEvent::AuthChange { session });
    }
}

fn parse_argument(text: &str, role: &str) -> BridgeResult<Value> {
    json_eval_value(text).map_err(|err| parse_error(format!("malformed {role} JSON: {err}")))
}

fn to_json_text<T: serde::Serialize>(value: &T) -> BridgeResult<String> {
    stringify(value).map_err(|err| {
        crate::bridge::error::internal_error(format!("failed to serialize result: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::error::BridgeErrorCode;
    use crate::bridge::events::RecordingSink;
    use crate::remote::{InMemoryAppClient, InMemoryConnector};
    use serde_json::json;

    fn bridge_with_sink() -> (StoreBridge, Arc<RecordingSink>, Arc<InMemoryAppClient>) {
        let connector = InMemoryConnector::new();
        let client = connector.client();
        let sink = Arc::new(RecordingSink::new());
        let bridge = StoreBridge::new(Arc::new(connector), sink.clone());
        (bridge, sink, client)
    }

    async fn initialized_bridge() -> (StoreBridge, Arc<RecordingSink>, Arc<InMemoryAppClient>) {
        let (bridge, sink, client) = bridge_with_sink();
        bridge.initialize("demo-app").await.unwrap();
        sink.clear();
        (bridge, sink, client)
    }

    #[tokio::test]
    async fn operations_before_initialize_fail_fast() {
        let (bridge, _sink, client) = bridge_with_sink();
        let err = bridge
            .insert_one("app", "items", r#"{"n": 1}"#)
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Uninitialized);
        assert!(client.documents("app", "items").is_empty());

        assert_eq!(
            bridge.user_id().unwrap_err().code,
            BridgeErrorCode::Uninitialized
        );
        assert_eq!(
            bridge.count("app", "items", "{}").await.unwrap_err().code,
            BridgeErrorCode::Uninitialized
        );
    }

    #[tokio::test]
    async fn initialize_announces_the_empty_session() {
        let (bridge, sink, _client) = bridge_with_sink();
        bridge.initialize("demo-app").await.unwrap();
        assert_eq!(
            sink.events(),
            vec![BridgeEvent::AuthChange { session: None }]
        );
    }

    #[tokio::test]
    async fn initialize_failure_reports_connection() {
        let (bridge, sink, _client) = bridge_with_sink();
        let err = bridge.initialize("   ").await.unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Connection);
        assert!(sink.events().is_empty());
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn reinitialize_replaces_handle_and_reannounces() {
        let (bridge, sink, _client) = initialized_bridge().await;
        bridge.initialize("demo-app").await.unwrap();
        assert_eq!(
            sink.events(),
            vec![BridgeEvent::AuthChange { session: None }]
        );
    }

    #[tokio::test]
    async fn insert_then_find_roundtrips_the_document() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        bridge
            .insert_one("app", "items", r#"{"_id":"x","name":"thing"}"#)
            .await
            .unwrap();

        let found = bridge.find_one("app", "items", "{}").await.unwrap();
        let value: Value = crate::util::json_eval(&found).unwrap();
        assert_eq!(value, json!({"_id": "x", "name": "thing"}));
    }

    #[tokio::test]
    async fn find_one_without_match_returns_json_null() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        assert_eq!(bridge.find_one("app", "items", "{}").await.unwrap(), "null");
    }

    #[tokio::test]
    async fn malformed_document_fails_before_any_write() {
        let (bridge, _sink, client) = initialized_bridge().await;
        let err = bridge
            .insert_one("app", "items", "{broken")
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);
        assert!(client.documents("app", "items").is_empty());
    }

    #[tokio::test]
    async fn insert_many_aborts_wholesale_on_one_bad_element() {
        let (bridge, _sink, client) = initialized_bridge().await;
        let err = bridge
            .insert_many("app", "items", [r#"{"n":1}"#, "{broken", r#"{"n":3}"#])
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);
        assert!(client.documents("app", "items").is_empty());
    }

    #[tokio::test]
    async fn count_reflects_inserted_documents() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        bridge
            .insert_many(
                "app",
                "items",
                [r#"{"kind":"a"}"#, r#"{"kind":"a"}"#, r#"{"kind":"b"}"#],
            )
            .await
            .unwrap();
        assert_eq!(bridge.count("app", "items", "{}").await.unwrap(), 3);
        assert_eq!(
            bridge
                .count("app", "items", r#"{"kind":"a"}"#)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            bridge
                .count("app", "items", r#"{"kind":"c"}"#)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn delete_many_with_no_match_reports_zero_deletions() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        let result = bridge
            .delete_many("app", "items", r#"{"kind":"none"}"#)
            .await
            .unwrap();
        assert_eq!(result, r#"{"deletedCount":0}"#);
    }

    #[tokio::test]
    async fn update_results_are_reserialized_summaries() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        bridge
            .insert_one("app", "items", r#"{"_id":"x","n":1}"#)
            .await
            .unwrap();
        let result = bridge
            .update_one("app", "items", r#"{"_id":"x"}"#, r#"{"$set":{"n":2}}"#)
            .await
            .unwrap();
        assert_eq!(result, r#"{"matchedCount":1,"modifiedCount":1}"#);
    }

    #[tokio::test]
    async fn anonymous_login_announces_and_resolves_the_same_payload() {
        let (bridge, sink, _client) = initialized_bridge().await;
        let payload = bridge.login_anonymously().await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel(), "authChange");
        assert_eq!(events[0].payload_json(), payload);

        let value: Value = crate::util::json_eval(&payload).unwrap();
        assert!(value.get("id").is_some());
        assert!(value.get("profile").is_none());
    }

    #[tokio::test]
    async fn password_sign_in_carries_the_profile_email() {
        let (bridge, sink, client) = initialized_bridge().await;
        client.register_user("a@example.com", "pw");

        let payload = bridge
            .sign_in_with_username_password("a@example.com", "pw")
            .await
            .unwrap();
        let value: Value = crate::util::json_eval(&payload).unwrap();
        assert_eq!(value["profile"]["email"], json!("a@example.com"));
        assert_eq!(sink.channels(), vec!["authChange".to_string()]);
    }

    #[tokio::test]
    async fn failed_sign_in_emits_nothing() {
        let (bridge, sink, client) = initialized_bridge().await;
        client.register_user("a@example.com", "pw");

        let err = bridge
            .sign_in_with_username_password("a@example.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Authentication);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn registration_does_not_open_a_session() {
        let (bridge, sink, _client) = initialized_bridge().await;
        bridge
            .register_with_email("new@example.com", "pw")
            .await
            .unwrap();
        assert!(sink.events().is_empty());
        assert_eq!(
            bridge.user_id().unwrap_err().code,
            BridgeErrorCode::NoActiveSession
        );
    }

    #[tokio::test]
    async fn logout_always_announces_null() {
        let (bridge, sink, _client) = initialized_bridge().await;
        bridge.logout().await.unwrap();
        bridge.logout().await.unwrap();
        assert_eq!(
            sink.events(),
            vec![
                BridgeEvent::AuthChange { session: None },
                BridgeEvent::AuthChange { session: None },
            ]
        );
    }

    #[tokio::test]
    async fn session_accessors_require_an_active_session() {
        let (bridge, _sink, _client) = initialized_bridge().await;
        assert_eq!(
            bridge.user().unwrap_err().code,
            BridgeErrorCode::NoActiveSession
        );

        bridge.login_anonymously().await.unwrap();
        let id = bridge.user_id().unwrap();
        let user: Value = crate::util::json_eval(&bridge.user().unwrap()).unwrap();
        assert_eq!(user["id"], json!(id));
    }

    #[tokio::test]
    async fn call_function_returns_the_opaque_result() {
        let (bridge, _sink, client) = initialized_bridge().await;
        client.register_function("echo", |args| Ok(json!({ "args": args })));

        let result = bridge
            .call_function("echo", &[json!(1), json!("two")])
            .await
            .unwrap();
        assert_eq!(result, json!({"args": [1, "two"]}));

        let err = bridge.call_function("missing", &[]).await.unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::FunctionInvocation);
    }

    #[tokio::test]
    async fn reset_password_email_is_forwarded() {
        let (bridge, _sink, client) = initialized_bridge().await;
        client.register_user("a@example.com", "pw");
        bridge
            .send_reset_password_email("a@example.com")
            .await
            .unwrap();
        let err = bridge
            .send_reset_password_email("nobody@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Authentication);
    }

    #[tokio::test]
    async fn remote_failures_cross_unchanged() {
        let (bridge, _sink, _client) = initialized_bridge().await;

        // Valid JSON that the backend rejects: not a document.
        let err = bridge.insert_one("app", "items", "[1,2]").await.unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::RemoteWrite);
        assert_eq!(err.message(), "documents must be JSON objects");

        // Valid JSON that the backend rejects: not a filter.
        let err = bridge.find_many("app", "items", "3").await.unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::RemoteQuery);
    }

    #[tokio::test]
    async fn watch_normalization_failure_opens_nothing() {
        let (bridge, sink, _client) = initialized_bridge().await;
        let err = bridge
            .watch_collection("app", "items", WatchArgument::Json("{broken".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);

        bridge
            .insert_one("app", "items", r#"{"n":1}"#)
            .await
            .unwrap();
        assert!(sink.events().is_empty());
    }
}
