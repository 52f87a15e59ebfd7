use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::{
    authentication_error, connection_error, function_error, query_error, write_error, RemoteResult,
};
use super::object_id::ObjectId;
use super::types::{
    ChangeEvent, ChangeOperation, ChangeStream, Credential, DeleteResult, RemoteUser, UpdateResult,
    WatchSpec,
};
use super::{AppClient, AuthClient, RemoteCollection, ServiceConnector};

type FunctionHandler = Arc<dyn Fn(&[Value]) -> RemoteResult<Value> + Send + Sync>;

/// Connector producing a shared [`InMemoryAppClient`]. Tests construct the
/// connector, seed the client through [`InMemoryConnector::client`], and hand
/// the connector to the bridge.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    client: Arc<InMemoryAppClient>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Arc<InMemoryAppClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> Arc<InMemoryAppClient> {
        Arc::clone(&self.client)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ServiceConnector for InMemoryConnector {
    async fn connect(&self, app_id: &str) -> RemoteResult<Arc<dyn AppClient>> {
        if app_id.trim().is_empty() {
            return Err(connection_error("application id must not be empty"));
        }
        Ok(self.client() as Arc<dyn AppClient>)
    }
}

/// Complete in-process stand-in for the hosted service: document collections
/// with equality filters and `$set`/`$unset`/`$inc` updates, a
/// username/password account table with anonymous login, registered named
/// functions, and per-collection change fan-out.
#[derive(Default)]
pub struct InMemoryAppClient {
    collections: Mutex<BTreeMap<(String, String), Arc<CollectionState>>>,
    auth: Arc<InMemoryAuth>,
    functions: Mutex<BTreeMap<String, FunctionHandler>>,
}

impl InMemoryAppClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account the way a backend console would, without touching the
    /// session.
    pub fn register_user(&self, email: &str, password: &str) -> String {
        self.auth.insert_account(email, password)
    }

    /// Registers a named server-side function.
    pub fn register_function<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[Value]) -> RemoteResult<Value> + Send + Sync + 'static,
    {
        self.functions
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Snapshot of a collection's documents in insertion order.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Value> {
        self.collection_state(database, collection)
            .documents
            .lock()
            .unwrap()
            .clone()
    }

    fn collection_state(&self, database: &str, collection: &str) -> Arc<CollectionState> {
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AppClient for InMemoryAppClient {
    fn auth(&self) -> Arc<dyn AuthClient> {
        Arc::clone(&self.auth) as Arc<dyn AuthClient>
    }

    fn collection(
        &self,
        database: &str,
        collection: &str,
    ) -> RemoteResult<Arc<dyn RemoteCollection>> {
        if database.is_empty() || collection.is_empty() {
            return Err(query_error("database and collection names must not be empty"));
        }
        Ok(Arc::new(InMemoryCollection {
            state: self.collection_state(database, collection),
        }) as Arc<dyn RemoteCollection>)
    }

    async fn call_function(&self, name: &str, args: &[Value]) -> RemoteResult<Value> {
        let handler = self
            .functions
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| function_error(format!("no function named '{name}'")))?;
        handler(args)
    }
}

#[derive(Default)]
struct InMemoryAuth {
    accounts: Mutex<BTreeMap<String, Account>>,
    session: Mutex<Option<RemoteUser>>,
}

struct Account {
    password: String,
    user_id: String,
}

impl InMemoryAuth {
    fn insert_account(&self, email: &str, password: &str) -> String {
        let user_id = ObjectId::new().to_hex();
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user_id: user_id.clone(),
            },
        );
        user_id
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AuthClient for InMemoryAuth {
    async fn login(&self, credential: Credential) -> RemoteResult<RemoteUser> {
        let user = match credential {
            Credential::Anonymous => RemoteUser {
                id: ObjectId::new().to_hex(),
                email: None,
            },
            Credential::UsernamePassword { username, password } => {
                let accounts = self.accounts.lock().unwrap();
                let account = accounts
                    .get(&username)
                    .filter(|account| account.password == password)
                    .ok_or_else(|| authentication_error("invalid username or password"))?;
                RemoteUser {
                    id: account.user_id.clone(),
                    email: Some(username.clone()),
                }
            }
        };
        *self.session.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn register_with_email(&self, email: &str, password: &str) -> RemoteResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(authentication_error(format!(
                "an account already exists for {email}"
            )));
        }
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user_id: ObjectId::new().to_hex(),
            },
        );
        Ok(())
    }

    async fn send_reset_password_email(&self, email: &str) -> RemoteResult<()> {
        let known = self.accounts.lock().unwrap().contains_key(email);
        if !known {
            return Err(authentication_error(format!(
                "no account registered for {email}"
            )));
        }
        Ok(())
    }

    async fn logout(&self) -> RemoteResult<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    fn current_user(&self) -> Option<RemoteUser> {
        self.session.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct CollectionState {
    documents: Mutex<Vec<Value>>,
    watchers: Mutex<Vec<Watcher>>,
}

struct Watcher {
    spec: WatchSpec,
    sender: async_channel::Sender<ChangeEvent>,
}

struct InMemoryCollection {
    state: Arc<CollectionState>,
}

impl InMemoryCollection {
    fn insert_documents(&self, documents: Vec<Value>) -> RemoteResult<Vec<Value>> {
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let Value::Object(mut fields) = document else {
                return Err(write_error("documents must be JSON objects"));
            };
            fields
                .entry("_id")
                .or_insert_with(|| Value::String(ObjectId::new().to_hex()));
            prepared.push(Value::Object(fields));
        }

        let mut store = self.state.documents.lock().unwrap();
        store.extend(prepared.iter().cloned());
        drop(store);

        Ok(prepared)
    }

    fn apply_update(&self, filter: &Value, update: &Value, many: bool) -> RemoteResult<UpdateResult> {
        let filter = as_filter(filter)?;
        let mut result = UpdateResult::default();
        let mut changed = Vec::new();

        let mut store = self.state.documents.lock().unwrap();
        for document in store.iter_mut() {
            if !document_matches(filter, document) {
                continue;
            }
            result.matched_count += 1;
            let updated = updated_document(document, update)?;
            if updated != *document {
                result.modified_count += 1;
                *document = updated.clone();
                changed.push(updated);
            }
            if !many {
                break;
            }
        }
        drop(store);

        for document in changed {
            self.notify(ChangeOperation::Update, &document);
        }
        Ok(result)
    }

    fn apply_delete(&self, filter: &Value, many: bool) -> RemoteResult<DeleteResult> {
        let filter = as_filter(filter)?;
        let mut removed = Vec::new();

        let mut store = self.state.documents.lock().unwrap();
        let mut index = 0;
        while index < store.len() {
            if document_matches(filter, &store[index]) && (many || removed.is_empty()) {
                removed.push(store.remove(index));
            } else {
                index += 1;
            }
        }
        drop(store);

        let result = DeleteResult {
            deleted_count: removed.len() as u64,
        };
        for document in removed {
            self.notify(ChangeOperation::Delete, &document);
        }
        Ok(result)
    }

    /// Fans one change out to every watcher whose spec matches the affected
    /// document; watchers with a closed stream are pruned.
    fn notify(&self, operation: ChangeOperation, document: &Value) {
        let key = document.get("_id").cloned().unwrap_or(Value::Null);
        let full_document = match operation {
            ChangeOperation::Delete => None,
            _ => Some(document.clone()),
        };

        let mut watchers = self.state.watchers.lock().unwrap();
        watchers.retain(|watcher| {
            if !watcher_matches(&watcher.spec, &key, document) {
                return !watcher.sender.is_closed();
            }
            watcher
                .sender
                .try_send(ChangeEvent {
                    operation,
                    document_key: key.clone(),
                    full_document: full_document.clone(),
                })
                .is_ok()
        });
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteCollection for InMemoryCollection {
    async fn insert_one(&self, document: Value) -> RemoteResult<()> {
        let inserted = self.insert_documents(vec![document])?;
        for document in &inserted {
            self.notify(ChangeOperation::Insert, document);
        }
        Ok(())
    }

    async fn insert_many(&self, documents: Vec<Value>) -> RemoteResult<()> {
        let inserted = self.insert_documents(documents)?;
        for document in &inserted {
            self.notify(ChangeOperation::Insert, document);
        }
        Ok(())
    }

    async fn find_one(&self, filter: Value) -> RemoteResult<Option<Value>> {
        let filter = as_filter(&filter)?.clone();
        let store = self.state.documents.lock().unwrap();
        Ok(store
            .iter()
            .find(|document| document_matches(&filter, document))
            .cloned())
    }

    async fn find(&self, filter: Value) -> RemoteResult<Vec<Value>> {
        let filter = as_filter(&filter)?.clone();
        let store = self.state.documents.lock().unwrap();
        Ok(store
            .iter()
            .filter(|document| document_matches(&filter, document))
            .cloned()
            .collect())
    }

    async fn delete_one(&self, filter: Value) -> RemoteResult<DeleteResult> {
        self.apply_delete(&filter, false)
    }

    async fn delete_many(&self, filter: Value) -> RemoteResult<DeleteResult> {
        self.apply_delete(&filter, true)
    }

    async fn count(&self, filter: Value) -> RemoteResult<u64> {
        let filter = as_filter(&filter)?.clone();
        let store = self.state.documents.lock().unwrap();
        Ok(store
            .iter()
            .filter(|document| document_matches(&filter, document))
            .count() as u64)
    }

    async fn update_one(&self, filter: Value, update: Value) -> RemoteResult<UpdateResult> {
        self.apply_update(&filter, &update, false)
    }

    async fn update_many(&self, filter: Value, update: Value) -> RemoteResult<UpdateResult> {
        self.apply_update(&filter, &update, true)
    }

    async fn watch(&self, spec: WatchSpec) -> RemoteResult<ChangeStream> {
        let (sender, receiver) = async_channel::unbounded();
        self.state
            .watchers
            .lock()
            .unwrap()
            .push(Watcher { spec, sender });
        Ok(receiver)
    }
}

fn as_filter(filter: &Value) -> RemoteResult<&Map<String, Value>> {
    match filter {
        Value::Object(fields) => Ok(fields),
        other => Err(query_error(format!(
            "filters must be JSON objects, got {other}"
        ))),
    }
}

/// Equality matching: every filter entry must equal the document value at the
/// (possibly dotted) path. An empty filter matches every document.
fn document_matches(filter: &Map<String, Value>, document: &Value) -> bool {
    filter
        .iter()
        .all(|(path, expected)| value_at_path(document, path) == Some(expected))
}

fn value_at_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn watcher_matches(spec: &WatchSpec, key: &Value, document: &Value) -> bool {
    match spec {
        WatchSpec::Ids(ids) => match key {
            Value::String(hex) => ids.iter().any(|id| id.to_hex() == *hex),
            _ => false,
        },
        WatchSpec::Filter(filter) => match filter {
            Value::Object(fields) => document_matches(fields, document),
            _ => false,
        },
    }
}

fn updated_document(document: &Value, update: &Value) -> RemoteResult<Value> {
    let Value::Object(operations) = update else {
        return Err(write_error("update specifications must be JSON objects"));
    };

    let uses_operators = operations.keys().any(|key| key.starts_with('$'));
    if !uses_operators {
        // Replacement semantics: new fields win, the identifier survives.
        let mut replaced = operations.clone();
        if let Some(id) = document.get("_id") {
            replaced.insert("_id".to_string(), id.clone());
        }
        return Ok(Value::Object(replaced));
    }

    let mut fields = document
        .as_object()
        .cloned()
        .unwrap_or_default();
    for (operator, arguments) in operations {
        let Value::Object(arguments) = arguments else {
            return Err(write_error(format!(
                "{operator} expects an object of field paths"
            )));
        };
        match operator.as_str() {
            "$set" => {
                for (path, value) in arguments {
                    set_at_path(&mut fields, path, value.clone());
                }
            }
            "$unset" => {
                for path in arguments.keys() {
                    unset_at_path(&mut fields, path);
                }
            }
            "$inc" => {
                for (path, delta) in arguments {
                    let delta = delta
                        .as_f64()
                        .ok_or_else(|| write_error("$inc requires numeric amounts"))?;
                    let current = value_at_path(&Value::Object(fields.clone()), path)
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    set_at_path(&mut fields, path, number_value(current + delta));
                }
            }
            other => {
                return Err(write_error(format!("unsupported update operator {other}")));
            }
        }
    }
    Ok(Value::Object(fields))
}

fn set_at_path(fields: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = fields
                .entry(head)
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child_fields) = child {
                set_at_path(child_fields, rest, value);
            }
        }
    }
}

fn unset_at_path(fields: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            fields.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child_fields)) = fields.get_mut(head) {
                unset_at_path(child_fields, rest);
            }
        }
    }
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
