//! Seam to the hosted backend. The bridge holds exactly one [`AppClient`]
//! handle and proxies every operation through these traits; swapping the
//! implementation (production transport, [`InMemoryAppClient`] for tests)
//! never touches the facade.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub mod error;
pub mod in_memory;
mod object_id;
mod types;

pub use error::{RemoteError, RemoteErrorCode, RemoteResult};
pub use in_memory::{InMemoryAppClient, InMemoryConnector};
pub use object_id::{ObjectId, ObjectIdError};
pub use types::{
    ChangeEvent, ChangeOperation, ChangeStream, Credential, DeleteResult, RemoteUser, UpdateResult,
    WatchSpec,
};

/// Establishes an authenticated connection for an application identifier.
/// Called once per bridge lifetime; the produced handle is shared by every
/// subsequent operation.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ServiceConnector: Send + Sync + 'static {
    async fn connect(&self, app_id: &str) -> RemoteResult<Arc<dyn AppClient>>;
}

/// Connected handle to the hosted service: document storage, identity
/// provider, and named server-side functions.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AppClient: Send + Sync + 'static {
    fn auth(&self) -> Arc<dyn AuthClient>;

    /// Resolves a `(database, collection)` pair to a handle able to run
    /// queries and mutations against that collection. Pure lookup, resolved
    /// anew on every call.
    fn collection(&self, database: &str, collection: &str)
        -> RemoteResult<Arc<dyn RemoteCollection>>;

    /// Invokes a named server-side function with positional arguments and
    /// returns its result untouched.
    async fn call_function(&self, name: &str, args: &[Value]) -> RemoteResult<Value>;
}

/// Identity-provider surface of the service.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AuthClient: Send + Sync + 'static {
    async fn login(&self, credential: Credential) -> RemoteResult<RemoteUser>;
    async fn register_with_email(&self, email: &str, password: &str) -> RemoteResult<()>;
    async fn send_reset_password_email(&self, email: &str) -> RemoteResult<()>;
    async fn logout(&self) -> RemoteResult<()>;
    fn current_user(&self) -> Option<RemoteUser>;
}

/// Query/mutation surface of one remote collection.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RemoteCollection: Send + Sync + 'static {
    async fn insert_one(&self, document: Value) -> RemoteResult<()>;
    async fn insert_many(&self, documents: Vec<Value>) -> RemoteResult<()>;
    async fn find_one(&self, filter: Value) -> RemoteResult<Option<Value>>;
    async fn find(&self, filter: Value) -> RemoteResult<Vec<Value>>;
    async fn delete_one(&self, filter: Value) -> RemoteResult<DeleteResult>;
    async fn delete_many(&self, filter: Value) -> RemoteResult<DeleteResult>;
    async fn count(&self, filter: Value) -> RemoteResult<u64>;
    async fn update_one(&self, filter: Value, update: Value) -> RemoteResult<UpdateResult>;
    async fn update_many(&self, filter: Value, update: Value) -> RemoteResult<UpdateResult>;

    /// Opens a live change stream scoped to this collection. Every call opens
    /// an independent stream.
    async fn watch(&self, spec: WatchSpec) -> RemoteResult<ChangeStream>;
}
