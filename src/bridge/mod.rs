//! The facade itself: JSON-text operations in, JSON-text results and
//! host notifications out.

mod api;
pub mod error;
mod events;
mod watch;

pub use api::StoreBridge;
pub use error::{BridgeError, BridgeErrorCode, BridgeResult};
pub use events::{BridgeEvent, EventSink, NullSink, RecordingSink, SessionInfo, SessionProfile};
pub use watch::{WatchArgument, WatchSubscription};
