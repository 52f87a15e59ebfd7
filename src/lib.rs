//! Embeddable bridge to a hosted document-database and authentication
//! backend.
//!
//! A [`bridge::StoreBridge`] holds one connection to the hosted service and
//! exposes CRUD, session management, server-side function calls, and live
//! change subscriptions as async methods whose arguments and results are
//! JSON text, the shape a non-Rust host embedding a web view can pass
//! across its boundary. Session changes and watched-collection changes are
//! re-emitted through a host-provided [`bridge::EventSink`].
//!
//! The remote service is reached through the trait seam in [`remote`];
//! [`remote::InMemoryAppClient`] implements the whole seam in-process for
//! tests and demos.

pub mod bridge;
pub mod platform;
pub mod remote;
pub mod util;
