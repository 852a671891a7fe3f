//! HTTP surface: a small axum server exposing the messaging client to external callers.
//!
//! `routes` builds the route table around an `ApiState`; `server` binds, serves and shuts down.

mod api;
mod server;

pub use api::{routes, ApiState, SendRequest};
pub use server::{bind_listener, serve, shutdown_signal};
