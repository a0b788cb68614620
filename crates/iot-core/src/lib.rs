//! The per-connection protocol engine: frame reassembly, the
//! request/response table, keep-alive, buffer-size negotiation, and
//! middleware dispatch, built on top of [`iot_proto`]'s wire codec.
//!
//! This crate performs real I/O (unlike `iot_proto`, which is pure): it owns
//! a [`Transport`] handle and a background keep-alive task. What it does not
//! own is the transport's own implementation — accepting sockets, TLS
//! handshakes, and routing by path are all left to the host.

mod config;
mod connection;
mod env;
mod error;
mod handlers;
mod middleware;
mod pending;
mod reassembly;
mod registry;
mod transport;

pub use config::ConnectionConfig;
pub use connection::ConnectionState;
pub use env::{Environment, SystemEnvironment};
pub use error::{EngineError, Result};
pub use handlers::ResponseHandlers;
pub use middleware::{BoxFuture, Dispatcher, Middleware, Next};
pub use registry::ConnectionRegistry;
pub use transport::Transport;
