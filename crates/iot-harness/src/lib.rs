//! Deterministic test harness for `iot-core`'s connection engine.
//!
//! Provides a seeded virtual-time [`Environment`](iot_core::Environment) and
//! an in-memory [`Transport`](iot_core::Transport) pair, so the engine's
//! concurrency and timing behavior (keep-alive, reassembly timeouts,
//! request/response timeouts) can be exercised without real sockets or wall-
//! clock waits.

mod env;
mod transport;

pub use env::VirtualEnvironment;
pub use transport::{RecordingTransport, spawn_forwarder};
