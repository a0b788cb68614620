use async_trait::async_trait;

use crate::error::Result;

/// The downward API: a bidirectional byte stream, abstracted away from any
/// particular socket implementation.
///
/// A real deployment implements this over TCP or TLS; [`iot_harness`]
/// implements it over an in-memory duplex for deterministic tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Writes `buf` in full. Must not interleave with a concurrent write on
    /// the same transport; the engine already serializes calls to this
    /// method with its own write lock, so implementations do not need to.
    async fn write_all(&self, buf: &[u8]) -> Result<()>;

    /// Half-closes the transport, signaling no further writes will occur.
    async fn shutdown(&self) -> Result<()>;

    /// A stable identifier for the peer, used as the connection registry
    /// key (e.g. `"{ip}_{port}"`).
    fn peer_id(&self) -> String;
}
