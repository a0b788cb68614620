//! In-memory [`Transport`] for driving `iot-core` without real sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use iot_core::{ConnectionState, Environment, Result, Transport};
use tokio::sync::mpsc;

/// Records every frame written to it on an unbounded channel instead of
/// touching a real socket.
///
/// Construct a pair with [`RecordingTransport::new`], hand one side's
/// receiver to [`spawn_forwarder`] pointed at a peer [`ConnectionState`] to
/// wire two engines together, or leave it unpolled to simulate a peer that
/// never answers (e.g. the dead-peer alive-timeout scenario).
pub struct RecordingTransport {
    peer_id: String,
    outbound: mpsc::UnboundedSender<Bytes>,
    shutdown: Arc<AtomicBool>,
}

impl RecordingTransport {
    /// Builds a transport identified by `peer_id`, returning it alongside
    /// the receiver half that observes every frame it writes.
    #[must_use]
    pub fn new(peer_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peer_id: peer_id.into(), outbound: tx, shutdown: Arc::new(AtomicBool::new(false)) }, rx)
    }

    /// Whether [`Transport::shutdown`] has been called on this transport.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write_all(&self, buf: &[u8]) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        // An unbounded channel whose receiver was dropped (peer gone) looks
        // exactly like a broken pipe to the writer.
        self.outbound
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe).into())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn peer_id(&self) -> String {
        self.peer_id.clone()
    }
}

/// Spawns a task that forwards every frame read from `rx` into `target`'s
/// [`ConnectionState::on_data`], as a real socket's read loop would. Ends
/// when the sending transport is dropped or shut down.
pub fn spawn_forwarder<E: Environment, T: Transport>(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    target: ConnectionState<E, T>,
) {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if target.on_data(&chunk).await.is_err() {
                break;
            }
        }
    });
}
