use iot_proto::ProtocolError;
use thiserror::Error;

/// Failures surfaced by the connection engine, layered over the codec's own
/// [`ProtocolError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The frame codec rejected a frame being encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport returned an I/O error while writing or shutting down.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The id allocator could not find a free id after repeated attempts;
    /// only possible if the in-flight table already holds close to 65535
    /// entries.
    #[error("no free request id available")]
    IdSpaceExhausted,
}

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
