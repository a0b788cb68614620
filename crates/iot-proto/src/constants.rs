//! Wire-level constants shared by the encoder and decoder.

/// Default protocol version placed in the high bits of the MSCB.
pub const IOT_VERSION: u8 = 1;

/// Terminates a path or a header key/value on the wire.
pub const IOT_ETX: u8 = 0x03;

/// Separates a header key from its value on the wire.
pub const IOT_RS: u8 = 0x1E;

/// MSCB bit indicating an `id` field follows the control bytes.
pub const IOT_MSCB_ID: u8 = 0x02;

/// MSCB bit indicating a `path` field follows the control bytes (and any id).
pub const IOT_MSCB_PATH: u8 = 0x01;

/// LSCB bit indicating a header block follows the id/path fields.
pub const IOT_LSCB_HEADER: u8 = 0x02;

/// LSCB bit indicating a body-length field and body follow.
pub const IOT_LSCB_BODY: u8 = 0x01;

/// Maximum number of headers a single frame may carry (fits in one byte).
pub const IOT_MAX_HEADERS: usize = 255;

/// Default negotiated buffer size, in bytes, before any renegotiation.
pub const IOT_DEFAULT_BUFFER_SIZE: u32 = 1024;

/// Bytes of prefix overhead (everything but path/headers) reserved when
/// checking `path + headers <= buffer_size - IOT_PREFIX_RESERVE`.
pub const IOT_PREFIX_RESERVE: u32 = 8;

/// Inactivity timeout, in milliseconds, before an incomplete multipart
/// reassembly is silently discarded.
pub const IOT_MULTIPART_TIMEOUT_MS: u64 = 5000;

/// Default request/response timeout, in milliseconds.
pub const IOT_DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default delay, in milliseconds, between write-lock poll attempts.
///
/// Retained for hosts that still read this constant; the engine's own write
/// serialization uses an async mutex rather than polling (see
/// `ConnectionConfig::write_lock_poll_delay`).
pub const IOT_DEFAULT_WRITE_LOCK_POLL_DELAY_MS: u64 = 300;

/// Default keep-alive interval, in seconds. Zero disables keep-alive.
pub const IOT_DEFAULT_ALIVE_INTERVAL_SECS: u64 = 60;

/// Maximum body length for [`crate::Method::Signal`], [`crate::Method::BufferSizeRequest`]
/// and [`crate::Method::BufferSizeResponse`] (1-byte length field).
pub const IOT_MAX_BODY_SIGNAL: u32 = u8::MAX as u32;

/// Maximum body length for [`crate::Method::Request`] and [`crate::Method::Response`]
/// (2-byte length field).
pub const IOT_MAX_BODY_REQUEST: u32 = u16::MAX as u32;

/// Maximum body length for [`crate::Method::Streaming`] (4-byte length field).
pub const IOT_MAX_BODY_STREAMING: u32 = u32::MAX;
