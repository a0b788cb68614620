use thiserror::Error;

/// Failures raised while encoding or decoding a single logical frame.
///
/// These are all codec-local: nothing here knows about connections, tables,
/// or timers. A decode error drops the offending frame; it never implies the
/// underlying byte stream is unrecoverable.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Fewer than two bytes were available; not even the control bytes fit.
    #[error("frame shorter than the 2-byte control prefix")]
    HeaderTooShort,

    /// The LSCB's method bits did not match any known [`crate::Method`].
    #[error("unknown method {0}")]
    UnknownMethod(u8),

    /// The MSCB's path flag was set but no ETX terminator was found.
    #[error("path field is missing its ETX terminator")]
    MissingPathTerminator,

    /// A header's key or value was missing its RS/ETX terminator.
    #[error("header field is missing its terminator")]
    MissingHeaderTerminator,

    /// The header count byte declared more headers than fit the buffer.
    #[error("header count {0} exceeds the 255-header limit")]
    TooManyHeaders(usize),

    /// `path + encoded_headers` exceeded `buffer_size - 8`.
    #[error("path and headers ({found} bytes) exceed the {limit} byte budget")]
    PrefixTooLarge {
        /// Encoded size of path plus headers.
        found: u32,
        /// `buffer_size - IOT_PREFIX_RESERVE`.
        limit: u32,
    },

    /// The body was longer than the method's length field can express.
    #[error("body of {found} bytes exceeds the {limit} byte limit for this method")]
    BodyTooLarge {
        /// Requested body length.
        found: u32,
        /// Maximum the method's length field can carry.
        limit: u32,
    },

    /// A path, header key, or header value was not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    NonUtf8Field {
        /// Which field failed to decode (`"path"`, `"header key"`, …).
        field: &'static str,
    },

    /// An `AliveRequest`/`AliveResponse` frame set the header or body flag.
    #[error("alive frames may not carry headers or a body")]
    AliveFrameCarriesPayload,

    /// An alive or buffer-size frame carried an id; those methods are always
    /// matched by position, never by id.
    #[error("method {0:?} must not carry an id")]
    IdNotAllowed(crate::Method),
}
