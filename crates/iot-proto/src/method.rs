use crate::error::ProtocolError;

/// The eight methods carried in the LSCB's high six bits.
///
/// Body-length field width and the presence of an `id` on the wire are both
/// functions of the method; see [`Method::id_on_wire`] and
/// [`Method::body_len_width`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Method {
    /// One-shot, fire-and-forget frame. No response is expected.
    Signal = 1,
    /// Expects a matching [`Method::Response`] carrying the same id.
    Request = 2,
    /// Answers a pending [`Method::Request`] or [`Method::Streaming`].
    Response = 3,
    /// Like [`Method::Request`] but with a 4-byte body-length field, for
    /// payloads that may need to be split across many fragments.
    Streaming = 4,
    /// Keep-alive probe. Never carries headers or a body.
    AliveRequest = 5,
    /// Answers an [`Method::AliveRequest`]. Never carries headers or a body.
    AliveResponse = 6,
    /// Proposes a new negotiated buffer size (4-byte body: the new size).
    BufferSizeRequest = 7,
    /// Echoes a [`Method::BufferSizeRequest`]'s body once applied.
    BufferSizeResponse = 8,
}

impl Method {
    /// Decodes a method from the LSCB's high six bits (already shifted down).
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Signal),
            2 => Ok(Self::Request),
            3 => Ok(Self::Response),
            4 => Ok(Self::Streaming),
            5 => Ok(Self::AliveRequest),
            6 => Ok(Self::AliveResponse),
            7 => Ok(Self::BufferSizeRequest),
            8 => Ok(Self::BufferSizeResponse),
            other => Err(ProtocolError::UnknownMethod(other)),
        }
    }

    /// Whether this method must never carry an `id` field on the wire.
    ///
    /// Every other method's id is optional and caller-driven — set one to
    /// correlate a response, omit it for a fire-and-forget send. Alive and
    /// buffer-size exchanges are the exception: they are always matched by
    /// position rather than id (see the open question resolved for
    /// buffer-size negotiation), so an id on one of these frames is a
    /// protocol violation rather than merely unusual.
    #[must_use]
    pub fn forbids_id(self) -> bool {
        matches!(
            self,
            Self::AliveRequest | Self::AliveResponse | Self::BufferSizeRequest | Self::BufferSizeResponse
        )
    }

    /// Whether this method may carry headers or a body at all.
    #[must_use]
    pub fn carries_payload(self) -> bool {
        !matches!(self, Self::AliveRequest | Self::AliveResponse)
    }

    /// Width, in bytes, of the body-length field for this method.
    ///
    /// Alive methods carry no body-length field at all (returns `0`).
    #[must_use]
    pub fn body_len_width(self) -> usize {
        match self {
            Self::Signal | Self::BufferSizeRequest | Self::BufferSizeResponse => 1,
            Self::Request | Self::Response => 2,
            Self::Streaming => 4,
            Self::AliveRequest | Self::AliveResponse => 0,
        }
    }

    /// Maximum body length this method's length field can express.
    #[must_use]
    pub fn max_body_len(self) -> u32 {
        match self.body_len_width() {
            1 => crate::constants::IOT_MAX_BODY_SIGNAL,
            2 => crate::constants::IOT_MAX_BODY_REQUEST,
            4 => crate::constants::IOT_MAX_BODY_STREAMING,
            _ => 0,
        }
    }
}
