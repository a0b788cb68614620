use bytes::Bytes;
use indexmap::IndexMap;

use crate::method::Method;

/// Ordered header mapping; order is preserved across an encode/decode
/// round-trip, matching the wire's header-block ordering.
pub type Headers = IndexMap<String, String>;

/// A single logical frame, fully reassembled.
///
/// `Request` is the unit both the encoder and decoder operate on. It does
/// not know about connections, sockets, or reassembly state; a connection
/// only ever sees a complete `Request` once all of its fragments have
/// arrived (see `iot_core`'s reassembly engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Protocol version, 1..=63.
    pub version: u8,
    /// Which of the eight wire methods this frame carries.
    pub method: Method,
    /// Caller's choice for most methods; absent for `method.forbids_id()`.
    pub id: Option<u16>,
    /// Present iff the MSCB path flag was set.
    pub path: Option<String>,
    /// Ordered header block; empty if the LSCB header flag was unset.
    pub headers: Headers,
    /// The body bytes actually delivered by this fragment.
    pub body: Bytes,
    /// Authoritative total body length declared by the first fragment.
    pub total_body_length: u32,
    /// Number of TCP writes used to send this frame, or fragments
    /// reassembled to receive it.
    pub parts: u32,
}

impl Request {
    /// Builds a minimal request for `method` with no id, path, headers, or
    /// body. Callers fill in whichever fields the method requires.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            version: crate::constants::IOT_VERSION,
            method,
            id: None,
            path: None,
            headers: Headers::new(),
            body: Bytes::new(),
            total_body_length: 0,
            parts: 0,
        }
    }

    /// Sets the body, updating `total_body_length` to match.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.total_body_length = body.len() as u32;
        self.body = body;
        self
    }

    /// Overrides `total_body_length` independently of the body actually
    /// attached, for constructing a single fragment of a larger message.
    #[must_use]
    pub fn with_total_body_length(mut self, total: u32) -> Self {
        self.total_body_length = total;
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the id explicitly, bypassing allocation.
    #[must_use]
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = Some(id);
        self
    }

    /// Inserts a single header, preserving insertion order.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Whether this request has received all of its declared body bytes.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.body.len() as u32 >= self.total_body_length
    }
}
