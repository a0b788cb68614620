//! Wire codec for the IoT request/response protocol.
//!
//! This crate is the "Frame Codec" component: pure functions that turn a
//! [`Request`] into bytes and back. It owns no sockets, timers, or
//! connection state — that is [`iot_core`](../iot_core/index.html)'s job.
//! Multi-fragment reassembly across TCP writes is modeled one fragment at a
//! time via [`decode_fragment`]; stitching fragments together for a given
//! request id is the caller's responsibility.

mod codec;
mod constants;
mod error;
mod method;
mod request;

pub use codec::{decode_fragment, encode, DecodedFragment, EncodedFrame};
pub use constants::{
    IOT_DEFAULT_ALIVE_INTERVAL_SECS, IOT_DEFAULT_BUFFER_SIZE, IOT_DEFAULT_TIMEOUT_MS,
    IOT_DEFAULT_WRITE_LOCK_POLL_DELAY_MS, IOT_ETX, IOT_LSCB_BODY, IOT_LSCB_HEADER, IOT_MAX_BODY_REQUEST,
    IOT_MAX_BODY_SIGNAL, IOT_MAX_BODY_STREAMING, IOT_MAX_HEADERS, IOT_MSCB_ID, IOT_MSCB_PATH, IOT_MULTIPART_TIMEOUT_MS,
    IOT_PREFIX_RESERVE, IOT_RS, IOT_VERSION,
};
pub use error::ProtocolError;
pub use method::Method;
pub use request::{Headers, Request};
