use std::sync::Arc;
use std::time::Duration;

use iot_proto::Request;

/// Callbacks a caller attaches to a sent `Request`/`Streaming`/
/// `BufferSizeRequest`/`AliveRequest` while it awaits a response.
///
/// `on_response` is invoked once per matching inbound fragment — including
/// non-final ones, so a `Streaming` caller can observe progress — and
/// `on_timeout` fires at most once, only if no final fragment ever arrived.
/// Exactly one of "a final `on_response` call" or "`on_timeout`" happens for
/// any given pending entry.
#[derive(Clone)]
pub struct ResponseHandlers {
    /// Called with each inbound fragment matching the pending id. Check
    /// `Request::is_complete` to tell a final delivery from a partial one.
    pub on_response: Option<Arc<dyn Fn(Request) + Send + Sync>>,
    /// Called at most once, if the pending entry's timeout elapses before a
    /// final fragment arrives.
    pub on_timeout: Option<Arc<dyn Fn() + Send + Sync>>,
    /// How long to wait after the most recent fragment (or after sending,
    /// for the first one) before giving up.
    pub timeout: Duration,
}

impl ResponseHandlers {
    /// Builds handlers with only an `on_response` callback and the default
    /// timeout.
    #[must_use]
    pub fn on_response<F>(timeout: Duration, f: F) -> Self
    where
        F: Fn(Request) + Send + Sync + 'static,
    {
        Self { on_response: Some(Arc::new(f)), on_timeout: None, timeout }
    }

    /// Attaches an `on_timeout` callback.
    #[must_use]
    pub fn with_on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(f));
        self
    }

    /// Builds handlers with neither callback set — a caller that wants an
    /// id allocated and a pending slot held (for position/id correlation)
    /// but does not care to observe the eventual response or timeout.
    #[must_use]
    pub fn silent(timeout: Duration) -> Self {
        Self { on_response: None, on_timeout: None, timeout }
    }
}
