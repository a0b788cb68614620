use std::time::Duration;

/// Per-connection tunables.
///
/// A host assembles one of these from whatever configuration source it
/// likes (environment variables, a file, hardcoded defaults) and hands it to
/// [`crate::ConnectionState::new`]; this crate never reads configuration
/// from the environment itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Seconds between keep-alive probes. `0` disables keep-alive entirely.
    pub alive_interval_secs: u64,
    /// Initial negotiated buffer size, in bytes, before any renegotiation.
    pub buffer_size: u32,
    /// Default request/response timeout, in milliseconds, used when a send
    /// operation does not specify one explicitly.
    pub timeout_ms: u64,
    /// Inactivity timeout, in milliseconds, for an incomplete multipart
    /// reassembly before it is silently discarded.
    pub multipart_timeout_ms: u64,
    /// Delay, in milliseconds, between write-lock poll attempts.
    ///
    /// Unused by this implementation: write serialization is done with a
    /// `tokio::sync::Mutex` rather than a polled boolean (see the engine's
    /// design notes on the write lock). Kept on the struct so hosts carrying
    /// over tuning from another implementation have somewhere to put it.
    pub write_lock_poll_delay_ms: u64,
}

impl ConnectionConfig {
    /// Returns [`Self::timeout_ms`] as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns [`Self::multipart_timeout_ms`] as a [`Duration`].
    #[must_use]
    pub fn multipart_timeout(&self) -> Duration {
        Duration::from_millis(self.multipart_timeout_ms)
    }

    /// Returns [`Self::alive_interval_secs`] as a [`Duration`], or `None` if
    /// keep-alive is disabled.
    #[must_use]
    pub fn alive_interval(&self) -> Option<Duration> {
        (self.alive_interval_secs > 0).then(|| Duration::from_secs(self.alive_interval_secs))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            alive_interval_secs: iot_proto::IOT_DEFAULT_ALIVE_INTERVAL_SECS,
            buffer_size: iot_proto::IOT_DEFAULT_BUFFER_SIZE,
            timeout_ms: iot_proto::IOT_DEFAULT_TIMEOUT_MS,
            multipart_timeout_ms: iot_proto::IOT_MULTIPART_TIMEOUT_MS,
            write_lock_poll_delay_ms: iot_proto::IOT_DEFAULT_WRITE_LOCK_POLL_DELAY_MS,
        }
    }
}
