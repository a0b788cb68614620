use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use iot_proto::{decode_fragment, encode, Method, Request};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::env::Environment;
use crate::error::{EngineError, Result};
use crate::handlers::ResponseHandlers;
use crate::middleware::Dispatcher;
use crate::pending::PendingTable;
use crate::reassembly::{Ingest, ReassemblyTable};
use crate::registry::ConnectionRegistry;
use crate::transport::Transport;

/// Maximum id-allocation attempts before giving up with
/// [`EngineError::IdSpaceExhausted`].
const MAX_ID_ALLOCATION_ATTEMPTS: usize = 64;

struct Inner {
    buffer_size: u32,
    remain_buffer: BytesMut,
    pending: PendingTable,
    reassembly: ReassemblyTable,
    alive_pending: Option<AlivePending>,
    buffer_size_pending: Option<BufferSizePending>,
    /// Bumped on every inbound parse and every outbound multi-fragment
    /// write; the keep-alive task compares it across its sleep to decide
    /// whether the connection has been active and the probe can be
    /// skipped.
    activity_generation: u64,
    disconnected: bool,
}

struct AlivePending {
    handlers: ResponseHandlers,
    generation: u64,
}

struct BufferSizePending {
    handlers: ResponseHandlers,
}

/// The per-connection protocol engine: owns the in-flight and reassembly
/// tables, the write lock, and the keep-alive/buffer-size sub-protocols for
/// one peer.
///
/// Cloning a `ConnectionState` is cheap and shares the same underlying
/// state; this is how the keep-alive background task and callers holding
/// the handle both observe the same connection.
pub struct ConnectionState<E: Environment, T: Transport> {
    env: E,
    transport: Arc<T>,
    config: ConnectionConfig,
    dispatcher: Arc<Dispatcher>,
    write_lock: Arc<Mutex<()>>,
    inner: Arc<Mutex<Inner>>,
    on_disconnect: Arc<dyn Fn() + Send + Sync>,
    registry: Option<ConnectionRegistry<E, T>>,
}

impl<E: Environment, T: Transport> Clone for ConnectionState<E, T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            transport: self.transport.clone(),
            config: self.config,
            dispatcher: self.dispatcher.clone(),
            write_lock: self.write_lock.clone(),
            inner: self.inner.clone(),
            on_disconnect: self.on_disconnect.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<E: Environment, T: Transport> ConnectionState<E, T> {
    /// Builds a new connection engine. Does not itself start the keep-alive
    /// schedule; call [`Self::listen`] once the transport is ready to
    /// receive writes.
    pub fn new(
        env: E,
        transport: T,
        config: ConnectionConfig,
        dispatcher: Dispatcher,
        on_disconnect: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            env,
            transport: Arc::new(transport),
            config,
            dispatcher: Arc::new(dispatcher),
            write_lock: Arc::new(Mutex::new(())),
            inner: Arc::new(Mutex::new(Inner {
                buffer_size: config.buffer_size,
                remain_buffer: BytesMut::new(),
                pending: PendingTable::new(),
                reassembly: ReassemblyTable::new(),
                alive_pending: None,
                buffer_size_pending: None,
                activity_generation: 0,
                disconnected: false,
            })),
            on_disconnect: Arc::new(on_disconnect),
            registry: None,
        }
    }

    /// Registers this connection in `registry` under its transport's
    /// [`Transport::peer_id`]. A peer reconnecting from the same address
    /// supersedes the stale entry rather than being rejected (see
    /// [`ConnectionRegistry::register`]).
    ///
    /// Call before [`Self::listen`] so the entry exists for the whole
    /// connection lifetime, including the very first keep-alive cycle.
    #[must_use]
    pub fn with_registry(mut self, registry: ConnectionRegistry<E, T>) -> Self {
        registry.register(self.transport.peer_id(), self.clone());
        self.registry = Some(registry);
        self
    }

    /// Starts the keep-alive schedule. Spawns a background task that runs
    /// for the lifetime of the connection (or until
    /// [`ConnectionConfig::alive_interval_secs`] is `0`, in which case this
    /// is a no-op).
    pub fn listen(&self) {
        let Some(interval) = self.config.alive_interval() else {
            debug!("keep-alive disabled for this connection");
            return;
        };
        let this = self.clone();
        tokio::spawn(async move { this.alive_loop(interval).await });
    }

    async fn alive_loop(&self, interval: std::time::Duration) {
        loop {
            let before = {
                let inner = self.inner.lock().await;
                if inner.disconnected {
                    return;
                }
                inner.activity_generation
            };

            self.env.sleep(interval).await;

            let after = {
                let inner = self.inner.lock().await;
                if inner.disconnected {
                    return;
                }
                inner.activity_generation
            };

            if after != before {
                continue;
            }

            if self.send_alive_request().await.is_err() {
                return;
            }
        }
    }

    async fn note_activity(&self) {
        let mut inner = self.inner.lock().await;
        inner.activity_generation += 1;
    }

    async fn allocate_id(&self, inner: &Inner) -> Result<u16> {
        for _ in 0..MAX_ID_ALLOCATION_ATTEMPTS {
            let candidate = self.env.random_u16();
            if candidate != 0 && !inner.pending.contains(candidate) {
                return Ok(candidate);
            }
        }
        Err(EngineError::IdSpaceExhausted)
    }

    /// Writes `prefix` followed by `body`, split into `buffer_size`-bounded
    /// fragments that each re-emit `prefix`. Returns the number of writes
    /// performed. Held under the connection's write lock for its entire
    /// duration so no other send can interleave.
    async fn write_fragmented(&self, prefix: &Bytes, body: &Bytes, buffer_size: u32) -> Result<u32> {
        let _guard = self.write_lock.lock().await;

        let chunk_cap = (buffer_size as usize).saturating_sub(prefix.len()).max(1);
        if body.len() <= chunk_cap {
            let mut frame = BytesMut::with_capacity(prefix.len() + body.len());
            frame.extend_from_slice(prefix);
            frame.extend_from_slice(body);
            self.transport.write_all(&frame).await?;
            self.note_activity().await;
            return Ok(1);
        }

        let mut parts = 0u32;
        for chunk in body.chunks(chunk_cap) {
            let mut frame = BytesMut::with_capacity(prefix.len() + chunk.len());
            frame.extend_from_slice(prefix);
            frame.extend_from_slice(chunk);
            self.transport.write_all(&frame).await?;
            parts += 1;
        }
        self.note_activity().await;
        Ok(parts)
    }

    /// Sends a one-shot frame with no response expectation (`Signal`,
    /// `Response`, `AliveResponse`, `BufferSizeResponse`).
    pub async fn send_one_shot(&self, request: Request) -> Result<u32> {
        let buffer_size = self.inner.lock().await.buffer_size;
        let encoded = encode(&request, buffer_size)?;
        self.write_fragmented(&encoded.prefix, &encoded.body, buffer_size).await
    }

    /// Sends a frame expecting a response (`Request` or `Streaming`),
    /// allocating an id if the caller didn't supply one and registering
    /// `handlers` against it.
    pub async fn send_awaiting_response(&self, mut request: Request, handlers: ResponseHandlers) -> Result<u32> {
        let id = match request.id {
            Some(id) => id,
            None => {
                let inner = self.inner.lock().await;
                self.allocate_id(&inner).await?
            }
        };
        request.id = Some(id);

        let buffer_size = {
            let mut inner = self.inner.lock().await;
            inner.pending.insert(id, request.clone(), handlers);
            inner.buffer_size
        };

        let encoded = encode(&request, buffer_size)?;
        let parts = self.write_fragmented(&encoded.prefix, &encoded.body, buffer_size).await?;

        let timeout = {
            let inner = self.inner.lock().await;
            inner.pending.handlers(id).map(|h| h.timeout)
        };
        if let Some(timeout) = timeout {
            self.schedule_pending_timeout(id, 1, timeout);
        }

        Ok(parts)
    }

    async fn ensure_id(&self, request: &mut Request) -> Result<()> {
        if request.id.is_none() {
            let inner = self.inner.lock().await;
            request.id = Some(self.allocate_id(&inner).await?);
        }
        Ok(())
    }

    /// Sends `request` as a `Signal`: fire-and-forget, no response
    /// expected. Returns `request` with `parts` set to the number of wire
    /// fragments the send produced.
    pub async fn signal(&self, mut request: Request) -> Result<Request> {
        request.method = Method::Signal;
        request.parts = self.send_one_shot(request.clone()).await?;
        Ok(request)
    }

    /// Sends `request` as a `Request`, expecting a matching `Response`.
    /// Always carries an id (allocating one if unset) so the peer can echo
    /// it back, even when `resp` is `None` and the caller isn't watching
    /// for the reply.
    pub async fn request(&self, mut request: Request, resp: Option<ResponseHandlers>) -> Result<Request> {
        request.method = Method::Request;
        self.ensure_id(&mut request).await?;
        request.parts = match resp {
            Some(handlers) => self.send_awaiting_response(request.clone(), handlers).await?,
            None => self.send_one_shot(request.clone()).await?,
        };
        Ok(request)
    }

    /// Sends `request` as a `Response`, matching a prior `Request` by the
    /// id the caller set on it.
    pub async fn response(&self, mut request: Request) -> Result<Request> {
        request.method = Method::Response;
        request.parts = self.send_one_shot(request.clone()).await?;
        Ok(request)
    }

    /// Sends `request` as a `Streaming` frame. Like [`Self::request`],
    /// always carries an id: a body spanning multiple fragments needs one
    /// to reassemble as a single message on the far side, regardless of
    /// whether the caller wants a response at all.
    pub async fn streaming(&self, mut request: Request, resp: Option<ResponseHandlers>) -> Result<Request> {
        request.method = Method::Streaming;
        self.ensure_id(&mut request).await?;
        request.parts = match resp {
            Some(handlers) => self.send_awaiting_response(request.clone(), handlers).await?,
            None => self.send_one_shot(request.clone()).await?,
        };
        Ok(request)
    }

    /// Sends a manual `AliveRequest` liveness probe, independent of the
    /// background keep-alive schedule started by [`Self::listen`]. Shares
    /// the single alive-pending slot with that schedule, so it supersedes
    /// rather than queues alongside any probe already in flight.
    pub async fn alive_request(&self, resp: Option<ResponseHandlers>) -> Result<Request> {
        let handlers = resp.unwrap_or_else(|| ResponseHandlers::silent(self.config.timeout()));
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.activity_generation += 1;
            let generation = inner.activity_generation;
            inner.alive_pending = Some(AlivePending { handlers: handlers.clone(), generation });
            generation
        };
        let mut request = Request::new(Method::AliveRequest);
        request.parts = self.send_one_shot(request.clone()).await?;
        self.schedule_alive_timeout(generation, handlers.timeout);
        Ok(request)
    }

    /// Sends an `AliveResponse`, answering a peer's `AliveRequest`. The
    /// engine already does this inline from [`Self::route_fragment`]; this
    /// is for callers that want to answer liveness probes themselves.
    pub async fn alive_response(&self) -> Result<Request> {
        let mut request = Request::new(Method::AliveResponse);
        request.parts = self.send_one_shot(request.clone()).await?;
        Ok(request)
    }

    fn schedule_pending_timeout(&self, id: u16, generation: u64, timeout: std::time::Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            this.env.sleep(timeout).await;
            let removed = {
                let mut inner = this.inner.lock().await;
                inner.pending.evict_if_stale(id, generation)
            };
            if let Some(entry) = removed {
                if let Some(on_timeout) = &entry.handlers.on_timeout {
                    on_timeout();
                }
            }
        });
    }

    async fn send_alive_request(&self) -> Result<()> {
        let handlers = ResponseHandlers::on_response(self.config.timeout(), |_| {}).with_on_timeout({
            let this = self.clone();
            move || {
                let this = this.clone();
                tokio::spawn(async move {
                    this.disconnect().await;
                });
            }
        });

        let generation = {
            let mut inner = self.inner.lock().await;
            inner.activity_generation += 1;
            let generation = inner.activity_generation;
            inner.alive_pending = Some(AlivePending { handlers: handlers.clone(), generation });
            generation
        };

        let request = Request::new(Method::AliveRequest);
        self.send_one_shot(request).await?;
        self.schedule_alive_timeout(generation, handlers.timeout);
        Ok(())
    }

    fn schedule_alive_timeout(&self, generation: u64, timeout: std::time::Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            this.env.sleep(timeout).await;
            let fired = {
                let mut inner = this.inner.lock().await;
                match &inner.alive_pending {
                    Some(pending) if pending.generation == generation => {
                        let handlers = inner.alive_pending.take().map(|p| p.handlers);
                        handlers
                    }
                    _ => None,
                }
            };
            if let Some(handlers) = fired {
                if let Some(on_timeout) = &handlers.on_timeout {
                    on_timeout();
                }
            }
        });
    }

    /// Tears down the connection: shuts down the transport, drains every
    /// pending response and reassembly entry, and invokes the
    /// `on_disconnect` hook exactly once.
    pub async fn disconnect(&self) {
        let drained = {
            let mut inner = self.inner.lock().await;
            if inner.disconnected {
                return;
            }
            inner.disconnected = true;
            inner.pending.drain()
        };
        let _ = self.transport.shutdown().await;
        for (_, entry) in drained {
            if let Some(on_timeout) = &entry.handlers.on_timeout {
                on_timeout();
            }
        }
        if let Some(registry) = &self.registry {
            registry.unregister(&self.transport.peer_id());
        }
        (self.on_disconnect)();
    }

    /// Proposes a new negotiated buffer size. The local side only starts
    /// using it for outbound fragmentation once the echoing
    /// `BufferSizeResponse` arrives.
    pub async fn buffer_size_request(&self, new_size: u32, on_applied: Option<ResponseHandlers>) -> Result<u32> {
        let size = if new_size == 0 { iot_proto::IOT_DEFAULT_BUFFER_SIZE } else { new_size };
        if let Some(handlers) = on_applied.clone() {
            let mut inner = self.inner.lock().await;
            inner.buffer_size_pending = Some(BufferSizePending { handlers });
        }
        let request = Request::new(Method::BufferSizeRequest).with_body(size.to_be_bytes().to_vec());
        self.send_one_shot(request).await
    }

    /// Feeds inbound bytes from the transport into the engine. May run
    /// middleware, resolve pending responses, or reply inline (alive,
    /// buffer-size), depending on what's decoded.
    pub async fn on_data(&self, data: &[u8]) -> Result<()> {
        let mut buf = {
            let mut inner = self.inner.lock().await;
            let mut combined = std::mem::take(&mut inner.remain_buffer);
            combined.extend_from_slice(data);
            combined
        };

        loop {
            if buf.is_empty() {
                break;
            }

            let already_received = {
                let inner = self.inner.lock().await;
                peek_already_received(&buf, &inner.pending, &inner.reassembly)
            };

            let outcome = match decode_fragment(&buf, already_received) {
                Ok(Some(fragment)) => fragment,
                Ok(None) => break,
                Err(err) => {
                    warn!(?err, "dropping malformed frame");
                    buf.clear();
                    break;
                }
            };

            let consumed = outcome.consumed;
            let fragment_request = outcome.request;
            let _ = buf.split_to(consumed.min(buf.len()));

            self.note_activity().await;
            self.route_fragment(fragment_request).await?;
        }

        let mut inner = self.inner.lock().await;
        inner.remain_buffer = buf;
        Ok(())
    }

    async fn route_fragment(&self, fragment: Request) -> Result<()> {
        match fragment.method {
            Method::AliveRequest => {
                trace!("answering inline alive request");
                let response = Request::new(Method::AliveResponse);
                self.send_one_shot(response).await?;
            }
            Method::AliveResponse => {
                let handlers = {
                    let mut inner = self.inner.lock().await;
                    inner.alive_pending.take().map(|p| p.handlers)
                };
                if let Some(handlers) = handlers {
                    if let Some(on_response) = &handlers.on_response {
                        on_response(fragment);
                    }
                }
            }
            Method::BufferSizeRequest => {
                let new_size = parse_buffer_size_body(&fragment.body);
                {
                    let mut inner = self.inner.lock().await;
                    inner.buffer_size = new_size;
                }
                let echo = Request::new(Method::BufferSizeResponse).with_body(new_size.to_be_bytes().to_vec());
                self.send_one_shot(echo).await?;
            }
            Method::BufferSizeResponse => {
                let new_size = parse_buffer_size_body(&fragment.body);
                let handlers = {
                    let mut inner = self.inner.lock().await;
                    inner.buffer_size = new_size;
                    inner.buffer_size_pending.take().map(|p| p.handlers)
                };
                if let Some(handlers) = handlers {
                    if let Some(on_response) = &handlers.on_response {
                        on_response(fragment);
                    }
                }
            }
            Method::Response => {
                self.route_response(fragment).await;
            }
            Method::Signal | Method::Request | Method::Streaming => {
                self.route_dispatch_bound(fragment).await;
            }
        }
        Ok(())
    }

    async fn route_response(&self, fragment: Request) {
        let Some(id) = fragment.id else {
            warn!("dropping response with no id");
            return;
        };

        let fragment_len = fragment.body.len() as u32;
        let total = fragment.total_body_length;

        let (generation, complete, handlers) = {
            let mut inner = self.inner.lock().await;
            let Some((generation, complete)) = inner.pending.record_fragment(id, fragment_len, total) else {
                return;
            };
            let handlers = inner.pending.handlers(id).cloned();
            (generation, complete, handlers)
        };

        if let Some(handlers) = &handlers {
            if let Some(on_response) = &handlers.on_response {
                on_response(fragment);
            }
        }

        if complete {
            let mut inner = self.inner.lock().await;
            inner.pending.remove(id);
        } else if let Some(handlers) = handlers {
            self.schedule_pending_timeout(id, generation, handlers.timeout);
        }
    }

    async fn route_dispatch_bound(&self, fragment: Request) {
        let Some(id) = fragment.id else {
            self.dispatcher.dispatch(fragment).await;
            return;
        };

        let outcome = {
            let mut inner = self.inner.lock().await;
            inner.reassembly.ingest(id, fragment)
        };

        match outcome {
            Ingest::Complete(request) => self.dispatcher.dispatch(request).await,
            Ingest::Pending { generation } => {
                self.schedule_reassembly_timeout(id, generation, self.config.multipart_timeout());
            }
        }
    }

    /// Schedules the 5 s (by default) multipart inactivity timeout for an
    /// in-progress reassembly. If no further fragment for `id` arrives
    /// before `timeout` elapses, the entry is discarded silently — per
    /// §4.3/§7, this is not surfaced as an error; the protocol has no
    /// explicit cancel, so a later fragment for the same id simply starts a
    /// fresh reassembly.
    fn schedule_reassembly_timeout(&self, id: u16, generation: u64, timeout: std::time::Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            this.env.sleep(timeout).await;
            let evicted = {
                let mut inner = this.inner.lock().await;
                inner.reassembly.evict_if_stale(id, generation)
            };
            if evicted {
                trace!(id, "dropping stale multipart reassembly after inactivity timeout");
            }
        });
    }
}

fn parse_buffer_size_body(body: &Bytes) -> u32 {
    if body.len() < 4 {
        return iot_proto::IOT_DEFAULT_BUFFER_SIZE;
    }
    let size = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    if size == 0 {
        iot_proto::IOT_DEFAULT_BUFFER_SIZE
    } else {
        size
    }
}

/// Peeks at the control bytes and id (without fully parsing the frame) to
/// look up how many body bytes have already been received for whichever
/// table this method's continuation state lives in: the pending table for
/// `Response`, the reassembly table for `Signal`/`Request`/`Streaming`.
/// Returns `0` if the buffer is too short, the id flag is unset, or no
/// continuation state exists yet — all of which correctly describe a first
/// fragment.
fn peek_already_received(buf: &[u8], pending: &PendingTable, reassembly: &ReassemblyTable) -> u32 {
    if buf.len() < 4 || buf[0] & iot_proto::IOT_MSCB_ID == 0 {
        return 0;
    }
    let Ok(method) = Method::from_u8(buf[1] >> 2) else {
        return 0;
    };
    let id = u16::from_be_bytes([buf[2], buf[3]]);
    match method {
        Method::Response => pending.received_of(id),
        Method::Signal | Method::Request | Method::Streaming => reassembly.received_of(id),
        Method::AliveRequest | Method::AliveResponse | Method::BufferSizeRequest | Method::BufferSizeResponse => 0,
    }
}
