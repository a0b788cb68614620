use std::collections::HashMap;

use iot_proto::Request;

use crate::handlers::ResponseHandlers;

/// Bookkeeping for one outstanding request awaiting a response.
pub struct PendingEntry {
    /// The request as it was sent, for callers that want to correlate the
    /// eventual response against what was asked.
    pub request_snapshot: Request,
    /// Callbacks to invoke as response fragments (or a timeout) arrive.
    pub handlers: ResponseHandlers,
    /// Body bytes received across all response fragments seen so far.
    pub received: u32,
    /// Total body length declared by the first response fragment, or `0`
    /// until one has arrived.
    pub total: u32,
    /// Bumped on every matching inbound fragment; a scheduled timeout only
    /// fires if its captured generation is still current.
    pub generation: u64,
}

/// Tracks outstanding request/response pairs by id.
///
/// This also doubles as the collision check for id allocation: a method
/// that carries an id must not reuse one already present here.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<u16, PendingEntry>,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending response for `id`, sent as `request_snapshot`.
    pub fn insert(&mut self, id: u16, request_snapshot: Request, handlers: ResponseHandlers) {
        self.entries.insert(id, PendingEntry { request_snapshot, handlers, received: 0, total: 0, generation: 1 });
    }

    /// Whether `id` is currently in flight (used by id allocation to avoid
    /// collisions).
    #[must_use]
    pub fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    /// Records one more response fragment for `id`: adds `fragment_len` to
    /// the running total, updates the declared total, and bumps the
    /// generation. Returns the new generation and whether the response is
    /// now complete, or `None` if there is no such pending entry.
    pub fn record_fragment(&mut self, id: u16, fragment_len: u32, declared_total: u32) -> Option<(u64, bool)> {
        let entry = self.entries.get_mut(&id)?;
        entry.received += fragment_len;
        entry.total = declared_total;
        entry.generation += 1;
        Some((entry.generation, entry.received >= entry.total))
    }

    /// Borrows the handlers for `id`, if pending.
    #[must_use]
    pub fn handlers(&self, id: u16) -> Option<&ResponseHandlers> {
        self.entries.get(&id).map(|e| &e.handlers)
    }

    /// Body bytes already received for `id`'s response so far, or `0` if
    /// there is no pending entry or none has arrived yet.
    #[must_use]
    pub fn received_of(&self, id: u16) -> u32 {
        self.entries.get(&id).map_or(0, |e| e.received)
    }

    /// Removes and returns the pending entry for `id`, e.g. once a final
    /// response fragment has arrived or the connection is closing.
    pub fn remove(&mut self, id: u16) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    /// Removes the pending entry for `id` if its generation still matches
    /// `expected`, i.e. no fresher fragment arrived since the timeout was
    /// scheduled. Returns the removed entry, if any.
    pub fn evict_if_stale(&mut self, id: u16, expected: u64) -> Option<PendingEntry> {
        if self.entries.get(&id).is_some_and(|e| e.generation == expected) {
            self.entries.remove(&id)
        } else {
            None
        }
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains all entries, e.g. when the connection is torn down and every
    /// pending response should be abandoned.
    pub fn drain(&mut self) -> Vec<(u16, PendingEntry)> {
        self.entries.drain().collect()
    }
}
