use std::collections::HashMap;

use bytes::BytesMut;
use iot_proto::{Headers, Method, Request};

/// State for one id's in-progress multipart reassembly.
struct Entry {
    method: Method,
    version: u8,
    id: Option<u16>,
    path: Option<String>,
    headers: Headers,
    total: u32,
    parts: u32,
    body: BytesMut,
    /// Bumped every time a fragment arrives; a pending timeout task compares
    /// its captured generation against this value and no-ops if they no
    /// longer match, so resetting the inactivity timer never requires
    /// cancelling a spawned task.
    generation: u64,
}

/// Outcome of feeding one fragment into the table.
pub enum Ingest {
    /// More fragments are still expected; `generation` identifies this
    /// waiting period for the inactivity-timeout task to check against.
    Pending { generation: u64 },
    /// The frame is now fully reassembled.
    Complete(Request),
}

/// Tracks per-id multipart reassembly, combining fragments that each
/// re-declare the full prefix with a cumulative body.
#[derive(Default)]
pub struct ReassemblyTable {
    entries: HashMap<u16, Entry>,
}

impl ReassemblyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded fragment for `id` into the table.
    ///
    /// The first fragment for an id establishes the request's metadata
    /// (path, headers, method, version); later fragments for the same id
    /// only contribute body bytes.
    pub fn ingest(&mut self, id: u16, fragment: Request) -> Ingest {
        let total = fragment.total_body_length;
        let entry = self.entries.entry(id).or_insert_with(|| Entry {
            method: fragment.method,
            version: fragment.version,
            id: fragment.id,
            path: fragment.path.clone(),
            headers: fragment.headers.clone(),
            total,
            parts: 0,
            body: BytesMut::new(),
            generation: 0,
        });

        entry.body.extend_from_slice(&fragment.body);
        entry.parts += 1;
        entry.generation += 1;
        let generation = entry.generation;
        let received = entry.body.len() as u32;

        if received >= total {
            if let Some(entry) = self.entries.remove(&id) {
                let request = Request {
                    version: entry.version,
                    method: entry.method,
                    id: entry.id,
                    path: entry.path,
                    headers: entry.headers,
                    body: entry.body.freeze(),
                    total_body_length: entry.total,
                    parts: entry.parts,
                };
                return Ingest::Complete(request);
            }
        }

        Ingest::Pending { generation }
    }

    /// Returns the current generation for `id`, if a reassembly is pending.
    #[must_use]
    pub fn generation_of(&self, id: u16) -> Option<u64> {
        self.entries.get(&id).map(|e| e.generation)
    }

    /// Bytes already received for `id`'s in-progress reassembly, or `0` if
    /// there is none yet (i.e. the next fragment for `id` is the first).
    #[must_use]
    pub fn received_of(&self, id: u16) -> u32 {
        self.entries.get(&id).map_or(0, |e| e.body.len() as u32)
    }

    /// Drops the pending reassembly for `id` if its generation still
    /// matches `expected` (i.e. no newer fragment arrived since the timer
    /// was scheduled). Returns whether an entry was evicted.
    pub fn evict_if_stale(&mut self, id: u16, expected: u64) -> bool {
        if self.entries.get(&id).is_some_and(|e| e.generation == expected) {
            self.entries.remove(&id);
            true
        } else {
            false
        }
    }

    /// Number of ids with an in-progress reassembly.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no in-progress reassembly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
