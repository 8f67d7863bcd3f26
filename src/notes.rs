use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::routeguide::{Point, RouteNote};

type Log = Arc<Mutex<Vec<RouteNote>>>;

/// Chat notes grouped by location, shared by every RouteChat call.
///
/// Each location gets its own append-only log, created atomically the first
/// time a note lands there. Appends to the same location are serialized by
/// that log's lock; different locations never contend.
#[derive(Debug)]
pub struct NoteLog {
    logs: DashMap<Point, Log, ahash::RandomState>,
}

impl NoteLog {
    pub fn new() -> Self {
        Self {
            logs: DashMap::default(),
        }
    }

    /// The log for `location`, created if absent. Concurrent first touches of
    /// the same location all get the same log.
    fn log_for(&self, location: &Point) -> Log {
        use dashmap::mapref::entry::Entry;

        match self.logs.entry(*location) {
            Entry::Occupied(slot) => Arc::clone(slot.get()),
            Entry::Vacant(slot) => Arc::clone(slot.insert(Log::default()).value()),
        }
    }

    /// Append `note` and return the notes that were at its location before it.
    ///
    /// The snapshot and the append happen under one lock, so of two notes
    /// recorded concurrently at a location, exactly one sees the other.
    pub fn record(&self, note: RouteNote) -> Vec<RouteNote> {
        let location = note.location.unwrap_or_default();
        let log = self.log_for(&location);
        let mut notes = log.lock();
        let prior = notes.clone();
        notes.push(note);
        prior
    }

    /// All notes recorded at `location`, in append order.
    pub fn notes_at(&self, location: &Point) -> Vec<RouteNote> {
        self.logs
            .get(location)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    /// Number of locations that have at least one note.
    pub fn locations(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl Default for NoteLog {
    fn default() -> Self {
        Self::new()
    }
}
