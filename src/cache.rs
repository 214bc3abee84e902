//! Keyed cache of last-known-good query results.
//!
//! Staleness is event driven: an entry only goes stale through `invalidate`.
//! Fetches are ticketed so a superseded or cancelled read can never overwrite
//! newer data.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::models::{Application, Note};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Applications,
    Notes(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Applications(Vec<Application>),
    Notes(Vec<Note>),
}

impl QueryData {
    pub fn as_applications(&self) -> Option<&[Application]> {
        match self {
            QueryData::Applications(apps) => Some(apps),
            _ => None,
        }
    }

    pub fn as_notes(&self) -> Option<&[Note]> {
        match self {
            QueryData::Notes(notes) => Some(notes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Handle for one in-flight read. Completing it applies the result only if
/// the read is still the newest live one for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    seq: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug, Default)]
struct Entry {
    data: Option<QueryData>,
    stale: bool,
    observers: usize,
    revision: u64,
    // fetch sequencing
    issued: u64,
    cancelled_through: u64,
    applied: u64,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Entry>,
    observers: HashMap<ObserverId, QueryKey>,
    next_observer: u64,
    next_fetch: u64,
    scheduled: VecDeque<QueryKey>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&QueryData> {
        self.entries.get(key).and_then(|entry| entry.data.as_ref())
    }

    /// Writes `data` as the entry's current value and marks it fresh.
    pub fn set(&mut self, key: QueryKey, data: QueryData) {
        let entry = self.entries.entry(key).or_default();
        entry.data = Some(data);
        entry.stale = false;
        entry.revision += 1;
    }

    /// Full overwrite with a previously captured value. `None` drops the data.
    /// A snapshot taken while stale comes back stale, and is queued again
    /// when observed, so a rollback never swallows a pending invalidation.
    pub fn restore(&mut self, key: QueryKey, snapshot: Option<QueryData>, stale: bool) {
        let entry = match snapshot {
            Some(data) => {
                self.set(key.clone(), data);
                self.entries.get_mut(&key)
            }
            None => self.entries.get_mut(&key).map(|entry| {
                entry.data = None;
                entry.revision += 1;
                entry
            }),
        };
        let Some(entry) = entry else {
            return;
        };
        entry.stale = stale;
        if stale {
            self.schedule(&key);
        }
    }

    /// Monotonic per-key counter bumped on every write; lets observers skip
    /// recomputing a projection when nothing changed.
    pub fn revision(&self, key: &QueryKey) -> u64 {
        self.entries.get(key).map_or(0, |entry| entry.revision)
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.stale)
    }

    /// True when a read must go to the store: nothing cached, or invalidated.
    pub fn needs_fetch(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .is_none_or(|entry| entry.data.is_none() || entry.stale)
    }

    pub fn subscribe(&mut self, key: QueryKey) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.entries.entry(key.clone()).or_default().observers += 1;
        self.observers.insert(id, key);
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) {
        if let Some(key) = self.observers.remove(&id) {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.observers = entry.observers.saturating_sub(1);
            }
        }
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.observers)
    }

    pub fn begin_fetch(&mut self, key: QueryKey) -> FetchTicket {
        self.next_fetch += 1;
        let seq = self.next_fetch;
        self.entries.entry(key.clone()).or_default().issued = seq;
        FetchTicket { key, seq }
    }

    /// Applies a fetch result. Returns false when the ticket was cancelled or
    /// a newer fetch for the same key already landed.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, data: QueryData) -> bool {
        let entry = self.entries.entry(ticket.key.clone()).or_default();
        if ticket.seq <= entry.cancelled_through || ticket.seq <= entry.applied {
            debug!(key = ?ticket.key, seq = ticket.seq, "discarding superseded fetch");
            return false;
        }
        entry.applied = ticket.seq;
        entry.data = Some(data);
        entry.stale = false;
        entry.revision += 1;
        true
    }

    /// Every fetch issued so far for `key` will be discarded on completion.
    pub fn cancel_fetches(&mut self, key: &QueryKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.issued > entry.cancelled_through {
                debug!(?key, through = entry.issued, "cancelling in-flight fetches");
            }
            entry.cancelled_through = entry.issued;
        }
    }

    /// Marks the entry stale and queues a refetch when someone is observing it.
    pub fn invalidate(&mut self, key: &QueryKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.stale = true;
        debug!(?key, observers = entry.observers, "invalidated");
        self.schedule(key);
    }

    fn schedule(&mut self, key: &QueryKey) {
        if self.observer_count(key) > 0 && !self.scheduled.contains(key) {
            self.scheduled.push_back(key.clone());
        }
    }

    /// Drains the queued refetches, oldest first.
    pub fn take_scheduled(&mut self) -> Vec<QueryKey> {
        self.scheduled.drain(..).collect()
    }

    pub fn remove(&mut self, key: &QueryKey) {
        self.entries.remove(key);
        self.scheduled.retain(|k| k != key);
        self.observers.retain(|_, k| k != key);
    }

    /// Drops every cached value and outstanding fetch. Observer registrations
    /// survive, so a watcher keeps receiving refetches for the new identity.
    pub fn clear(&mut self) {
        self.entries.retain(|_, entry| entry.observers > 0);
        for entry in self.entries.values_mut() {
            entry.data = None;
            entry.stale = false;
            entry.revision += 1;
            entry.cancelled_through = entry.issued;
        }
        self.scheduled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(ids: &[&str]) -> QueryData {
        QueryData::Notes(
            ids.iter()
                .map(|id| Note {
                    id: id.to_string(),
                    application_id: "a1".into(),
                    content: "text".into(),
                    created_at: "2024-01-01T00:00:00Z".into(),
                })
                .collect(),
        )
    }

    #[test]
    fn empty_cache_needs_fetch() {
        let cache = QueryCache::new();
        assert!(cache.get(&QueryKey::Applications).is_none());
        assert!(cache.needs_fetch(&QueryKey::Applications));
        assert!(!cache.is_stale(&QueryKey::Applications));
    }

    #[test]
    fn observers_share_one_entry() {
        let mut cache = QueryCache::new();
        let key = QueryKey::Notes("a1".into());
        let board = cache.subscribe(key.clone());
        let panel = cache.subscribe(key.clone());
        assert_eq!(cache.observer_count(&key), 2);

        cache.set(key.clone(), notes(&["n1"]));
        assert_eq!(cache.get(&key), Some(&notes(&["n1"])));

        cache.unsubscribe(board);
        cache.unsubscribe(panel);
        cache.unsubscribe(panel);
        assert_eq!(cache.observer_count(&key), 0);
    }

    #[test]
    fn invalidate_schedules_only_observed_keys() {
        let mut cache = QueryCache::new();
        let watched = QueryKey::Notes("a1".into());
        let unwatched = QueryKey::Notes("a2".into());
        cache.set(watched.clone(), notes(&[]));
        cache.set(unwatched.clone(), notes(&[]));
        cache.subscribe(watched.clone());

        cache.invalidate(&watched);
        cache.invalidate(&watched);
        cache.invalidate(&unwatched);

        assert!(cache.is_stale(&watched));
        assert!(cache.is_stale(&unwatched));
        assert!(cache.needs_fetch(&unwatched));
        assert_eq!(cache.take_scheduled(), vec![watched]);
        assert!(cache.take_scheduled().is_empty());
    }

    #[test]
    fn cancelled_fetch_is_discarded() {
        let mut cache = QueryCache::new();
        let key = QueryKey::Notes("a1".into());
        cache.set(key.clone(), notes(&["n1"]));

        let ticket = cache.begin_fetch(key.clone());
        cache.cancel_fetches(&key);
        assert!(!cache.complete_fetch(ticket, notes(&[])));
        assert_eq!(cache.get(&key), Some(&notes(&["n1"])));

        let ticket = cache.begin_fetch(key.clone());
        assert!(cache.complete_fetch(ticket, notes(&["n2"])));
        assert_eq!(cache.get(&key), Some(&notes(&["n2"])));
    }

    #[test]
    fn older_fetch_never_reverts_newer_result() {
        let mut cache = QueryCache::new();
        let key = QueryKey::Notes("a1".into());
        let first = cache.begin_fetch(key.clone());
        let second = cache.begin_fetch(key.clone());

        assert!(cache.complete_fetch(second, notes(&["new"])));
        assert!(!cache.complete_fetch(first, notes(&["old"])));
        assert_eq!(cache.get(&key), Some(&notes(&["new"])));
    }

    #[test]
    fn restore_none_drops_data_and_revision_moves() {
        let mut cache = QueryCache::new();
        let key = QueryKey::Notes("a1".into());
        cache.set(key.clone(), notes(&["n1"]));
        let before = cache.revision(&key);

        cache.restore(key.clone(), None, false);
        assert!(cache.get(&key).is_none());
        assert!(cache.revision(&key) > before);
    }

    #[test]
    fn restore_keeps_pending_invalidation() {
        let mut cache = QueryCache::new();
        let key = QueryKey::Notes("a1".into());
        cache.subscribe(key.clone());
        cache.set(key.clone(), notes(&["n1"]));
        cache.invalidate(&key);
        assert_eq!(cache.take_scheduled(), vec![key.clone()]);

        // optimistic write over a stale entry, then rollback
        cache.set(key.clone(), notes(&["n1", "tmp"]));
        cache.restore(key.clone(), Some(notes(&["n1"])), true);

        assert_eq!(cache.get(&key), Some(&notes(&["n1"])));
        assert!(cache.is_stale(&key));
        assert!(cache.needs_fetch(&key));
        assert_eq!(cache.take_scheduled(), vec![key]);
    }

    #[test]
    fn clear_drops_data_but_keeps_observers() {
        let mut cache = QueryCache::new();
        let watched = QueryKey::Applications;
        let unwatched = QueryKey::Notes("a1".into());
        cache.subscribe(watched.clone());
        cache.set(watched.clone(), QueryData::Applications(vec![]));
        cache.set(unwatched.clone(), notes(&["n1"]));
        let ticket = cache.begin_fetch(watched.clone());

        cache.clear();
        assert!(cache.get(&watched).is_none());
        assert!(cache.get(&unwatched).is_none());
        assert_eq!(cache.observer_count(&watched), 1);
        // reads issued for the previous identity are dropped
        assert!(!cache.complete_fetch(ticket, QueryData::Applications(vec![])));

        cache.set(watched.clone(), QueryData::Applications(vec![]));
        cache.invalidate(&watched);
        assert_eq!(cache.take_scheduled(), vec![watched]);
    }
}
