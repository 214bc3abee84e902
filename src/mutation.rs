//! Optimistic writes against the query cache.
//!
//! Order of operations for an optimistic write:
//! 1. cancel in-flight fetches of the key
//! 2. snapshot the current value
//! 3. apply the speculative update
//! 4. run the remote write
//! 5. on failure restore the snapshot (full overwrite)
//! 6. on success invalidate so the next read reconciles with the store
//!
//! Steps 1-3 are `begin`, steps 5-6 are `settle`. The caller owns step 4,
//! which is the only place a write can suspend.
//!
//! Two writes in flight on one key each snapshot what they saw at `begin`,
//! so a failing later write rolls back to the earlier write's optimistic
//! state (last snapshot wins).

use tracing::{debug, info, warn};

use crate::cache::{QueryCache, QueryData, QueryKey};
use crate::error::Result;

/// A write whose speculative update is visible in the cache but whose remote
/// outcome is not known yet.
#[derive(Debug)]
#[must_use = "a pending mutation must be settled or the cache stays speculative"]
pub struct PendingMutation {
    key: QueryKey,
    snapshot: Option<QueryData>,
    was_stale: bool,
}

impl PendingMutation {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn snapshot(&self) -> Option<&QueryData> {
        self.snapshot.as_ref()
    }
}

/// Cancel, snapshot, apply. The update only runs when the key holds data.
pub fn begin<F>(cache: &mut QueryCache, key: QueryKey, update: F) -> PendingMutation
where
    F: FnOnce(&QueryData) -> QueryData,
{
    cache.cancel_fetches(&key);
    let snapshot = cache.get(&key).cloned();
    let was_stale = cache.is_stale(&key);
    if let Some(current) = &snapshot {
        cache.set(key.clone(), update(current));
        debug!(?key, "applied optimistic update");
    }
    PendingMutation {
        key,
        snapshot,
        was_stale,
    }
}

/// Rollback on failure, invalidate on success. The remote error is returned
/// unchanged after the rollback.
pub fn settle(cache: &mut QueryCache, pending: PendingMutation, outcome: Result<()>) -> Result<()> {
    let PendingMutation {
        key,
        snapshot,
        was_stale,
    } = pending;
    match outcome {
        Ok(()) => {
            info!(?key, "mutation confirmed");
            cache.invalidate(&key);
            Ok(())
        }
        Err(err) => {
            warn!(?key, error = %err, "mutation failed, rolling back");
            cache.restore(key, snapshot, was_stale);
            Err(err)
        }
    }
}

/// One-shot optimistic write: `begin`, run `remote`, `settle`.
pub fn mutate<F, R>(cache: &mut QueryCache, key: QueryKey, update: F, remote: R) -> Result<()>
where
    F: FnOnce(&QueryData) -> QueryData,
    R: FnOnce() -> Result<()>,
{
    let pending = begin(cache, key, update);
    let outcome = remote();
    settle(cache, pending, outcome)
}

/// Non-optimistic write: the cache is untouched until the remote succeeds,
/// then every key in `affected` is invalidated.
pub fn commit<T, R>(cache: &mut QueryCache, affected: &[QueryKey], remote: R) -> Result<T>
where
    R: FnOnce() -> Result<T>,
{
    let value = remote()?;
    for key in affected {
        cache.invalidate(key);
    }
    Ok(value)
}
