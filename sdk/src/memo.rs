//! Keyed cache of shared, replaying streams.
//!
//! DESIGN
//! ======
//! `MemoCache<K, T>` maps a key to one running source stream. The first
//! request for a key invokes the source factory and spawns a driver task
//! that fans every item out over a `tokio::sync::broadcast` channel and
//! records it as the entry's latest item. The source is subscribed once no
//! matter how many observers there are. An attached observer receives every
//! item; an observer that arrives late first receives the latest one, then
//! everything after it.
//!
//! Entries never expire and the map is unbounded. Callers evict a key (or
//! clear everything) when they want the next request to subscribe afresh,
//! for example after a cached error.
//!
//! TRADE-OFFS
//! ==========
//! The live channel holds at most `LIVE_CAPACITY` unread items per
//! observer. An observer that falls further behind skips the oldest ones
//! and continues from what is still buffered.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoError {
    #[error("cannot derive cache key from arguments: {0}")]
    KeySerialization(String),
    #[error("memoized streams must be started inside a Tokio runtime")]
    NoRuntime,
}

impl ErrorCode for MemoError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::KeySerialization(_) => "E_MEMO_KEY",
            Self::NoRuntime => "E_MEMO_RUNTIME",
        }
    }
}

// =============================================================================
// CACHE
// =============================================================================

const LIVE_CAPACITY: usize = 64;

/// `live` is `None` once the source has ended or the entry was dropped.
struct Shared<T> {
    latest: Option<T>,
    live: Option<broadcast::Sender<T>>,
}

type SharedState<T> = Arc<Mutex<Shared<T>>>;

fn lock_shared<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> Shared<T> {
    fn publish(&mut self, item: T) {
        if let Some(live) = &self.live {
            // No receivers is fine: the item is still kept as `latest`.
            let _ = live.send(item.clone());
        }
        self.latest = Some(item);
    }
}

/// Snapshot `latest` and subscribe under the same lock the driver publishes under.
fn attach<T: Clone>(shared: &SharedState<T>) -> Memoized<T> {
    let state = lock_shared(shared);
    Memoized {
        shared: Arc::clone(shared),
        pending: state.latest.clone(),
        live: state.live.as_ref().map(broadcast::Sender::subscribe),
    }
}

struct Entry<T> {
    shared: SharedState<T>,
    driver: AbortHandle,
}

impl<T> Drop for Entry<T> {
    fn drop(&mut self) {
        self.driver.abort();
        lock_shared(&self.shared).live = None;
    }
}

/// Cloneable handle to a shared cache; clones see the same entries.
///
/// Dropping the last clone stops every driver task still running.
pub struct MemoCache<K, T> {
    entries: Arc<Mutex<HashMap<K, Entry<T>>>>,
}

impl<K, T> Clone for MemoCache<K, T> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}

impl<K, T> Default for MemoCache<K, T> {
    fn default() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<K, T> fmt::Debug for MemoCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("len", &self.lock().len())
            .finish()
    }
}

impl<K, T> MemoCache<K, T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry and stop their driver tasks.
    pub fn clear(&self) {
        let drained: Vec<Entry<T>> = self.lock().drain().map(|(_, entry)| entry).collect();
        debug!(count = drained.len(), "memo: cleared");
    }
}

impl<K, T> MemoCache<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone + Send + Sync + 'static,
{
    /// Return the shared handle for `key`, subscribing to `source()` on a miss.
    ///
    /// `source` runs while the cache is locked and must not touch this
    /// cache.
    ///
    /// # Errors
    ///
    /// [`MemoError::NoRuntime`] on a miss outside a Tokio runtime; `source`
    /// is not invoked then.
    pub fn get_or_subscribe<F, S>(&self, key: K, source: F) -> Result<Memoized<T>, MemoError>
    where
        F: FnOnce() -> S,
        S: Stream<Item = T> + Send + 'static,
    {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(&key) {
            debug!(?key, "memo: hit");
            return Ok(attach(&entry.shared));
        }

        let runtime = Handle::try_current().map_err(|_| MemoError::NoRuntime)?;
        debug!(?key, "memo: subscribing");
        let stream = source();
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        let shared = Arc::new(Mutex::new(Shared { latest: None, live: Some(live) }));
        let handle = attach(&shared);

        let driver_state = Arc::clone(&shared);
        let driver = runtime
            .spawn(async move {
                let mut stream = std::pin::pin!(stream);
                while let Some(item) = stream.next().await {
                    lock_shared(&driver_state).publish(item);
                }
                lock_shared(&driver_state).live = None;
            })
            .abort_handle();

        entries.insert(key, Entry { shared, driver });
        Ok(handle)
    }

    /// Remove `key`, stopping its source. Returns whether it was cached.
    pub fn evict(&self, key: &K) -> bool {
        let removed = self.lock().remove(key);
        debug!(?key, evicted = removed.is_some(), "memo: evict");
        removed.is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// One observer of a cached stream.
pub struct Memoized<T> {
    shared: SharedState<T>,
    /// Replayed item not yet handed out by `next`.
    pending: Option<T>,
    live: Option<broadcast::Receiver<T>>,
}

impl<T: Clone + Send + Sync + 'static> Memoized<T> {
    /// Most recent item, if the source has produced any yet.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        lock_shared(&self.shared).latest.clone()
    }

    /// Wait for the next item.
    ///
    /// A handle taken after the source produced something first receives
    /// that latest item, then every item that follows. Returns `None` once
    /// the source has finished (or was evicted) and everything buffered has
    /// been handed out.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(item) = self.pending.take() {
            return Some(item);
        }
        loop {
            let live = self.live.as_mut()?;
            match live.recv().await {
                Ok(item) => return Some(item),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "memo: observer lagged"),
                Err(RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    /// Adapt the handle into a stream of unseen items.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static {
        futures::stream::unfold(self, |mut handle| async move {
            let item = handle.next().await?;
            Some((item, handle))
        })
    }
}

// =============================================================================
// FUNCTION WRAPPER
// =============================================================================

type KeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;

/// A stream-returning function whose results are shared per argument value.
pub struct MemoizedFn<A, T, F> {
    cache: MemoCache<String, T>,
    source: F,
    key_fn: Option<KeyFn<A>>,
    _args: PhantomData<fn(A)>,
}

/// Wrap `source` so calls with equal arguments share one stream.
///
/// Arguments are keyed by their JSON serialization unless
/// [`MemoizedFn::with_key`] installs a key function.
pub fn memoize<A, T, F, S>(cache: MemoCache<String, T>, source: F) -> MemoizedFn<A, T, F>
where
    F: Fn(A) -> S,
    S: Stream<Item = T> + Send + 'static,
{
    MemoizedFn { cache, source, key_fn: None, _args: PhantomData }
}

impl<A, T, F, S> MemoizedFn<A, T, F>
where
    A: Serialize,
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> S,
    S: Stream<Item = T> + Send + 'static,
{
    #[must_use]
    pub fn with_key(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    #[must_use]
    pub fn cache(&self) -> &MemoCache<String, T> {
        &self.cache
    }

    /// Cache key for `args`.
    ///
    /// # Errors
    ///
    /// [`MemoError::KeySerialization`] when no key function is installed and
    /// the arguments cannot be represented as JSON.
    pub fn key_for(&self, args: &A) -> Result<String, MemoError> {
        match &self.key_fn {
            Some(key_fn) => Ok(key_fn(args)),
            None => serde_json::to_string(args).map_err(|e| MemoError::KeySerialization(e.to_string())),
        }
    }

    /// Shared stream for `args`, invoking the wrapped function only on a miss.
    ///
    /// # Errors
    ///
    /// See [`MemoizedFn::key_for`] and [`MemoCache::get_or_subscribe`].
    pub fn call(&self, args: A) -> Result<Memoized<T>, MemoError> {
        let key = self.key_for(&args)?;
        self.cache.get_or_subscribe(key, || (self.source)(args))
    }
}

#[cfg(test)]
#[path = "memo_test.rs"]
mod tests;
