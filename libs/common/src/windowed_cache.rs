//! Time-windowed key/value store for tracking in-flight work.
//!
//! Entries are stamped with an insertion [`Instant`] and dropped once they are
//! older than the configured window. Insertions must arrive in non-decreasing
//! time order, which lets eviction walk a queue from the oldest entry and stop
//! at the first one still inside the window instead of scanning the whole map.
//!
//! When constructed inside a tokio runtime the cache owns a background sweeper
//! that calls [`WindowedCache::evict_expired`] once per window. The sweeper is
//! stopped by [`WindowedCache::close`] or when the cache is dropped.
//!
//! # Usage
//!
//! ```ignore
//! use common::windowed_cache::WindowedCache;
//!
//! let cache = WindowedCache::new(Duration::from_secs(60));
//! cache.put(item, key, Instant::now())?;
//! if let Some(item) = cache.get(&key) { /* still in flight */ }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::B256;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lower bound on the sweep period so a zero window does not spin.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Errors returned by cache mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Insertion stamped earlier than the newest entry already stored
    #[error("out of order insert for key {key}: {behind_ms}ms behind newest entry")]
    OutOfOrder { key: B256, behind_ms: u128 },
}

/// A stored value together with its key and insertion time
#[derive(Debug, Clone)]
pub struct CacheItem<T> {
    pub item: T,
    pub key: B256,
    pub inserted_at: Instant,
}

struct CacheState<T> {
    window: Duration,
    items: HashMap<B256, CacheItem<T>>,
    // Insertion order. Overwritten keys leave stale entries behind which are
    // skipped when their stamp no longer matches the stored item.
    order: VecDeque<(Instant, B256)>,
    newest: Option<Instant>,
}

impl<T> CacheState<T> {
    fn evict_expired(&mut self, now: Instant) -> usize {
        let mut evicted = 0;

        while let Some(&(inserted_at, key)) = self.order.front() {
            if now.saturating_duration_since(inserted_at) <= self.window {
                break;
            }
            self.order.pop_front();

            let current = self
                .items
                .get(&key)
                .is_some_and(|entry| entry.inserted_at == inserted_at);
            if current {
                self.items.remove(&key);
                evicted += 1;
            }
        }

        if self.order.is_empty() {
            self.newest = None;
        }
        evicted
    }
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sweeper {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Generic windowed cache keyed by a 32-byte hash.
///
/// All state sits behind a single mutex; every operation is O(1) except
/// eviction, which is O(evicted).
pub struct WindowedCache<T> {
    state: Arc<Mutex<CacheState<T>>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<T> WindowedCache<T>
where
    T: Clone + Send + 'static,
{
    /// Create a cache and, if a tokio runtime is available, start its sweeper.
    pub fn new(window: Duration) -> Self {
        let state = Arc::new(Mutex::new(CacheState {
            window,
            items: HashMap::new(),
            order: VecDeque::new(),
            newest: None,
        }));

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(spawn_sweeper(&runtime, Arc::clone(&state))),
            Err(_) => {
                tracing::debug!("No tokio runtime, windowed cache eviction is caller driven");
                None
            }
        };

        Self {
            state,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Insert or overwrite the entry for `key`, stamped with `at`.
    pub fn put(&self, item: T, key: B256, at: Instant) -> Result<(), CacheError> {
        let mut state = self.state.lock();

        if let Some(newest) = state.newest {
            if at < newest {
                return Err(CacheError::OutOfOrder {
                    key,
                    behind_ms: newest.duration_since(at).as_millis(),
                });
            }
        }

        state.items.insert(
            key,
            CacheItem {
                item,
                key,
                inserted_at: at,
            },
        );
        state.order.push_back((at, key));
        state.newest = Some(at);
        Ok(())
    }

    /// Insert or overwrite the entry for `key`, stamped with the current time.
    ///
    /// The stamp is taken under the lock and clamped to the newest entry, so
    /// concurrent writers never observe [`CacheError::OutOfOrder`].
    pub fn insert(&self, item: T, key: B256) -> Instant {
        let mut state = self.state.lock();
        let now = Instant::now();
        let at = state.newest.map_or(now, |newest| newest.max(now));

        state.items.insert(
            key,
            CacheItem {
                item,
                key,
                inserted_at: at,
            },
        );
        state.order.push_back((at, key));
        state.newest = Some(at);
        at
    }

    /// Copy of the item stored under `key`, if any.
    pub fn get(&self, key: &B256) -> Option<T> {
        self.state.lock().items.get(key).map(|entry| entry.item.clone())
    }

    pub fn get_entry(&self, key: &B256) -> Option<CacheItem<T>> {
        self.state.lock().items.get(key).cloned()
    }

    /// Remove every entry older than the window as seen from `now`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        self.state.lock().evict_expired(now)
    }

    /// Change the eviction window. Takes effect from the next eviction.
    pub fn set_window(&self, window: Duration) {
        self.state.lock().window = window;
    }

    pub fn window(&self) -> Duration {
        self.state.lock().window
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the background sweeper. Stored entries stay readable.
    pub fn close(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
    }

    /// Whether a background sweeper is currently running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl<T> Drop for WindowedCache<T> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.stop();
        }
    }
}

fn spawn_sweeper<T>(runtime: &tokio::runtime::Handle, state: Arc<Mutex<CacheState<T>>>) -> Sweeper
where
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = runtime.spawn(async move {
        loop {
            let period = state.lock().window.max(MIN_SWEEP_INTERVAL);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    let evicted = state.lock().evict_expired(Instant::now());
                    if evicted > 0 {
                        tracing::trace!(evicted, "Swept expired cache entries");
                    }
                }
            }
        }
    });

    Sweeper { cancel, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> B256 {
        B256::repeat_byte(n)
    }

    #[test]
    fn test_put_and_get() {
        let cache = WindowedCache::new(Duration::from_secs(60));
        let now = Instant::now();

        cache.put("first", key(1), now).unwrap();

        assert_eq!(cache.get(&key(1)), Some("first"));
        assert_eq!(cache.get(&key(2)), None);
        assert!(!cache.is_sweeping());
    }

    #[test]
    fn test_put_same_key_later_write_wins() {
        let cache = WindowedCache::new(Duration::from_secs(60));
        let now = Instant::now();

        cache.put(1u64, key(1), now).unwrap();
        cache.put(2u64, key(1), now + Duration::from_secs(1)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1)), Some(2));

        let entry = cache.get_entry(&key(1)).unwrap();
        assert_eq!(entry.key, key(1));
        assert_eq!(entry.inserted_at, now + Duration::from_secs(1));
    }

    #[test]
    fn test_window_boundary() {
        let window = Duration::from_secs(10);
        let eps = Duration::from_millis(1);
        let cache = WindowedCache::new(window);
        let t0 = Instant::now();

        cache.put("x", key(1), t0).unwrap();

        assert_eq!(cache.evict_expired(t0 + window - eps), 0);
        assert_eq!(cache.get(&key(1)), Some("x"));

        assert_eq!(cache.evict_expired(t0 + window + eps), 1);
        assert_eq!(cache.get(&key(1)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_stops_at_first_live_entry() {
        let cache = WindowedCache::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cache.put(1, key(1), t0).unwrap();
        cache.put(2, key(2), t0 + Duration::from_secs(5)).unwrap();
        cache.put(3, key(3), t0 + Duration::from_secs(20)).unwrap();

        let evicted = cache.evict_expired(t0 + Duration::from_secs(21));

        assert_eq!(evicted, 2);
        assert_eq!(cache.get(&key(3)), Some(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwritten_entry_survives_stale_queue_slot() {
        let cache = WindowedCache::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cache.put("old", key(1), t0).unwrap();
        cache.put("new", key(1), t0 + Duration::from_secs(8)).unwrap();

        // The first queue slot for key(1) is expired but points at a replaced entry
        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(11)), 0);
        assert_eq!(cache.get(&key(1)), Some("new"));

        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(19)), 1);
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn test_out_of_order_put_rejected() {
        let cache = WindowedCache::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cache.put(1, key(1), t0 + Duration::from_secs(2)).unwrap();
        let err = cache.put(2, key(2), t0).unwrap_err();

        assert!(matches!(err, CacheError::OutOfOrder { key: k, behind_ms: 2000 } if k == key(2)));
        assert_eq!(cache.get(&key(2)), None);
    }

    #[test]
    fn test_insert_never_goes_behind_newest() {
        let cache = WindowedCache::new(Duration::from_secs(10));
        let ahead = Instant::now() + Duration::from_secs(5);

        cache.put(1, key(1), ahead).unwrap();
        let stamped = cache.insert(2, key(2));

        assert_eq!(stamped, ahead);
        assert_eq!(cache.get(&key(2)), Some(2));
        assert!(cache.insert(3, key(3)) >= stamped);
    }

    #[test]
    fn test_set_window_applies_to_next_eviction() {
        let cache = WindowedCache::new(Duration::from_secs(60));
        let t0 = Instant::now();

        cache.put(1, key(1), t0).unwrap();
        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(30)), 0);

        cache.set_window(Duration::from_secs(10));
        assert_eq!(cache.window(), Duration::from_secs(10));
        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(30)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_evicts() {
        let cache = WindowedCache::new(Duration::from_secs(5));
        assert!(cache.is_sweeping());

        cache.put(1, key(1), Instant::now() - Duration::from_secs(30)).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(cache.get(&key(1)), None);
    }

    #[tokio::test]
    async fn test_close_stops_sweeper() {
        let cache: WindowedCache<u8> = WindowedCache::new(Duration::from_secs(5));
        assert!(cache.is_sweeping());

        cache.close();
        tokio::task::yield_now().await;

        assert!(!cache.is_sweeping());
    }
}
