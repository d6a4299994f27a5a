//! Adaptive two-tier concurrent map.
//!
//! ## Architecture
//! - A **snapshot** tier: an immutable `HashMap<K, Arc<EntryCell<V>>>` behind
//!   an `ArcSwap`, readable by any thread without a lock.
//! - An **overlay** tier: a plain map behind one `parking_lot::Mutex`, used
//!   while the snapshot is out of date. The mutex guards the overlay and its
//!   promotion miss counter as a unit.
//! - Entry cells are shared by `Arc` between the tiers, so a write can swap a
//!   value in place inside an already-published snapshot, and removal leaves
//!   a tombstone (`None`) in the shared cell.
//!
//! ## Core Operations
//! - `insert`: lock-free when the key is live in the snapshot; otherwise
//!   takes the lock and writes through the overlay.
//! - `get`: lock-free snapshot hit, or a locked overlay lookup while stale.
//! - `get_or_insert`: insert only if absent; reports which happened.
//! - `remove` / `delete`: retrieve-and-remove; tombstones the shared cell.
//! - `for_each`, `clear`, `contains`, `len`, `metrics`.
//!
//! ## Promotion
//! Every overlay consultation while stale bumps a miss counter. Once the
//! counter reaches the overlay's size, the overlay is installed as the new
//! snapshot in one atomic store and the map leaves the stale state. Repeated
//! misses against a growing overlay thereby pay for the promotion, bounding
//! the average cost of a miss.
//!
//! ## Performance Trade-offs
//! - Reads on a stable key set never lock and never allocate.
//! - The first write after a promotion forks the live entries of the
//!   snapshot into the overlay (O(n) under the lock, as is every promotion's
//!   bookkeeping); workloads that write rarely amortize this well.
//! - Values are handed out as `Arc<V>` clones; `V` itself is never copied.
//!
//! ## When to Use
//! - Read-heavy workloads where entries are written once or rarely and read
//!   many times afterward.
//! - Not a cache: no capacity limit, no eviction, no entry ordering.
//!
//! ## Example Usage
//! ```rust
//! use adaptivemap::AdaptiveMap;
//!
//! let map: AdaptiveMap<&str, i32> = AdaptiveMap::new();
//! map.insert("a", 1);
//! assert_eq!(map.get(&"a").as_deref(), Some(&1));
//! assert_eq!(map.remove(&"a").as_deref(), Some(&1));
//! assert_eq!(map.get(&"a"), None);
//! ```
//!
//! ## Type Constraints
//! - `K: Eq + Hash + Clone` (`Clone` because forking the overlay copies the
//!   key set).
//! - `V` is unconstrained; values live behind `Arc<V>`.
//! - `S: BuildHasher + Clone` for pluggable hashers (defaults to
//!   `RandomState`).
//!
//! ## Thread Safety
//! - All methods take `&self`; the map is `Send + Sync` when `K`, `V` and
//!   `S` are.
//! - The map is deliberately not `Clone`; share it through
//!   `Arc<AdaptiveMap>`.
//! - `for_each` holds the lock across the whole callback while stale:
//!   re-entering the map from the callback deadlocks and is forbidden.
//!
//! ## Implementation Notes
//! - The stale flag is written only under the lock but is readable lock-free
//!   by the fast paths (Acquire/Release pair with the snapshot store).
//! - A tombstoned cell reads as absent through every tier; tombstones are
//!   filtered out when the next overlay fork copies live entries.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::cell::EntryCell;
use crate::error::InvariantError;
use crate::metrics::{MapCounters, MapMetrics};

type Tier<K, V, S> = HashMap<K, Arc<EntryCell<V>>, S>;

/// Lock-guarded slow tier: the overlay map plus its promotion miss counter.
struct Overlay<K, V, S> {
    map: Tier<K, V, S>,
    misses: usize,
}

/// Concurrent map with lock-free snapshot reads and a locked overlay for
/// writes the snapshot cannot absorb. See the module docs for the design.
pub struct AdaptiveMap<K, V, S = RandomState> {
    snapshot: ArcSwap<Tier<K, V, S>>,
    overlay: Mutex<Overlay<K, V, S>>,
    stale: AtomicBool,
    size: AtomicUsize,
    counters: MapCounters,
    hasher: S,
}

impl<K, V> AdaptiveMap<K, V, RandomState>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S> AdaptiveMap<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    /// Creates an empty map with a custom hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::with_hasher(hasher.clone())),
            overlay: Mutex::new(Overlay {
                map: HashMap::with_hasher(hasher.clone()),
                misses: 0,
            }),
            stale: AtomicBool::new(false),
            size: AtomicUsize::new(0),
            counters: MapCounters::default(),
            hasher,
        }
    }

    /// Stores `value` under `key`, returning the previous value if the key
    /// existed. Lock-free when the key is live in the current snapshot.
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        let value = Arc::new(value);
        {
            let snapshot = self.snapshot.load();
            if let Some(cell) = snapshot.get(&key) {
                if let Some(previous) = cell.replace_if_live(Arc::clone(&value)) {
                    self.counters.inc_update();
                    return Some(previous);
                }
            }
        }
        self.insert_slow(key, value)
    }

    fn insert_slow(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let mut overlay = self.overlay.lock();
        let snapshot = self.snapshot.load();
        if self.stale.load(Ordering::Relaxed) {
            // The overlay owns the authoritative key set.
            let state = &mut *overlay;
            if let Some(cell) = state.map.get(&key) {
                return self.store_into(cell, value);
            }
            state.map.insert(key, Arc::new(EntryCell::new(value)));
            self.size.fetch_add(1, Ordering::Relaxed);
            self.counters.inc_insert();
            return None;
        }
        if let Some(cell) = snapshot.get(&key) {
            // Updates a live entry in place or revives a tombstoned key;
            // either way the snapshot still covers the whole key set.
            return self.store_into(cell, value);
        }
        // First write the snapshot cannot absorb: fork the live entries and
        // go stale.
        overlay.map = self.fork(&snapshot);
        overlay.map.insert(key, Arc::new(EntryCell::new(value)));
        self.stale.store(true, Ordering::Release);
        self.size.fetch_add(1, Ordering::Relaxed);
        self.counters.inc_insert();
        None
    }

    /// Stores `value` only if `key` is absent. Returns the value now under
    /// the key and whether this call inserted it.
    pub fn get_or_insert(&self, key: K, value: V) -> (Arc<V>, bool) {
        {
            let snapshot = self.snapshot.load();
            if let Some(existing) = snapshot.get(&key).and_then(|cell| cell.load()) {
                self.counters.inc_hit();
                return (existing, false);
            }
        }
        self.get_or_insert_slow(key, Arc::new(value))
    }

    fn get_or_insert_slow(&self, key: K, value: Arc<V>) -> (Arc<V>, bool) {
        let mut overlay = self.overlay.lock();
        let snapshot = self.snapshot.load();
        let stale = self.stale.load(Ordering::Relaxed);
        if let Some(cell) = snapshot.get(&key) {
            if let Some(existing) = cell.load() {
                self.counters.inc_hit();
                return (existing, false);
            }
            if !stale {
                // Revive the tombstoned snapshot entry in place.
                cell.store(Arc::clone(&value));
                self.size.fetch_add(1, Ordering::Relaxed);
                self.counters.inc_insert();
                return (value, true);
            }
        }
        if !stale {
            let mut forked = self.fork(&snapshot);
            forked.insert(key, Arc::new(EntryCell::new(Arc::clone(&value))));
            overlay.map = forked;
            self.stale.store(true, Ordering::Release);
            self.size.fetch_add(1, Ordering::Relaxed);
            self.counters.inc_insert();
            return (value, true);
        }
        // Overlay consultations count toward promotion pressure, including a
        // miss that becomes an insert. Promotion itself only fires from the
        // read paths.
        let state = &mut *overlay;
        state.misses += 1;
        if let Some(cell) = state.map.get(&key) {
            if let Some(existing) = cell.load() {
                self.counters.inc_hit();
                return (existing, false);
            }
            cell.store(Arc::clone(&value));
            self.size.fetch_add(1, Ordering::Relaxed);
            self.counters.inc_insert();
            return (value, true);
        }
        state.map.insert(key, Arc::new(EntryCell::new(Arc::clone(&value))));
        self.size.fetch_add(1, Ordering::Relaxed);
        self.counters.inc_insert();
        (value, true)
    }

    /// Fetches the value under `key`. Lock-free on a snapshot hit, and on a
    /// miss while the snapshot is authoritative.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        {
            let snapshot = self.snapshot.load();
            if let Some(value) = snapshot.get(key).and_then(|cell| cell.load()) {
                self.counters.inc_hit();
                return Some(value);
            }
        }
        if !self.stale.load(Ordering::Acquire) {
            self.counters.inc_miss();
            return None;
        }
        self.get_slow(key)
    }

    fn get_slow(&self, key: &K) -> Option<Arc<V>> {
        let mut overlay = self.overlay.lock();
        // The snapshot may have been promoted between the fast path and the
        // lock.
        let snapshot = self.snapshot.load();
        if let Some(value) = snapshot.get(key).and_then(|cell| cell.load()) {
            self.counters.inc_hit();
            return Some(value);
        }
        if !self.stale.load(Ordering::Relaxed) {
            self.counters.inc_miss();
            return None;
        }
        let state = &mut *overlay;
        let found = state.map.get(key).and_then(|cell| cell.load());
        state.misses += 1;
        if state.misses >= state.map.len() {
            self.promote(state);
        }
        match &found {
            Some(_) => self.counters.inc_hit(),
            None => self.counters.inc_miss(),
        }
        found
    }

    /// Retrieves and removes `key` in one step.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        if !self.stale.load(Ordering::Acquire) {
            let snapshot = self.snapshot.load();
            let removed = snapshot.get(key).and_then(|cell| cell.take());
            if removed.is_some() {
                self.dec_size();
                self.counters.inc_remove();
            }
            return removed;
        }
        self.remove_slow(key)
    }

    fn remove_slow(&self, key: &K) -> Option<Arc<V>> {
        let mut overlay = self.overlay.lock();
        let snapshot = self.snapshot.load();
        if !self.stale.load(Ordering::Relaxed) {
            let removed = snapshot.get(key).and_then(|cell| cell.take());
            if removed.is_some() {
                self.dec_size();
                self.counters.inc_remove();
            }
            return removed;
        }
        let state = &mut *overlay;
        if let Some(value) = snapshot.get(key).and_then(|cell| cell.take()) {
            // The cell is shared with the overlay; drop the overlay entry so
            // the promotion size stays honest.
            state.map.remove(key);
            self.dec_size();
            self.counters.inc_remove();
            return Some(value);
        }
        let removed = state.map.remove(key).and_then(|cell| cell.take());
        state.misses += 1;
        if state.misses >= state.map.len() {
            self.promote(state);
        }
        if removed.is_some() {
            self.dec_size();
            self.counters.inc_remove();
        }
        removed
    }

    /// Removes `key`, discarding the value. No-op if the key is absent.
    pub fn delete(&self, key: &K) {
        let _ = self.remove(key);
    }

    /// Calls `visit` once per stored entry, in no particular order.
    ///
    /// While stale the lock is held across every invocation: `visit` must
    /// not call back into the map and must not block indefinitely. Entries
    /// mutated concurrently are observed with some value they held during
    /// the call.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &Arc<V>),
    {
        if self.stale.load(Ordering::Acquire) {
            let overlay = self.overlay.lock();
            if self.stale.load(Ordering::Relaxed) {
                for (key, cell) in overlay.map.iter() {
                    if let Some(value) = cell.load() {
                        visit(key, &value);
                    }
                }
                return;
            }
            // Promoted between the check and the lock; fall through to the
            // snapshot.
        }
        let snapshot = self.snapshot.load();
        for (key, cell) in snapshot.iter() {
            if let Some(value) = cell.load() {
                visit(key, &value);
            }
        }
    }

    /// Removes all entries, returning the map to its initial state.
    pub fn clear(&self) {
        let mut overlay = self.overlay.lock();
        self.snapshot
            .store(Arc::new(HashMap::with_hasher(self.hasher.clone())));
        overlay.map = HashMap::with_hasher(self.hasher.clone());
        overlay.misses = 0;
        self.stale.store(false, Ordering::Release);
        self.size.store(0, Ordering::Relaxed);
    }

    /// Checks whether `key` exists, without metrics traffic or promotion
    /// pressure.
    pub fn contains(&self, key: &K) -> bool {
        {
            let snapshot = self.snapshot.load();
            if snapshot.get(key).is_some_and(|cell| cell.is_live()) {
                return true;
            }
        }
        if !self.stale.load(Ordering::Acquire) {
            return false;
        }
        let overlay = self.overlay.lock();
        if !self.stale.load(Ordering::Relaxed) {
            let snapshot = self.snapshot.load();
            return snapshot.get(key).is_some_and(|cell| cell.is_live());
        }
        overlay.map.get(key).is_some_and(|cell| cell.is_live())
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Checks whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the operation counters.
    pub fn metrics(&self) -> MapMetrics {
        self.counters.snapshot()
    }

    /// Verifies the structural invariants of the two tiers.
    ///
    /// Meaningful only while no other thread is mutating the map; intended
    /// for tests and debug assertions.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let overlay = self.overlay.lock();
        let snapshot = self.snapshot.load();
        let size = self.size.load(Ordering::Relaxed);
        if self.stale.load(Ordering::Relaxed) {
            for (key, cell) in snapshot.iter() {
                if cell.is_live() && !overlay.map.contains_key(key) {
                    return Err(InvariantError::new(
                        "live snapshot entry missing from stale overlay",
                    ));
                }
            }
            let live = overlay.map.values().filter(|cell| cell.is_live()).count();
            if live != size {
                return Err(InvariantError::new(format!(
                    "size counter {size} != {live} live overlay entries"
                )));
            }
        } else {
            if !overlay.map.is_empty() {
                return Err(InvariantError::new("overlay populated while not stale"));
            }
            if overlay.misses != 0 {
                return Err(InvariantError::new("miss counter nonzero while not stale"));
            }
            let live = snapshot.values().filter(|cell| cell.is_live()).count();
            if live != size {
                return Err(InvariantError::new(format!(
                    "size counter {size} != {live} live snapshot entries"
                )));
            }
        }
        Ok(())
    }

    /// Installs the overlay as the new snapshot. Caller holds the lock and
    /// has verified the map is stale.
    fn promote(&self, state: &mut Overlay<K, V, S>) {
        let promoted = mem::replace(&mut state.map, HashMap::with_hasher(self.hasher.clone()));
        self.snapshot.store(Arc::new(promoted));
        state.misses = 0;
        self.stale.store(false, Ordering::Release);
        self.counters.inc_promotion();
    }

    /// Copies every live entry cell of `snapshot` into a fresh overlay map.
    /// Tombstones are dropped here, which is what eventually reclaims them.
    fn fork(&self, snapshot: &Tier<K, V, S>) -> Tier<K, V, S> {
        let mut forked = HashMap::with_capacity_and_hasher(snapshot.len(), self.hasher.clone());
        for (key, cell) in snapshot {
            if cell.is_live() {
                forked.insert(key.clone(), Arc::clone(cell));
            }
        }
        forked
    }

    /// Writes `value` through an existing cell, keeping the size counter and
    /// metrics in step with whether this revived a tombstone.
    fn store_into(&self, cell: &Arc<EntryCell<V>>, value: Arc<V>) -> Option<Arc<V>> {
        let previous = cell.store(value);
        if previous.is_some() {
            self.counters.inc_update();
        } else {
            self.size.fetch_add(1, Ordering::Relaxed);
            self.counters.inc_insert();
        }
        previous
    }

    fn dec_size(&self) {
        // clear() may race a lock-free remove; saturate instead of wrapping.
        let _ = self
            .size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

impl<K, V, S> Default for AdaptiveMap<K, V, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
{
    /// An empty map, immediately usable.
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for AdaptiveMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveMap")
            .field("len", &self.size.load(Ordering::Relaxed))
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
