//! Swappable per-entry value cell shared between the map's two tiers.
//!
//! Each stored value lives behind an [`EntryCell`] so the same entry can be
//! referenced from both the snapshot and the overlay without copying the
//! value, and so a write can swap the value in place inside an
//! already-published snapshot. A cell holding `None` is a tombstone: the key
//! is absent, even if a published snapshot still maps to the cell.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwapOption, Guard};

/// Tombstone-able value slot. `None` means the entry was removed.
pub(crate) struct EntryCell<V> {
    slot: ArcSwapOption<V>,
}

impl<V> EntryCell<V> {
    /// Creates a live cell holding `value`.
    pub(crate) fn new(value: Arc<V>) -> Self {
        Self {
            slot: ArcSwapOption::from(Some(value)),
        }
    }

    /// Returns the current value, or `None` for a tombstone.
    pub(crate) fn load(&self) -> Option<Arc<V>> {
        self.slot.load_full()
    }

    /// Whether the cell currently holds a value.
    pub(crate) fn is_live(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Unconditionally stores `value`, returning the previous value.
    /// A `None` return means a tombstone was revived.
    pub(crate) fn store(&self, value: Arc<V>) -> Option<Arc<V>> {
        self.slot.swap(Some(value))
    }

    /// Removes the value, leaving a tombstone. Only one caller can win a
    /// racing `take` for the same stored value.
    pub(crate) fn take(&self) -> Option<Arc<V>> {
        self.slot.swap(None)
    }

    /// Stores `value` only while the cell is live, returning the replaced
    /// value on success and `None` if the cell is (or becomes) a tombstone.
    ///
    /// The pointer-identity CAS loop keeps a lock-free writer from reviving
    /// a key that a concurrent remove just tombstoned: the writer observes
    /// the `None` transition and must retry through the locked path.
    pub(crate) fn replace_if_live(&self, value: Arc<V>) -> Option<Arc<V>> {
        let mut current = self.slot.load();
        loop {
            current.as_ref()?;
            let previous = self
                .slot
                .compare_and_swap(&current, Some(Arc::clone(&value)));
            if guard_ptr(&previous) == guard_ptr(&current) {
                return previous.as_ref().cloned();
            }
            current = previous;
        }
    }
}

fn guard_ptr<V>(guard: &Guard<Option<Arc<V>>>) -> *const V {
    guard.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
}

impl<V> fmt::Debug for EntryCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCell")
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_replaces_and_returns_previous() {
        let cell = EntryCell::new(Arc::new(1));
        assert_eq!(cell.store(Arc::new(2)).as_deref(), Some(&1));
        assert_eq!(cell.load().as_deref(), Some(&2));
    }

    #[test]
    fn take_yields_the_value_once() {
        let cell = EntryCell::new(Arc::new("v"));
        assert_eq!(cell.take().as_deref(), Some(&"v"));
        assert_eq!(cell.take(), None);
        assert!(!cell.is_live());
    }

    #[test]
    fn replace_if_live_succeeds_on_live_cell() {
        let cell = EntryCell::new(Arc::new(10));
        assert_eq!(cell.replace_if_live(Arc::new(20)).as_deref(), Some(&10));
        assert_eq!(cell.load().as_deref(), Some(&20));
    }

    #[test]
    fn replace_if_live_refuses_tombstone() {
        let cell = EntryCell::new(Arc::new(10));
        cell.take();
        assert_eq!(cell.replace_if_live(Arc::new(20)), None);
        assert!(!cell.is_live());
    }

    #[test]
    fn store_revives_tombstone() {
        let cell = EntryCell::new(Arc::new(1));
        cell.take();
        assert_eq!(cell.store(Arc::new(3)), None);
        assert_eq!(cell.load().as_deref(), Some(&3));
    }
}
