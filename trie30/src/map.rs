//! The public map type.

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::cursor::Cursor;
use crate::entry::{Bucket, Entry};
use crate::error::Result;
use crate::pool::Pool;
use crate::tagged;
use crate::trie;

/// An ordered associative map keyed by 30-bit integers (see [`crate::KEY_MASK`]).
///
/// `Map` borrows a [`Pool`] to allocate the trie nodes backing it; several
/// maps may share one pool. A map never allocates or frees the entries it
/// indexes — callers implement [`Entry`] on their own type and hand the map
/// a reference to a value they keep alive and at a stable address for as
/// long as it remains inserted.
///
/// `Map` is `Send` (it can be handed to another thread) but not `Sync`:
/// its root word has no internal synchronization, so concurrent access
/// from multiple threads must be serialized by the caller. The backing
/// [`Pool`], in contrast, is `Sync` and may be shared freely.
pub struct Map<'p, E: Entry> {
    pool: &'p Pool,
    root: Cell<usize>,
    _marker: PhantomData<E>,
}

unsafe impl<'p, E: Entry> Send for Map<'p, E> {}

impl<'p, E: Entry> Map<'p, E> {
    /// An empty map backed by `pool`.
    pub fn new(pool: &'p Pool) -> Self {
        Map { pool, root: Cell::new(0), _marker: PhantomData }
    }

    /// `true` if the map holds no entries.
    ///
    /// Even a fully dense ("max") top-level slot is scanned entry-by-entry
    /// rather than assumed non-empty, since every entry below it could in
    /// principle have been removed down to nothing without the slot itself
    /// having been freed yet.
    pub fn is_empty(&self) -> bool {
        let w = self.root.get();
        if w == 0 {
            return true;
        }
        if !tagged::is_slot(w) {
            return false;
        }
        let slot = tagged::value(w) as *mut usize;
        unsafe { crate::slot::first_subkey_from(slot, 0).is_none() }
    }

    /// Insert `entry` under its own key. If an entry with the same key is
    /// already present, `entry` is pushed onto the front of that key's
    /// bucket (found first on a subsequent [`Map::find`]).
    pub fn insert(&mut self, entry: &E) -> Result<()> {
        unsafe {
            let root_ptr = self.root.as_ptr();
            trie::insert(self.pool, &mut *root_ptr, entry as *const E as *mut E)
        }
    }

    /// Remove exactly `entry` (matched by address, not just key) from the
    /// map. `entry` must currently be present.
    pub fn remove(&mut self, entry: &E) {
        unsafe {
            let root_ptr = self.root.as_ptr();
            trie::remove(self.pool, &mut *root_ptr, entry.key(), NonNull::from(entry));
        }
    }

    /// Every entry stored under `key`, most recently inserted first.
    pub fn find(&self, key: u32) -> Option<Bucket<'_, E>> {
        unsafe { trie::find(self.root.as_ptr(), key) }
    }

    /// The bucket holding the smallest key `>= key`.
    pub fn nfind(&self, key: u32) -> Option<Cursor<'_, E>> {
        unsafe { crate::cursor::seek_ceil(self.root.as_ptr(), key) }
    }

    /// A cursor at the smallest key in the map.
    pub fn first(&self) -> Option<Cursor<'_, E>> {
        unsafe { crate::cursor::first(self.root.as_ptr()) }
    }

    /// A cursor at the largest key in the map.
    pub fn last(&self) -> Option<Cursor<'_, E>> {
        unsafe { crate::cursor::last(self.root.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell as StdCell;

    struct Item {
        link: StdCell<Option<NonNull<Item>>>,
        key: u32,
        tag: &'static str,
    }

    impl Entry for Item {
        fn link(&self) -> &StdCell<Option<NonNull<Item>>> {
            &self.link
        }
        fn key(&self) -> u32 {
            self.key
        }
    }

    #[test]
    fn empty_map_has_no_entries() {
        let pool = Pool::new();
        let map: Map<Item> = Map::new(&pool);
        assert!(map.is_empty());
        assert!(map.find(0).is_none());
        assert!(map.first().is_none());
    }

    #[test]
    fn insert_find_remove_single_entry() {
        let pool = Pool::new();
        let mut map: Map<Item> = Map::new(&pool);
        let item = Item { link: StdCell::new(None), key: 42, tag: "a" };

        map.insert(&item).unwrap();
        assert!(!map.is_empty());
        let bucket = map.find(42).unwrap();
        assert_eq!(bucket.first().tag, "a");

        map.remove(&item);
        assert!(map.is_empty());
        assert!(map.find(42).is_none());
    }

    #[test]
    fn same_key_entries_form_a_bucket() {
        let pool = Pool::new();
        let mut map: Map<Item> = Map::new(&pool);
        let a = Item { link: StdCell::new(None), key: 7, tag: "a" };
        let b = Item { link: StdCell::new(None), key: 7, tag: "b" };

        map.insert(&a).unwrap();
        map.insert(&b).unwrap();

        let tags: alloc::vec::Vec<&str> = map.find(7).unwrap().iter().map(|e| e.tag).collect();
        assert_eq!(tags, alloc::vec!["b", "a"]);

        map.remove(&b);
        let tags: alloc::vec::Vec<&str> = map.find(7).unwrap().iter().map(|e| e.tag).collect();
        assert_eq!(tags, alloc::vec!["a"]);

        map.remove(&a);
        assert!(map.find(7).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn divergent_keys_build_a_slot_chain() {
        let pool = Pool::new();
        let mut map: Map<Item> = Map::new(&pool);
        let a = Item { link: StdCell::new(None), key: 0x00ff, tag: "a" };
        let b = Item { link: StdCell::new(None), key: 0xff00, tag: "b" };

        map.insert(&a).unwrap();
        map.insert(&b).unwrap();

        assert_eq!(map.find(0x00ff).unwrap().first().tag, "a");
        assert_eq!(map.find(0xff00).unwrap().first().tag, "b");

        map.remove(&a);
        assert!(map.find(0x00ff).is_none());
        assert_eq!(map.find(0xff00).unwrap().first().tag, "b");

        map.remove(&b);
        assert!(map.is_empty());
    }

    #[test]
    fn nfind_returns_ceiling() {
        let pool = Pool::new();
        let mut map: Map<Item> = Map::new(&pool);
        let items = [Item { link: StdCell::new(None), key: 10, tag: "a" }, Item { link: StdCell::new(None), key: 20, tag: "b" }];
        for item in &items {
            map.insert(item).unwrap();
        }

        assert_eq!(map.nfind(5).unwrap().bucket().first().tag, "a");
        assert_eq!(map.nfind(10).unwrap().bucket().first().tag, "a");
        assert_eq!(map.nfind(11).unwrap().bucket().first().tag, "b");
        assert!(map.nfind(21).is_none());
    }
}
