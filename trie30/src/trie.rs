//! Top-level find / insert / remove, including the divergence-point slot
//! chain creation (`mkslot`) that turns a bare leaf into a subtree once a
//! second, differently-keyed entry needs to live alongside it.

use core::ptr::NonNull;

use crate::entry::{self, Bucket, Entry};
use crate::error::Result;
use crate::pool::Pool;
use crate::slot::{self, SUBKEY_COUNT, KEY_MASK};
use crate::tagged;

/// Exact lookup: every entry sharing `key`, or `None`.
pub(crate) unsafe fn find<'a, E: Entry>(root: *mut usize, key: u32) -> Option<Bucket<'a, E>> {
    unsafe {
        let key = key & KEY_MASK;
        let mut cur = root;
        for level in 0..SUBKEY_COUNT {
            let w = *cur;
            if w == 0 {
                return None;
            }
            if !tagged::is_slot(w) {
                let e = NonNull::new_unchecked(tagged::value(w) as *mut E);
                return if e.as_ref().key() & KEY_MASK == key { Some(Bucket::from_raw(e)) } else { None };
            }
            let child_slot = tagged::value(w) as *mut usize;
            let sk = slot::subkey(key, level);
            cur = slot::find_step(child_slot, sk)?;
        }
        let w = *cur;
        debug_assert!(w != 0 && !tagged::is_slot(w));
        Some(Bucket::from_raw(NonNull::new_unchecked(tagged::value(w) as *mut E)))
    }
}

/// Insert `new_entry` (its key is read via [`Entry::key`]). Entries with a
/// key already present are pushed onto the front of that key's bucket.
pub(crate) unsafe fn insert<E: Entry>(pool: &Pool, root: &mut usize, new_entry: *mut E) -> Result<()> {
    unsafe {
        let key = (*new_entry).key() & KEY_MASK;
        let new_nn = NonNull::new_unchecked(new_entry);
        let mut cur = root as *mut usize;

        for level in 0..SUBKEY_COUNT {
            let w = *cur;
            if !tagged::is_slot(w) {
                let existing_ptr = tagged::value(w);
                if existing_ptr == 0 {
                    *cur = tagged::set_value(w, new_entry as usize);
                    return Ok(());
                }
                let existing = NonNull::new_unchecked(existing_ptr as *mut E);
                if existing.as_ref().key() & KEY_MASK == key {
                    let mut head = Some(existing);
                    entry::bucket_insert(&mut head, new_nn);
                    *cur = tagged::set_value(w, head.unwrap().as_ptr() as usize);
                    return Ok(());
                }
                return mkslot(pool, cur, level, existing, new_nn, key);
            }

            let sk = slot::subkey(key, level);
            cur = slot::insert_step(pool, cur, sk)?;
        }

        // Exhausted all subkey levels: the word here is either freshly
        // zeroed (brand new bucket) or an existing same-key bucket, since
        // six matching subkeys means an identical 30-bit key.
        let w = *cur;
        let existing_ptr = tagged::value(w);
        if existing_ptr == 0 {
            *cur = tagged::set_value(w, new_entry as usize);
        } else {
            let mut head = Some(NonNull::new_unchecked(existing_ptr as *mut E));
            entry::bucket_insert(&mut head, new_nn);
            *cur = tagged::set_value(w, head.unwrap().as_ptr() as usize);
        }
        Ok(())
    }
}

/// Replace the bare leaf at `*cur` (a single entry, `existing`) with a
/// chain of minimal slots down to the level at which `existing`'s and
/// `new_entry`'s keys first differ, then place both as siblings there.
unsafe fn mkslot<E: Entry>(
    pool: &Pool,
    cur: *mut usize,
    start_level: usize,
    existing: NonNull<E>,
    new_entry: NonNull<E>,
    new_key: u32,
) -> Result<()> {
    unsafe {
        let existing_key = existing.as_ref().key() & KEY_MASK;
        debug_assert_ne!(existing_key, new_key);

        let mut parent = cur;
        for level in start_level..SUBKEY_COUNT {
            let sk_existing = slot::subkey(existing_key, level);
            let sk_new = slot::subkey(new_key, level);

            let new_slot = pool.alloc_slot(1).ok_or(crate::error::Error::OutOfMemory)?;
            *new_slot = 0;
            slot::set_slen(new_slot, 1);
            *parent = tagged::set_slot(*parent, new_slot as usize);

            if sk_existing != sk_new {
                let e_word = slot::insert_step(pool, parent, sk_existing)?;
                *e_word = tagged::set_value(*e_word, existing.as_ptr() as usize);
                let n_word = slot::insert_step(pool, parent, sk_new)?;
                *n_word = tagged::set_value(*n_word, new_entry.as_ptr() as usize);
                return Ok(());
            }

            parent = slot::insert_step(pool, parent, sk_existing)?;
        }

        unreachable!("30-bit keys must diverge within SUBKEY_COUNT levels")
    }
}

/// Remove one specific entry (identified by pointer identity, since
/// multiple entries may share a key) from the trie rooted at `*root`.
pub(crate) unsafe fn remove<E: Entry>(pool: &Pool, root: &mut usize, key: u32, target: NonNull<E>) {
    unsafe {
        let key = key & KEY_MASK;
        let mut path: [(*mut usize, usize); SUBKEY_COUNT] = [(core::ptr::null_mut(), 0); SUBKEY_COUNT];
        let mut depth = 0usize;
        let mut cur = root as *mut usize;

        loop {
            let w = *cur;
            debug_assert_ne!(w, 0, "removed entry was not present");
            if !tagged::is_slot(w) {
                break;
            }
            let child_slot = tagged::value(w) as *mut usize;
            let sk = slot::subkey(key, depth);
            path[depth] = (child_slot, sk);
            let next = slot::find_step(child_slot, sk).expect("removed entry was not present");
            depth += 1;
            cur = next;
        }

        let w = *cur;
        let mut head = Some(NonNull::new_unchecked(tagged::value(w) as *mut E));
        let empty = entry::bucket_remove(&mut head, target);
        *cur = match head {
            Some(h) => tagged::set_value(w, h.as_ptr() as usize),
            None => tagged::set_value(w, 0),
        };

        if !empty {
            return;
        }

        // The bucket is gone; unwind the slot chain, freeing any slot that
        // becomes empty, until we reach one that still holds another entry
        // (or the root).
        while depth > 0 {
            let (slot, sk) = path[depth - 1];
            let slot_is_empty = slot::remove_step(pool, slot, cur, sk);
            if !slot_is_empty {
                return;
            }

            let slen = slot::get_slen(slot);
            pool.free_slot(slot, slen);
            depth -= 1;

            let parent_word = if depth == 0 {
                root as *mut usize
            } else {
                let (pslot, psk) = path[depth - 1];
                slot::word_at(pslot, psk)
            };
            *parent_word = 0;
            cur = parent_word;
        }
    }
}
