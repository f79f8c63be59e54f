//! The slab pool: a set of pages, classified into rank queues by the widest
//! free run they currently hold, that backs every slot allocation a trie
//! uses.
//!
//! A `Pool` may be shared by several independent [`crate::Map`] heads; all
//! mutable state lives behind a [`spin::Mutex`], matching how the rest of
//! this workspace guards shared kernel-style allocator state.

use alloc::alloc::{alloc, dealloc};
use core::alloc::Layout;
use core::ptr::NonNull;

use spin::Mutex;

use crate::page::{self, PageHeader, PAGE_SIZE, POOL_RANK_MAX};
use crate::slot::{self, SLEN_MAX};
use crate::stats::PoolStats;

/// Tuning knobs for a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of pages to allocate eagerly when the pool is created,
    /// instead of growing lazily on first use.
    pub prealloc_pages: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { prealloc_pages: 0 }
    }
}

struct Inner {
    queues: [Option<NonNull<PageHeader>>; POOL_RANK_MAX],
    page_count: usize,
}

// SAFETY: `Inner` owns every page it references exclusively through the
// pool's mutex; pages are never aliased outside a locked section.
unsafe impl Send for Inner {}

/// Owns every page backing the slots of one or more tries.
pub struct Pool {
    inner: Mutex<Inner>,
}

// SAFETY: all mutable page state is behind `Mutex<Inner>`.
unsafe impl Sync for Pool {}
unsafe impl Send for Pool {}

impl Pool {
    /// A pool with no pages yet; the first insert grows it lazily.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        let pool = Pool {
            inner: Mutex::new(Inner {
                queues: [None; POOL_RANK_MAX],
                page_count: 0,
            }),
        };
        for _ in 0..config.prealloc_pages {
            let mut inner = pool.inner.lock();
            inner.add_page().expect("prealloc_pages exceeds available memory");
        }
        pool
    }

    /// Allocate a slot of width `slen` sub-slots, growing the pool with a
    /// fresh page if no existing page can serve it.
    pub(crate) fn alloc_slot(&self, slen: usize) -> Option<*mut usize> {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.alloc_slot(slen) {
            return Some(slot);
        }
        if inner.add_page().is_none() {
            log::warn!("trie30: out of memory growing pool for a width-{slen} slot");
            return None;
        }
        inner.alloc_slot(slen)
    }

    pub(crate) fn free_slot(&self, slot: *mut usize, slen: usize) {
        self.inner.lock().free_slot(slot, slen);
    }

    pub(crate) fn try_extend(&self, slot: *mut usize, slen_old: usize, slen_new: usize) -> bool {
        self.inner.lock().try_extend(slot, slen_old, slen_new)
    }

    pub(crate) fn shrink(&self, slot: *mut usize, slen_old: usize, slen_new: usize) {
        self.inner.lock().shrink(slot, slen_old, slen_new);
    }

    /// Snapshot of how this pool's pages are currently occupied.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for rank in 0..POOL_RANK_MAX {
            let mut cur = inner.queues[rank];
            while let Some(page) = cur {
                unsafe {
                    cur = (*page.as_ptr()).next;
                    log::trace!("trie30: releasing page {:p}", page.as_ptr());
                    dealloc(page.as_ptr() as *mut u8, page_layout());
                }
            }
        }
    }
}

fn page_layout() -> Layout {
    Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).expect("PAGE_SIZE is a valid power-of-two alignment")
}

impl Inner {
    fn add_page(&mut self) -> Option<()> {
        let raw = unsafe { alloc(page_layout()) };
        let page = NonNull::new(raw as *mut PageHeader)?;
        unsafe {
            (*page.as_ptr()).map1 = page::MAP1_EMPTY;
            (*page.as_ptr()).map2 = page::MAP2_EMPTY;
            (*page.as_ptr()).rank = 0;
            (*page.as_ptr()).prev = None;
            (*page.as_ptr()).next = None;

            let rank = page::demote_rank(page.as_ptr(), SLEN_MAX);
            self.push_front(rank, page);
        }
        self.page_count += 1;
        log::trace!("trie30: allocated page {:p}, total pages now {}", raw, self.page_count);
        Some(())
    }

    fn alloc_slot(&mut self, slen: usize) -> Option<*mut usize> {
        for rank in slen..POOL_RANK_MAX {
            let Some(page) = self.queues[rank] else { continue };
            unsafe {
                let off = page::alloc_run(page.as_ptr(), slen)
                    .expect("page classified at this rank must fit the requested width");
                self.remove(rank, page);
                let new_rank = page::demote_rank(page.as_ptr(), rank);
                if new_rank != rank {
                    log::debug!("trie30: page {:p} demoted rank {rank} -> {new_rank}", page.as_ptr());
                }
                self.push_front(new_rank, page);
                return Some(page::slot_at(page.as_ptr(), off));
            }
        }
        None
    }

    fn free_slot(&mut self, slot: *mut usize, slen: usize) {
        unsafe {
            let page = page::page_of(slot);
            let off = page::slot_offset(slot);
            page::shrink_bits(page, off, slen, 0);
            self.requeue(page);
        }
    }

    fn try_extend(&mut self, slot: *mut usize, slen_old: usize, slen_new: usize) -> bool {
        unsafe {
            let page = page::page_of(slot);
            let off = page::slot_offset(slot);
            if !page::try_extend_bits(page, off, slen_old, slen_new) {
                return false;
            }

            if slen_new == SLEN_MAX {
                slot::fix_after_grow_into_max(slot, slot);
            } else {
                slot::set_slen(slot, slen_new);
            }

            self.requeue(page);
            true
        }
    }

    fn shrink(&mut self, slot: *mut usize, slen_old: usize, slen_new: usize) {
        unsafe {
            if slen_old == SLEN_MAX {
                slot::fix_after_shrink_from_max(slot, slot, slen_new);
            } else {
                slot::set_slen(slot, slen_new);
            }

            let page = page::page_of(slot);
            let off = page::slot_offset(slot);
            page::shrink_bits(page, off, slen_old, slen_new);
            self.requeue(page);
        }
    }

    /// Recompute and move `page` to the rank its bitmaps now support,
    /// after a free or a shrink widened its available runs. A page that
    /// reaches rank 8 fully empty is released back to the system instead of
    /// being requeued.
    unsafe fn requeue(&mut self, page: *mut PageHeader) {
        unsafe {
            let page_nn = NonNull::new_unchecked(page);
            let old_rank = page::rank(page);
            self.remove(old_rank, page_nn);

            let mut new_rank = old_rank;
            while new_rank < SLEN_MAX && page::promote_rank(page, new_rank + 1) == new_rank + 1 {
                new_rank += 1;
            }
            if new_rank != old_rank {
                log::debug!("trie30: page {page:p} promoted rank {old_rank} -> {new_rank}");
            }

            if new_rank == SLEN_MAX && page::is_fully_empty(page) {
                log::trace!("trie30: releasing empty page {page:p}");
                dealloc(page as *mut u8, page_layout());
                self.page_count -= 1;
                return;
            }

            self.push_front(new_rank, page_nn);
        }
    }

    unsafe fn push_front(&mut self, rank: usize, page: NonNull<PageHeader>) {
        unsafe {
            (*page.as_ptr()).rank = rank;
            (*page.as_ptr()).prev = None;
            (*page.as_ptr()).next = self.queues[rank];
            if let Some(head) = self.queues[rank] {
                (*head.as_ptr()).prev = Some(page);
            }
            self.queues[rank] = Some(page);
        }
    }

    unsafe fn remove(&mut self, rank: usize, page: NonNull<PageHeader>) {
        unsafe {
            let prev = (*page.as_ptr()).prev;
            let next = (*page.as_ptr()).next;
            match prev {
                Some(p) => (*p.as_ptr()).next = next,
                None => self.queues[rank] = next,
            }
            if let Some(n) = next {
                (*n.as_ptr()).prev = prev;
            }
            (*page.as_ptr()).prev = None;
            (*page.as_ptr()).next = None;
        }
    }

    fn stats(&mut self) -> PoolStats {
        let mut stats = PoolStats {
            pages: self.page_count,
            slots: self.page_count as u64 * page::SUBSLOTS_PER_PAGE,
            free_slots: 0,
            rank_pages: [0; POOL_RANK_MAX],
            free_fragments: [0; SLEN_MAX],
        };

        for rank in 0..POOL_RANK_MAX {
            let mut cur = self.queues[rank];
            while let Some(page) = cur {
                stats.rank_pages[rank] += 1;
                unsafe {
                    let map1 = (*page.as_ptr()).map1;
                    let map2 = (*page.as_ptr()).map2;
                    stats.free_slots += map1.count_ones() as u64 + map2.count_ones() as u64;
                    page::count_fragments(map1, &mut stats.free_fragments, SLEN_MAX);
                    page::count_fragments(map2, &mut stats.free_fragments, SLEN_MAX);
                    cur = (*page.as_ptr()).next;
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_slot_roundtrip() {
        let pool = Pool::new();
        let a = pool.alloc_slot(1).expect("fresh pool must serve a width-1 slot");
        let b = pool.alloc_slot(1).expect("fresh pool must serve a second width-1 slot");
        unsafe {
            *a = 0;
            *b = 0;
        }
        pool.free_slot(a, 1);
        assert_eq!(pool.stats().pages, 1, "page still holds a live slot");
        pool.free_slot(b, 1);
        assert_eq!(pool.stats().pages, 0, "fully empty rank-8 page is released");
    }

    #[test]
    fn grows_pool_lazily() {
        let pool = Pool::new();
        assert_eq!(pool.stats().pages, 0);
        let _ = pool.alloc_slot(1).unwrap();
        assert_eq!(pool.stats().pages, 1);
    }
}
