//! Point-in-time occupancy snapshot of a [`crate::Pool`].

use crate::page::POOL_RANK_MAX;
use crate::slot::SLEN_MAX;

/// Snapshot returned by [`crate::Pool::stats`].
///
/// `slots` and `free_slots` are exact counts (every sub-slot across every
/// page, and every sub-slot currently marked free — a set bit — in its
/// page's bitmaps, respectively) — not derived from
/// [`PoolStats::free_fragments`], which
/// folds any free run longer than [`SLEN_MAX`] down to `run_len / SLEN_MAX`
/// and so underreports whenever a page has a long free run.
///
/// `rank_pages[r]` counts pages currently classified at rank `r` (the
/// widest run of free sub-slots the allocator believes the page can still
/// serve without defragmenting). `free_fragments[w-1]` counts maximal free
/// runs of exactly `w` sub-slots across every page, with runs longer than
/// [`SLEN_MAX`] folded into the last bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub pages: usize,
    pub slots: u64,
    pub free_slots: u64,
    pub rank_pages: [usize; POOL_RANK_MAX],
    pub free_fragments: [u32; SLEN_MAX],
}
