//! An ordered associative map keyed by 30-bit integers.
//!
//! The map is an array-mapped trie (AMT) of fan-out 32 over a 30-bit key,
//! backed by a page/slot slab allocator that packs variable-width trie nodes
//! into fixed-size pages (see [`pool`]). Values are never owned by the map:
//! callers implement [`Entry`] on their own record type and the map only
//! borrows an intrusive link cell and a key out of it.
//!
//! ```
//! use core::cell::Cell;
//! use core::ptr::NonNull;
//! use trie30::{Entry, Map, Pool};
//!
//! struct Item {
//!     link: Cell<Option<NonNull<Item>>>,
//!     key: u32,
//! }
//!
//! impl Entry for Item {
//!     fn link(&self) -> &Cell<Option<NonNull<Item>>> {
//!         &self.link
//!     }
//!     fn key(&self) -> u32 {
//!         self.key
//!     }
//! }
//!
//! let pool = Pool::new();
//! let mut map: Map<Item> = Map::new(&pool);
//!
//! let a = Item { link: Cell::new(None), key: 1 };
//! let b = Item { link: Cell::new(None), key: 2 };
//! map.insert(&a).unwrap();
//! map.insert(&b).unwrap();
//! assert!(map.find(1).is_some());
//! ```
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod cursor;
mod entry;
mod error;
mod map;
mod page;
mod pool;
mod slot;
mod stats;
mod tagged;
mod trie;

pub use cursor::Cursor;
pub use entry::{Bucket, Entry};
pub use error::{Error, Result};
pub use map::Map;
pub use pool::{Pool, PoolConfig};
pub use stats::PoolStats;

/// Sub-keys per 30-bit key (six 5-bit groups).
pub const SUBKEY_COUNT: usize = slot::SUBKEY_COUNT;
/// Fan-out of a fully dense ("max") trie node.
pub const FANOUT: usize = slot::FANOUT;
/// Bitmask that confines a key to 30 bits.
pub const KEY_MASK: u32 = slot::KEY_MASK;
