//! End-to-end ordering and lifecycle scenarios against the public API.

use std::cell::Cell;
use std::ptr::NonNull;

use trie30::{Entry, Map, Pool};

struct Item {
    link: Cell<Option<NonNull<Item>>>,
    key: u32,
}

impl Item {
    fn new(key: u32) -> Self {
        Item { link: Cell::new(None), key }
    }
}

impl Entry for Item {
    fn link(&self) -> &Cell<Option<NonNull<Item>>> {
        &self.link
    }
    fn key(&self) -> u32 {
        self.key
    }
}

fn collect_ascending(map: &Map<Item>) -> Vec<u32> {
    let mut keys = Vec::new();
    let Some(mut cur) = map.first() else { return keys };
    loop {
        keys.push(cur.bucket().first().key);
        if !cur.next() {
            break;
        }
    }
    keys
}

#[test]
fn two_keys_in_order() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let a = Item::new(1);
    let b = Item::new(2);
    map.insert(&a).unwrap();
    map.insert(&b).unwrap();

    assert!(map.find(1).is_some());
    assert!(map.find(2).is_some());

    let mut cur = map.first().unwrap();
    assert_eq!(cur.bucket().first().key, 1);
    assert!(cur.next());
    assert_eq!(cur.bucket().first().key, 2);
    assert!(!cur.next());
}

#[test]
fn divergent_subkey_groups_build_a_chain() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let a = Item::new(0x00ff);
    let b = Item::new(0xff00);

    map.insert(&a).unwrap();
    map.insert(&b).unwrap();

    assert_eq!(collect_ascending(&map), vec![0x00ff, 0xff00]);
}

#[test]
fn large_bucket_survives_interleaved_removal() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let items: Vec<Box<Item>> = (0..100).map(|_| Box::new(Item::new(1))).collect();

    for item in &items {
        map.insert(item).unwrap();
    }
    assert_eq!(map.find(1).unwrap().iter().count(), 100);

    for offset in 0..3 {
        let mut i = offset;
        while i < items.len() {
            if i % 3 == offset {
                map.remove(&items[i]);
            }
            i += 1;
        }
    }

    assert!(map.find(1).is_none());
    assert!(map.is_empty());
}

#[test]
fn shuffled_random_keys_traverse_sorted() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    let mut rng = Pcg64::seed_from_u64(0xC0FFEE);
    let mut keys: Vec<u32> = (0..4000u32).map(|i| (i * 2654435761u32) & trie30::KEY_MASK).collect();
    keys.sort_unstable();
    keys.dedup();
    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rng);

    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let items: Vec<Box<Item>> = shuffled.iter().map(|&k| Box::new(Item::new(k))).collect();
    for item in &items {
        map.insert(item).unwrap();
    }

    assert_eq!(collect_ascending(&map), keys);
}

#[test]
fn nfind_ceiling_behavior() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let a = Item::new(10);
    let b = Item::new(20);
    map.insert(&a).unwrap();
    map.insert(&b).unwrap();

    assert_eq!(map.nfind(0).unwrap().bucket().first().key, 10);
    assert!(map.nfind(21).is_none());
    assert_eq!(map.nfind(20).unwrap().bucket().first().key, 20);
}

#[test]
fn empties_fully_after_removing_everything() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let items: Vec<Box<Item>> = (0..64u32).map(|k| Box::new(Item::new(k * 37))).collect();

    for item in &items {
        map.insert(item).unwrap();
    }
    for item in &items {
        map.remove(item);
    }

    assert!(map.is_empty());
    assert!(map.first().is_none());
}

#[test]
fn boundary_keys_round_trip() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let lo = Item::new(0);
    let hi = Item::new(trie30::KEY_MASK);
    map.insert(&lo).unwrap();
    map.insert(&hi).unwrap();

    assert_eq!(collect_ascending(&map), vec![0, trie30::KEY_MASK]);
}

#[test]
fn keys_above_bit_29_alias() {
    let pool = Pool::new();
    let mut map: Map<Item> = Map::new(&pool);
    let a = Item::new(0x1);
    let b = Item::new(0x4000_0001);

    map.insert(&a).unwrap();
    map.insert(&b).unwrap();

    let by_addr: Vec<*const Item> = map.find(0x1).unwrap().iter().map(|e| e as *const Item).collect();
    assert_eq!(by_addr, vec![&b as *const Item, &a as *const Item]);
    assert_eq!(map.find(0x4000_0001).unwrap().iter().count(), 2);

    let mut cur = map.first().unwrap();
    assert_eq!(cur.bucket().iter().count(), 2);
    assert!(!cur.next(), "both keys alias to a single bucket");

    map.remove(&b);
    map.remove(&a);
    assert!(map.is_empty());
}
