use std::collections::HashMap;
use std::mem;

use skein_heap::{Heap, SharedHeap};
use skein_node::{Lifecycle, Node};
use skein_types::constants::INT_MAP_MIN_SLOTS;
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::primitives::Token;
use skein_types::tags::{Derived, Usage};
use tracing::debug;

use crate::change::Change;

/// End of a bucket chain or of the free list.
const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
enum Assoc<V> {
    Free { next: u32 },
    Used { key: Token, val: V, next: u32 },
}

/// MurmurHash3 finalizer; spreads sequential tokens across buckets.
fn hash(key: Token) -> u32 {
    let mut x = key;
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^= x >> 16;
    x
}

fn bucket_of(key: Token, buckets: usize) -> usize {
    hash(key) as usize % buckets
}

/// Chained hash map keyed by raw 32-bit integers.
///
/// Entries live in a slot array whose indices never move: growth appends
/// slots and rebuilds the bucket heads, and removal returns a slot to the
/// free list. Slot arrays are accounted to a dedicated slot heap, separate
/// from the heap that owns the map node itself.
pub struct IntMap<V: Copy> {
    node: Node,
    slot_heap: SharedHeap,
    assocs: Vec<Assoc<V>>,
    /// One chain head per slot; `buckets.len() == assocs.len()`.
    buckets: Vec<u32>,
    free_head: u32,
    fill: usize,
}

impl<V: Copy> IntMap<V> {
    /// Create a map with room for `slots` entries before the first growth.
    pub fn new(
        usage: Usage,
        heap: SharedHeap,
        slot_heap: SharedHeap,
        slots: usize,
    ) -> SkeinResult<Self> {
        let slots = slots.max(INT_MAP_MIN_SLOTS);
        if slots >= NIL as usize {
            return Err(SkeinError::OutOfMemory {
                requested: Self::slot_bytes(slots),
                available: 0,
            });
        }
        let mut assocs = Vec::new();
        let mut buckets = Vec::new();
        Self::reserve(&slot_heap, &mut assocs, &mut buckets, slots)?;

        let mut map = Self {
            node: Node::new(usage, heap, Derived::IntMap),
            slot_heap,
            assocs,
            buckets,
            free_head: NIL,
            fill: 0,
        };
        map.extend_free(slots);
        map.buckets.resize(slots, NIL);
        Ok(map)
    }

    fn slot_bytes(slots: usize) -> usize {
        slots.saturating_mul(mem::size_of::<Assoc<V>>() + mem::size_of::<u32>())
    }

    /// Charge the slot heap for `additional` slots and reserve them in both
    /// arrays. Nothing changes on failure.
    fn reserve(
        slot_heap: &SharedHeap,
        assocs: &mut Vec<Assoc<V>>,
        buckets: &mut Vec<u32>,
        additional: usize,
    ) -> SkeinResult<()> {
        let bytes = Self::slot_bytes(additional);
        slot_heap.grant(bytes)?;
        if assocs.try_reserve_exact(additional).is_err()
            || buckets.try_reserve_exact(additional).is_err()
        {
            slot_heap.release(bytes);
            return Err(SkeinError::OutOfMemory {
                requested: bytes,
                available: 0,
            });
        }
        Ok(())
    }

    /// Append free slots up to `total`, threading them onto the free list.
    fn extend_free(&mut self, total: usize) {
        let start = self.assocs.len();
        for index in start..total {
            let next = if index + 1 < total {
                (index + 1) as u32
            } else {
                self.free_head
            };
            self.assocs.push(Assoc::Free { next });
        }
        if total > start {
            self.free_head = start as u32;
        }
    }

    /// Rebuild every bucket chain for the current slot count.
    fn rehash(&mut self) {
        let count = self.assocs.len();
        self.buckets.clear();
        self.buckets.resize(count, NIL);
        for (index, assoc) in self.assocs.iter_mut().enumerate() {
            if let Assoc::Used { key, next, .. } = assoc {
                let bucket = bucket_of(*key, count);
                *next = self.buckets[bucket];
                self.buckets[bucket] = index as u32;
            }
        }
    }

    /// Double the slot count. Slot indices are preserved.
    fn grow(&mut self) -> SkeinResult<()> {
        let old = self.assocs.len();
        let new = old.saturating_mul(2).max(INT_MAP_MIN_SLOTS);
        if new >= NIL as usize {
            return Err(SkeinError::OutOfMemory {
                requested: Self::slot_bytes(new - old),
                available: 0,
            });
        }
        Self::reserve(&self.slot_heap, &mut self.assocs, &mut self.buckets, new - old)?;
        self.extend_free(new);
        self.rehash();
        debug!(from = old, to = new, fill = self.fill, "int map grown");
        Ok(())
    }

    /// Locate `key`: its bucket, its predecessor in the chain, and its slot.
    fn find(&self, key: Token) -> Option<(usize, u32, u32)> {
        if self.buckets.is_empty() {
            return None;
        }
        let bucket = bucket_of(key, self.buckets.len());
        let mut prev = NIL;
        let mut index = self.buckets[bucket];
        while index != NIL {
            match self.assocs[index as usize] {
                Assoc::Used { key: k, next, .. } => {
                    if k == key {
                        return Some((bucket, prev, index));
                    }
                    prev = index;
                    index = next;
                }
                Assoc::Free { .. } => unreachable!("free slot {index} linked into bucket {bucket}"),
            }
        }
        None
    }

    fn unlink(&mut self, bucket: usize, prev: u32, index: u32) -> (Token, V) {
        let (key, val, next) = match self.assocs[index as usize] {
            Assoc::Used { key, val, next } => (key, val, next),
            Assoc::Free { .. } => unreachable!("unlinking free slot {index}"),
        };
        if prev == NIL {
            self.buckets[bucket] = next;
        } else if let Assoc::Used { next: link, .. } = &mut self.assocs[prev as usize] {
            *link = next;
        }
        self.assocs[index as usize] = Assoc::Free {
            next: self.free_head,
        };
        self.free_head = index;
        self.fill -= 1;
        (key, val)
    }

    // ─── Map operations ──────────────────────────────────────────────────────

    /// Insert or replace. Returns the value previously stored under `key`.
    ///
    /// Fails with `OutOfMemory` when the map must grow and the slot heap
    /// refuses; the map is unchanged in that case.
    pub fn put(&mut self, key: Token, val: V) -> SkeinResult<Option<V>> {
        self.node.check_mutable("put into")?;
        if let Some((_, _, index)) = self.find(key) {
            return match &mut self.assocs[index as usize] {
                Assoc::Used { val: slot, .. } => Ok(Some(mem::replace(slot, val))),
                Assoc::Free { .. } => unreachable!("find returned free slot {index}"),
            };
        }

        if self.free_head == NIL {
            self.grow()?;
        }
        let index = self.free_head;
        self.free_head = match self.assocs[index as usize] {
            Assoc::Free { next } => next,
            Assoc::Used { .. } => unreachable!("free list reached used slot {index}"),
        };
        let bucket = bucket_of(key, self.buckets.len());
        self.assocs[index as usize] = Assoc::Used {
            key,
            val,
            next: self.buckets[bucket],
        };
        self.buckets[bucket] = index;
        self.fill += 1;
        Ok(None)
    }

    /// Value stored under `key`. A map that is not open holds nothing.
    pub fn get(&self, key: Token) -> Option<V> {
        if !self.node.is_open() {
            return None;
        }
        self.find(key).map(|(_, _, index)| match self.assocs[index as usize] {
            Assoc::Used { val, .. } => val,
            Assoc::Free { .. } => unreachable!("find returned free slot {index}"),
        })
    }

    pub fn contains(&self, key: Token) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning its value if it was present.
    pub fn cut(&mut self, key: Token) -> SkeinResult<Option<V>> {
        self.node.check_mutable("cut from")?;
        Ok(self
            .find(key)
            .map(|(bucket, prev, index)| self.unlink(bucket, prev, index).1))
    }

    /// Remove the entry in slot `index`, if that slot is in use.
    fn cut_slot(&mut self, index: u32) -> Option<(Token, V)> {
        let key = match self.assocs.get(index as usize)? {
            Assoc::Used { key, .. } => *key,
            Assoc::Free { .. } => return None,
        };
        let (bucket, prev, found) = self.find(key)?;
        debug_assert_eq!(found, index);
        Some(self.unlink(bucket, prev, found))
    }

    /// Remove every entry, keeping the slot arrays. Returns the count removed.
    pub fn cut_all(&mut self) -> SkeinResult<usize> {
        self.node.check_mutable("cut all from")?;
        let removed = self.fill;
        let total = self.assocs.len();
        self.assocs.clear();
        self.free_head = NIL;
        self.extend_free(total);
        self.buckets.iter_mut().for_each(|head| *head = NIL);
        self.fill = 0;
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Current slot capacity.
    pub fn slots(&self) -> usize {
        self.assocs.len()
    }

    /// Snapshot iteration over live entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (Token, V)> + '_ {
        self.assocs.iter().filter_map(|assoc| match assoc {
            Assoc::Used { key, val, .. } => Some((*key, *val)),
            Assoc::Free { .. } => None,
        })
    }

    /// Copy live entries into a std map, mostly for diagnostics and tests.
    pub fn to_hash_map(&self) -> HashMap<Token, V> {
        self.entries().collect()
    }

    /// Cursor that may remove the entry it rests on.
    pub fn iter(&mut self) -> IntMapIter<'_, V> {
        IntMapIter {
            map: self,
            pos: Pos::Start,
        }
    }
}

impl<V: Copy> Lifecycle for IntMap<V> {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    fn close_body(&mut self) {
        let slots = self.assocs.len();
        self.assocs = Vec::new();
        self.buckets = Vec::new();
        self.free_head = NIL;
        self.fill = 0;
        self.slot_heap.release(Self::slot_bytes(slots));
        debug!(slots, "int map slots released");
    }
}

#[derive(Debug, Clone, Copy)]
enum Pos<V> {
    Start,
    At(u32),
    Cut { index: u32, key: Token, val: V },
    End,
}

/// Cursor over an [`IntMap`].
///
/// Visits entries in slot order. The cursor holds the map mutably, so the
/// only mutation possible while it is alive is [`IntMapIter::cut_here`],
/// which never causes an entry to be skipped or visited twice.
pub struct IntMapIter<'a, V: Copy> {
    map: &'a mut IntMap<V>,
    pos: Pos<V>,
}

#[allow(clippy::should_implement_trait)]
impl<V: Copy> IntMapIter<'_, V> {
    fn scan(&mut self, from: usize) -> Change<V> {
        let found = self
            .map
            .assocs
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(index, assoc)| match assoc {
                Assoc::Used { key, val, .. } => Some((index as u32, *key, *val)),
                Assoc::Free { .. } => None,
            });
        match found {
            Some((index, key, val)) => {
                self.pos = Pos::At(index);
                Change::Here { key, val }
            }
            None => {
                self.pos = Pos::End;
                Change::End
            }
        }
    }

    /// Move to the first entry.
    pub fn first(&mut self) -> Change<V> {
        self.scan(0)
    }

    /// Move to the entry after the current position.
    pub fn next(&mut self) -> Change<V> {
        match self.pos {
            Pos::Start => self.first(),
            Pos::At(index) | Pos::Cut { index, .. } => self.scan(index as usize + 1),
            Pos::End => Change::End,
        }
    }

    /// Report the current position without moving.
    pub fn here(&self) -> Change<V> {
        match self.pos {
            Pos::At(index) => match self.map.assocs[index as usize] {
                Assoc::Used { key, val, .. } => Change::Here { key, val },
                Assoc::Free { .. } => Change::End,
            },
            Pos::Cut { key, val, .. } => Change::Cut { key, val },
            Pos::Start | Pos::End => Change::End,
        }
    }

    /// Remove the entry under the cursor. The following [`next`](Self::next)
    /// continues with the entry after it. Repeating the cut is a no-op.
    pub fn cut_here(&mut self) -> SkeinResult<Change<V>> {
        match self.pos {
            Pos::At(index) => {
                self.map.node.check_mutable("cut from")?;
                match self.map.cut_slot(index) {
                    Some((key, val)) => {
                        self.pos = Pos::Cut { index, key, val };
                        Ok(Change::Cut { key, val })
                    }
                    None => Ok(Change::End),
                }
            }
            Pos::Cut { .. } => Ok(self.here()),
            Pos::Start | Pos::End => Ok(Change::End),
        }
    }
}
