//! Generational slab holding the timer entries.
//!
//! Slots are recycled through an intrusive free list. Every release bumps the
//! slot's generation so that handles to the previous occupant go stale.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Newtype for slab indices to prevent cross-slab misuse.
// Manual impls: derive would put bounds on T, but PhantomData is just a marker.
pub struct SlabIndex<T>(u32, PhantomData<fn() -> T>);

impl<T> Copy for SlabIndex<T> {}

impl<T> Clone for SlabIndex<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for SlabIndex<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for SlabIndex<T> {}

impl<T> Hash for SlabIndex<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> fmt::Debug for SlabIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SlabIndex").field(&self.0).finish()
    }
}

impl<T> From<u32> for SlabIndex<T> {
    #[inline]
    fn from(idx: u32) -> Self {
        Self(idx, PhantomData)
    }
}

impl<T> From<SlabIndex<T>> for u32 {
    #[inline]
    fn from(idx: SlabIndex<T>) -> Self {
        idx.0
    }
}

impl<T> From<SlabIndex<T>> for usize {
    #[inline]
    fn from(idx: SlabIndex<T>) -> Self {
        idx.0 as Self
    }
}

/// Occupied slot.
pub struct Node<T> {
    pub value: T,
    /// Generation counter for ABA protection.
    pub generation: u32,
}

/// Metadata for a free slab slot.
pub struct FreeSlot<T> {
    /// Next free slot in the free list.
    pub next: Option<SlabIndex<T>>,
    /// Generation the next occupant will receive.
    pub generation: u32,
}

/// Slot in the slab.
pub enum Entry<T> {
    Occupied(Node<T>),
    Free(FreeSlot<T>),
}

/// Growable slab with intrusive free list.
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<SlabIndex<T>>,
    len: usize,
}

impl<T> Slab<T> {
    /// Creates an empty slab with room for `cap` entries before reallocating.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Stores `value`, returning its index and generation.
    ///
    /// # Panics
    ///
    /// Panics if the slab would hold more than `u32::MAX` slots.
    pub fn alloc(&mut self, value: T) -> (SlabIndex<T>, u32) {
        self.len += 1;
        if let Some(head) = self.free_head {
            let (next_free, generation) = match &self.entries[usize::from(head)] {
                Entry::Free(slot) => (slot.next, slot.generation),
                Entry::Occupied(_) => unreachable!("free_head must point to free slot"),
            };
            self.free_head = next_free;
            self.entries[usize::from(head)] = Entry::Occupied(Node { value, generation });
            return (head, generation);
        }

        let idx = u32::try_from(self.entries.len()).expect("slab index should fit in u32");
        self.entries.push(Entry::Occupied(Node {
            value,
            generation: 0,
        }));
        (SlabIndex::from(idx), 0)
    }

    /// Frees the slot at `idx` if it holds generation `generation`.
    pub fn free(&mut self, idx: SlabIndex<T>, generation: u32) -> Option<T> {
        let slot = self.entries.get_mut(usize::from(idx))?;
        match slot {
            Entry::Occupied(n) if n.generation == generation => {}
            _ => return None,
        }
        let old = core::mem::replace(
            slot,
            Entry::Free(FreeSlot {
                next: self.free_head,
                generation: generation.wrapping_add(1),
            }),
        );
        self.free_head = Some(idx);
        self.len -= 1;
        match old {
            Entry::Occupied(n) => Some(n.value),
            Entry::Free(_) => None,
        }
    }

    /// Gets the value at `idx` if it is occupied by `generation`.
    #[must_use]
    pub fn get(&self, idx: SlabIndex<T>, generation: u32) -> Option<&T> {
        match self.entries.get(usize::from(idx))? {
            Entry::Occupied(n) if n.generation == generation => Some(&n.value),
            _ => None,
        }
    }

    /// Mutable variant of [`Slab::get`].
    pub fn get_mut(&mut self, idx: SlabIndex<T>, generation: u32) -> Option<&mut T> {
        match self.entries.get_mut(usize::from(idx))? {
            Entry::Occupied(n) if n.generation == generation => Some(&mut n.value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_freed_slots_with_new_generation() {
        let mut slab = Slab::with_capacity(1);
        let (a, gen_a) = slab.alloc("a");
        assert_eq!(slab.free(a, gen_a), Some("a"));
        let (b, gen_b) = slab.alloc("b");
        assert_eq!(a, b);
        assert_ne!(gen_a, gen_b);
        assert!(slab.get(a, gen_a).is_none(), "stale generation must miss");
        assert_eq!(slab.get(b, gen_b), Some(&"b"));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::with_capacity(1);
        let handles: Vec<_> = (0..5).map(|i| slab.alloc(i)).collect();
        assert_eq!(slab.len(), 5);
        for (i, (idx, generation)) in handles.into_iter().enumerate() {
            assert_eq!(slab.get(idx, generation), Some(&i));
        }
    }

    #[test]
    fn double_free_is_rejected() {
        let mut slab = Slab::with_capacity(2);
        let (idx, generation) = slab.alloc(7u32);
        assert_eq!(slab.free(idx, generation), Some(7));
        assert_eq!(slab.free(idx, generation), None);
        assert_eq!(slab.len(), 0);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut slab = Slab::with_capacity(1);
        let (idx, generation) = slab.alloc(1u32);
        if let Some(v) = slab.get_mut(idx, generation) {
            *v = 9;
        }
        assert_eq!(slab.get(idx, generation), Some(&9));
    }
}
