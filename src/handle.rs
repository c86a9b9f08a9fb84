//! Generation-tagged arena backing the handles given to callers.
//!
//! A [`Handle`] is an index, the generation of the slot when the handle was
//! issued, and the id of the issuing arena. Releasing a slot bumps its
//! generation, so every older handle to it is detected as stale.

use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    num::NonZeroU64,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
    },
};

use log::debug;

use crate::error::{HematiteError, Result};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one [`Arena`], unique for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(NonZeroU64);

impl ArenaId {
    fn next() -> ArenaId {
        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        // the counter starts at 1 and would need 2^64 arenas to wrap
        ArenaId(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }
}

/// Opaque reference to a value held in an [`Arena`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    arena: ArenaId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn arena(&self) -> ArenaId {
        self.arena
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.generation == other.generation
            && self.arena == other.arena
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
        self.arena.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{}@{})", self.index, self.generation, self.arena.0)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation } => *generation,
        }
    }
}

/// Slot storage whose handles fail cleanly after release
///
/// Dropped [`Guarded`] handles are queued and reclaimed on the next call to
/// [`Arena::reclaim_finalized`].
pub struct Arena<T> {
    id: ArenaId,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    finalized_tx: Sender<Handle<T>>,
    finalized_rx: Receiver<Handle<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        let (finalized_tx, finalized_rx) = mpsc::channel();
        Arena {
            id: ArenaId::next(),
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            finalized_tx,
            finalized_rx,
        }
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = slot.generation();
            *slot = Slot::Occupied { generation, value };
            return self.handle(index, generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        self.handle(index, 0)
    }

    fn handle(&self, index: u32, generation: u32) -> Handle<T> {
        Handle {
            index,
            generation,
            arena: self.id,
            _marker: PhantomData,
        }
    }

    fn slot(&self, handle: Handle<T>) -> Result<&Slot<T>> {
        if handle.arena != self.id {
            return Err(HematiteError::ForeignHandle);
        }
        self.slots
            .get(handle.index as usize)
            .ok_or(HematiteError::ForeignHandle)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_ok()
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T> {
        match self.slot(handle)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Ok(value),
            _ => Err(HematiteError::UseAfterFree),
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        self.slot(handle)?;
        match &mut self.slots[handle.index as usize] {
            Slot::Occupied { generation, value } if *generation == handle.generation => Ok(value),
            _ => Err(HematiteError::UseAfterFree),
        }
    }

    /// Frees the slot behind `handle` and returns its value
    ///
    /// Releasing twice reports [`HematiteError::UseAfterFree`] and changes nothing.
    pub fn release(&mut self, handle: Handle<T>) -> Result<T> {
        self.get(handle)?;

        let slot = &mut self.slots[handle.index as usize];
        // a slot whose generation would wrap is retired instead of reused
        let (next_generation, reusable) = match handle.generation.checked_add(1) {
            Some(g) => (g, true),
            None => (handle.generation, false),
        };
        let previous = std::mem::replace(
            slot,
            Slot::Vacant {
                generation: next_generation,
            },
        );
        if reusable {
            self.free.push(handle.index);
        }
        self.len -= 1;

        match previous {
            Slot::Occupied { value, .. } => Ok(value),
            Slot::Vacant { .. } => Err(HematiteError::UseAfterFree),
        }
    }

    /// Wraps `handle` so that dropping the wrapper queues it for reclamation
    pub fn guard(&self, handle: Handle<T>) -> Guarded<T> {
        Guarded {
            handle,
            finalizer: Some(self.finalized_tx.clone()),
        }
    }

    /// Releases every handle whose [`Guarded`] wrapper was dropped
    ///
    /// Handles that were already released explicitly are skipped.
    ///
    /// # Returns
    /// The number of slots reclaimed
    pub fn reclaim_finalized(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Ok(handle) = self.finalized_rx.try_recv() {
            if self.release(handle).is_ok() {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            debug!("reclaimed {reclaimed} abandoned handles");
        }
        reclaimed
    }
}

/// Safety net for handles a caller forgets to release
///
/// Dropping a `Guarded` does not release anything right away; it only queues
/// the handle for the owning arena's next [`Arena::reclaim_finalized`].
pub struct Guarded<T> {
    handle: Handle<T>,
    finalizer: Option<Sender<Handle<T>>>,
}

impl<T> Guarded<T> {
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// Gives up the safety net, the caller now owns the release
    pub fn into_inner(mut self) -> Handle<T> {
        self.finalizer = None;
        self.handle
    }
}

impl<T> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guarded").field(&self.handle).finish()
    }
}

impl<T> Drop for Guarded<T> {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer.send(self.handle).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(*arena.get(a).unwrap(), "a");
        assert_eq!(*arena.get(b).unwrap(), "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn get_mut_writes_through() {
        let mut arena = Arena::new();
        let h = arena.insert(1);
        *arena.get_mut(h).unwrap() += 1;
        assert_eq!(*arena.get(h).unwrap(), 2);
    }

    #[test]
    fn released_handle_is_stale() {
        let mut arena = Arena::new();
        let h = arena.insert(7);
        assert_eq!(arena.release(h).unwrap(), 7);

        assert!(matches!(arena.get(h), Err(HematiteError::UseAfterFree)));
        assert!(matches!(arena.get_mut(h), Err(HematiteError::UseAfterFree)));
        assert!(matches!(arena.release(h), Err(HematiteError::UseAfterFree)));
        assert!(arena.is_empty());
    }

    #[test]
    fn reused_slot_does_not_revive_old_handle() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.release(old).unwrap();
        let new = arena.insert(2);

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(matches!(arena.get(old), Err(HematiteError::UseAfterFree)));
        assert_eq!(*arena.get(new).unwrap(), 2);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut first = Arena::new();
        let mut second = Arena::new();
        let h = first.insert(1);
        second.insert(2);

        assert!(matches!(second.get(h), Err(HematiteError::ForeignHandle)));
        assert!(matches!(second.release(h), Err(HematiteError::ForeignHandle)));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn dropped_guard_is_reclaimed_later() {
        let mut arena = Arena::new();
        let h = arena.insert(5);
        drop(arena.guard(h));

        assert!(arena.contains(h));
        assert_eq!(arena.reclaim_finalized(), 1);
        assert!(!arena.contains(h));
    }

    #[test]
    fn guard_after_explicit_release_is_a_no_op() {
        let mut arena = Arena::new();
        let h = arena.insert(5);
        let guard = arena.guard(h);
        arena.release(guard.handle()).unwrap();
        drop(guard);

        assert_eq!(arena.reclaim_finalized(), 0);
    }

    #[test]
    fn disarmed_guard_is_not_reclaimed() {
        let mut arena = Arena::new();
        let h = arena.insert(5);
        let h2 = arena.guard(h).into_inner();
        assert_eq!(h, h2);

        assert_eq!(arena.reclaim_finalized(), 0);
        assert!(arena.contains(h));
    }

    #[test]
    fn guard_outliving_its_arena_drops_quietly() {
        let mut arena = Arena::new();
        let h = arena.insert(6);
        let guard = arena.guard(h);
        drop(arena);
        drop(guard);
    }
}
