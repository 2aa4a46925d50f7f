//! Per-thread bookkeeping shared by [`Observable`](crate::Observable) and
//! [`Observer`](crate::Observer).
//!
//! Every owner with a payload holds a *slot*: an index plus the generation the
//! slot had when the owner claimed it. Observers compare their remembered
//! generation against the slot to decide whether the payload is still there,
//! so invalidating every observer of an owner is a single generation bump.
//!
//! Observers additionally hold a *node*. Nodes of one owner form a doubly
//! linked chain rooted at the slot's `head`. The chain is what
//! [`Observable::observer_count`](crate::Observable::observer_count) walks and
//! what lets an observer leave in O(1).

use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::panics::{panic_registry_destroyed, panic_registry_overflow};

pub(crate) type SlotIndex = u32;
pub(crate) type NodeIndex = u32;

/// Identity of one payload: the slot it lives in and the generation the slot
/// had when the payload was adopted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct SlotId {
    pub(crate) index: SlotIndex,
    pub(crate) generation: u64,
}

/// Backward link of a node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Back {
    /// The node is the first one after the owner.
    Owner(SlotIndex),
    Node(NodeIndex),
}

#[derive(Default)]
struct Node {
    // Invariant: `back` is `None` iff the node is on no chain, in which case
    // `next` is `None` as well.
    back: Option<Back>,
    next: Option<NodeIndex>,
}

struct Slot {
    generation: u64,
    occupied: bool,
    head: Option<NodeIndex>,
    /// Number of live `Ref` guards handed out for the current or parked payload.
    borrows: usize,
    parked: Option<Parked>,
}

/// A type-erased boxed payload whose drop has been deferred.
///
/// Dropping a `Parked` without calling [`Parked::release`] leaks the payload.
pub(crate) struct Parked {
    ptr: NonNull<()>,
    drop_fn: unsafe fn(NonNull<()>),
}

impl Parked {
    /// # Safety
    ///
    /// `ptr` must come from `Box::<T>::into_raw` (or `Box::leak`) and nothing
    /// else may free it.
    pub(crate) unsafe fn new<T>(ptr: NonNull<T>) -> Self {
        Self {
            ptr: ptr.cast(),
            drop_fn: drop_box::<T>,
        }
    }

    pub(crate) fn release(self) {
        // SAFETY: `self.ptr` is a uniquely owned `Box<T>` with the `T` that
        // `drop_fn` was instantiated with, per the contract of `Parked::new`.
        unsafe { (self.drop_fn)(self.ptr) }
    }
}

unsafe fn drop_box<T>(ptr: NonNull<()>) {
    drop(unsafe { Box::from_raw(ptr.cast::<T>().as_ptr()) });
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    free_slots: Vec<SlotIndex>,
    nodes: Vec<Node>,
    free_nodes: Vec<NodeIndex>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = const { RefCell::new(Registry::new()) };
    // Set when the registry is torn down while guards are still registered.
    // Needs no destructor, so it stays readable for the rest of thread exit.
    static GUARDS_OUTLIVED_REGISTRY: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` against this thread's registry.
///
/// Returns `None` once the thread-local has been torn down. `f` must not run
/// user code: the registry stays borrowed for the whole call.
#[inline]
pub(crate) fn with<R>(f: impl FnOnce(&mut Registry) -> R) -> Option<R> {
    REGISTRY.try_with(|cell| f(&mut cell.borrow_mut())).ok()
}

/// Closes `id` and drops `payload`, or parks it while a guard is reading it.
///
/// After the registry has been torn down no guard can be acquired any more,
/// so the payload is dropped right away, unless guards registered before the
/// teardown may still be alive. Only then is it leaked.
pub(crate) fn release(id: SlotId, payload: Parked) {
    let mut payload = Some(payload);
    let closed = with(|r| payload.take().and_then(|p| r.close_slot(id, p)));
    let to_drop = match closed {
        Some(to_drop) => to_drop,
        None if !GUARDS_OUTLIVED_REGISTRY.with(Cell::get) => payload,
        None => None,
    };
    if let Some(payload) = to_drop {
        payload.release();
    }
}

/// Claims a slot in this thread's registry for a new payload.
#[track_caller]
pub(crate) fn open_slot() -> SlotId {
    with(Registry::open_slot).unwrap_or_else(|| panic_registry_destroyed())
}

impl Registry {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            nodes: Vec::new(),
            free_nodes: Vec::new(),
        }
    }

    pub(crate) fn open_slot(&mut self) -> SlotId {
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(!slot.occupied && slot.head.is_none() && slot.borrows == 0);
            slot.occupied = true;
            return SlotId {
                index,
                generation: slot.generation,
            };
        }

        let index = next_index(self.slots.len());
        self.slots.push(Slot {
            generation: 0,
            occupied: true,
            head: None,
            borrows: 0,
            parked: None,
        });
        SlotId {
            index,
            generation: 0,
        }
    }

    #[inline]
    pub(crate) fn is_live(&self, id: SlotId) -> bool {
        match self.slots.get(id.index as usize) {
            Some(slot) => slot.occupied && slot.generation == id.generation,
            None => false,
        }
    }

    /// Ends the life of `id`'s payload: bumps the generation so that no
    /// observer sees the payload any more, unlinks every node of the chain
    /// and hands the payload back for dropping.
    ///
    /// Returns `None` when a `Ref` guard is still alive; the payload is then
    /// parked and comes back out of [`Registry::release_borrow`].
    pub(crate) fn close_slot(&mut self, id: SlotId, payload: Parked) -> Option<Parked> {
        self.invalidate(id);
        let slot = &mut self.slots[id.index as usize];
        if slot.borrows > 0 {
            #[cfg(feature = "tracing")]
            trace!(
                slot = id.index,
                borrows = slot.borrows,
                "payload parked until its last guard is dropped"
            );
            slot.parked = Some(payload);
            return None;
        }
        self.free_slots.push(id.index);
        Some(payload)
    }

    /// Like [`Registry::close_slot`], but the caller takes the payload back
    /// itself. Refuses (and changes nothing) while a guard is alive.
    pub(crate) fn try_close_unborrowed(&mut self, id: SlotId) -> bool {
        if !self.is_live(id) || self.slots[id.index as usize].borrows > 0 {
            return false;
        }
        self.invalidate(id);
        self.free_slots.push(id.index);
        true
    }

    /// Returns the number of observers that were on the chain.
    fn invalidate(&mut self, id: SlotId) -> usize {
        debug_assert!(self.is_live(id));
        let slot = &mut self.slots[id.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.occupied = false;

        let mut observers = 0;
        let mut cur = slot.head.take();
        while let Some(index) = cur {
            let node = &mut self.nodes[index as usize];
            cur = node.next.take();
            node.back = None;
            observers += 1;
        }

        #[cfg(feature = "tracing")]
        trace!(slot = id.index, observers, "invalidated observers");
        observers
    }

    /// Registers a read guard. Fails if `id` is no longer live.
    pub(crate) fn acquire_borrow(&mut self, id: SlotId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        self.slots[id.index as usize].borrows += 1;
        true
    }

    /// Drops a read guard registration. Returns the parked payload if this
    /// was the last guard of a slot whose owner is already gone.
    pub(crate) fn release_borrow(&mut self, index: SlotIndex) -> Option<Parked> {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.borrows > 0);
        slot.borrows -= 1;
        if slot.borrows > 0 || slot.occupied {
            return None;
        }
        let parked = slot.parked.take();
        self.free_slots.push(index);
        parked
    }

    pub(crate) fn is_borrowed(&self, id: SlotId) -> bool {
        self.slots[id.index as usize].borrows > 0
    }

    /// Allocates a node and splices it in right after `source`.
    ///
    /// `source` must belong to a live chain.
    pub(crate) fn attach_after(&mut self, source: Back) -> NodeIndex {
        let index = self.alloc_node();

        let next = match source {
            Back::Owner(slot) => {
                let slot = &mut self.slots[slot as usize];
                debug_assert!(slot.occupied);
                slot.head.replace(index)
            }
            Back::Node(prev) => {
                let prev = &mut self.nodes[prev as usize];
                debug_assert!(prev.back.is_some());
                prev.next.replace(index)
            }
        };

        if let Some(next) = next {
            self.nodes[next as usize].back = Some(Back::Node(index));
        }

        let node = &mut self.nodes[index as usize];
        node.back = Some(source);
        node.next = next;
        index
    }

    /// Unlinks `index` from its chain, if it is on one.
    pub(crate) fn detach(&mut self, index: NodeIndex) {
        let node = &mut self.nodes[index as usize];
        let Some(back) = node.back.take() else {
            debug_assert!(node.next.is_none());
            return;
        };
        let next = node.next.take();

        match back {
            Back::Owner(slot) => self.slots[slot as usize].head = next,
            Back::Node(prev) => self.nodes[prev as usize].next = next,
        }
        if let Some(next) = next {
            self.nodes[next as usize].back = Some(back);
        }
    }

    /// Unlinks `index` and returns it to the free list.
    pub(crate) fn free_node(&mut self, index: NodeIndex) {
        self.detach(index);
        self.free_nodes.push(index);
    }

    /// Number of nodes on `id`'s chain. Walks the chain.
    pub(crate) fn chain_len(&self, id: SlotId) -> usize {
        if !self.is_live(id) {
            return 0;
        }
        let mut len = 0;
        let mut cur = self.slots[id.index as usize].head;
        while let Some(index) = cur {
            len += 1;
            cur = self.nodes[index as usize].next;
        }
        len
    }

    fn alloc_node(&mut self) -> NodeIndex {
        if let Some(index) = self.free_nodes.pop() {
            return index;
        }
        let index = next_index(self.nodes.len());
        self.nodes.push(Node::default());
        index
    }

    /// Checks every chain invariant. Test helper.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.occupied {
                assert!(slot.head.is_none(), "vacant slot {i} has observers");
                continue;
            }
            if let Some(head) = slot.head {
                assert_eq!(self.nodes[head as usize].back, Some(Back::Owner(i as SlotIndex)));
            }
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let i = i as NodeIndex;
            match node.back {
                None => assert!(node.next.is_none(), "unlinked node {i} has a successor"),
                Some(Back::Owner(slot)) => assert_eq!(self.slots[slot as usize].head, Some(i)),
                Some(Back::Node(prev)) => assert_eq!(self.nodes[prev as usize].next, Some(i)),
            }
            if let Some(next) = node.next {
                assert_eq!(self.nodes[next as usize].back, Some(Back::Node(i)));
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Parked payloads stay leaked: their guards may still be reading them.
        if self.slots.iter().any(|slot| slot.borrows > 0) {
            GUARDS_OUTLIVED_REGISTRY.with(|flag| flag.set(true));
        }
    }
}

fn next_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic_registry_overflow())
}

/// Asserts the invariants of this thread's registry.
#[cfg(test)]
pub(crate) fn assert_consistent() {
    with(|registry| registry.assert_consistent());
}
