use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::panics::panic_empty_observer;
use crate::registry::{self, Back, NodeIndex, SlotId, SlotIndex};
use crate::Observable;

/// A non-owning pointer to the payload of an [`Observable`].
///
/// Observers never keep the payload alive. Once the owner drops or replaces
/// its payload, every observer of it reports [`is_valid`](Self::is_valid)
/// `false`.
///
/// Reading goes through a [`Ref`] guard. The payload is never freed while a
/// guard is alive; if the owner lets go of it in the meantime, the drop is
/// deferred to the last guard.
pub struct Observer<T> {
    link: Option<Link<T>>,
}

struct Link<T> {
    payload: NonNull<T>,
    slot: SlotId,
    // Invalidation unlinks the node but leaves it allocated; `detach`/`Drop`
    // returns it to the free list.
    node: NodeIndex,
}

impl<T> Link<T> {
    /// Splices a fresh node in right after `back`, if `slot` is still live.
    fn after(payload: NonNull<T>, slot: SlotId, back: Back) -> Option<Self> {
        registry::with(|r| {
            r.is_live(slot).then(|| Self {
                payload,
                slot,
                node: r.attach_after(back),
            })
        })
        .flatten()
    }

    fn is_live(&self) -> bool {
        registry::with(|r| r.is_live(self.slot)).unwrap_or(false)
    }
}

impl<T> Observer<T> {
    /// Creates an observer that observes nothing.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { link: None }
    }

    /// Whether the observed payload is still alive.
    #[must_use]
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_live)
    }

    /// Starts observing `owner`, detaching from whatever `self` observed
    /// before. If `owner` is empty, `self` ends up empty.
    pub fn attach(&mut self, owner: &Observable<T>) {
        self.detach();
        self.link = owner.owned().and_then(|owned| {
            Link::after(owned.payload, owned.slot, Back::Owner(owned.slot.index))
        });
    }

    /// Starts observing whatever `other` observes, right after it in the
    /// chain.
    pub fn attach_to(&mut self, other: &Self) {
        self.detach();
        self.link = other
            .link
            .as_ref()
            .and_then(|link| Link::after(link.payload, link.slot, Back::Node(link.node)));
    }

    /// Stops observing. The payload is not affected.
    pub fn detach(&mut self) {
        if let Some(link) = self.link.take() {
            registry::with(|r| r.free_node(link.node));
        }
    }

    /// Borrows the observed payload, or returns `None` if it is gone.
    #[must_use]
    pub fn try_borrow(&self) -> Option<Ref<'_, T>> {
        let link = self.link.as_ref()?;
        if !registry::with(|r| r.acquire_borrow(link.slot)).unwrap_or(false) {
            return None;
        }
        Some(Ref {
            // SAFETY: the slot is live, so the payload is allocated, and the
            // registered borrow keeps it allocated until the guard drops.
            // Owners only ever hand out shared references.
            value: unsafe { link.payload.as_ref() },
            slot: link.slot.index,
            _not_send: PhantomData,
        })
    }

    /// Borrows the observed payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload is gone. Check [`is_valid`](Self::is_valid) or
    /// use [`try_borrow`](Self::try_borrow) instead.
    #[track_caller]
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.try_borrow() {
            Some(value) => value,
            None => panic_empty_observer(),
        }
    }

    /// Runs `f` on the observed payload, if it is still alive.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.try_borrow().map(|value| f(&value))
    }

    /// Whether `self` currently observes the payload of `owner`.
    #[must_use]
    pub fn is_observing(&self, owner: &Observable<T>) -> bool {
        match (&self.link, owner.owned()) {
            (Some(link), Some(owned)) => link.slot == owned.slot && link.is_live(),
            _ => false,
        }
    }

    /// Whether both observers currently observe the same payload.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.link, &other.link) {
            (Some(a), Some(b)) => a.slot == b.slot && a.is_live(),
            _ => false,
        }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self::from(self)
    }

    fn clone_from(&mut self, source: &Self) {
        self.attach_to(source);
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<&Observable<T>> for Observer<T> {
    fn from(owner: &Observable<T>) -> Self {
        let mut observer = Self::new();
        observer.attach(owner);
        observer
    }
}

impl<T> From<&Observer<T>> for Observer<T> {
    fn from(other: &Observer<T>) -> Self {
        let mut observer = Self::new();
        observer.attach_to(other);
        observer
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// A shared borrow of an observed payload, handed out by
/// [`Observer::borrow`] and [`Observer::try_borrow`].
pub struct Ref<'a, T> {
    value: &'a T,
    slot: SlotIndex,
    // The registration lives in a thread-local.
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for Ref<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> Drop for Ref<'_, T> {
    fn drop(&mut self) {
        if let Some(Some(payload)) = registry::with(|r| r.release_borrow(self.slot)) {
            payload.release();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}
