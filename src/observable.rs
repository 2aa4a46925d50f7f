use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::panics::panic_empty_owner;
use crate::registry::{self, Parked, SlotId};
use crate::Observer;

/// An exclusively owning pointer whose [`Observer`]s become empty instead of
/// dangling once the payload is released.
///
/// `Observable` is move-only. Moving it (including [`take`](Self::take) and
/// [`swap`](Self::swap)) never touches its observers: they keep observing the
/// payload wherever its owner goes.
///
/// ```
/// use observable_ptr::{Observable, Observer};
///
/// let mut owner = Observable::new(7);
/// let observer = Observer::from(&owner);
/// assert_eq!(*observer.borrow(), 7);
///
/// owner.reset();
/// assert!(!observer.is_valid());
/// ```
pub struct Observable<T> {
    // Invariant: `Some` iff the payload is present. The payload came from
    // `Box::leak` and its slot is live in this thread's registry.
    inner: Option<Owned<T>>,
    _marker: PhantomData<T>,
}

pub(crate) struct Owned<T> {
    pub(crate) payload: NonNull<T>,
    pub(crate) slot: SlotId,
}

impl<T> Owned<T> {
    #[track_caller]
    fn adopt(boxed: Box<T>) -> Self {
        let slot = registry::open_slot();
        Self {
            payload: NonNull::from(Box::leak(boxed)),
            slot,
        }
    }
}

impl<T> Observable<T> {
    /// Creates an owner without a payload.
    #[must_use]
    #[inline]
    pub const fn empty() -> Self {
        Self {
            inner: None,
            _marker: PhantomData,
        }
    }

    /// Allocates `value` on the heap and takes ownership of it.
    #[must_use]
    #[track_caller]
    pub fn new(value: T) -> Self {
        Self::from(Box::new(value))
    }

    #[must_use]
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the payload stays allocated for as long as `self` owns it,
        // and releasing it requires `&mut self`.
        self.inner.as_ref().map(|owned| unsafe { owned.payload.as_ref() })
    }

    /// Creates an observer of this owner.
    #[must_use]
    #[inline]
    pub fn observe(&self) -> Observer<T> {
        Observer::from(self)
    }

    /// Number of observers currently attached.
    ///
    /// Walks the whole chain; meant for diagnostics and tests.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        match &self.inner {
            Some(owned) => registry::with(|r| r.chain_len(owned.slot)).unwrap_or(0),
            None => 0,
        }
    }

    /// Releases the current payload, if any, and takes ownership of `boxed`.
    ///
    /// Observers of the old payload become empty; the new payload starts out
    /// with no observers.
    #[track_caller]
    pub fn assign(&mut self, boxed: Box<T>) {
        self.reset();
        self.inner = Some(Owned::adopt(boxed));
    }

    #[track_caller]
    pub fn assign_value(&mut self, value: T) {
        self.assign(Box::new(value));
    }

    /// Releases the payload, leaving `self` empty.
    ///
    /// Every observer becomes empty before the payload is dropped, so a
    /// payload destructor sees its observers as empty. If some observer is
    /// being borrowed, the drop is deferred until the last
    /// [`Ref`](crate::Ref) goes away.
    ///
    /// At thread exit, after this thread's registry is gone, the payload is
    /// still dropped. It is leaked only if guards were alive when the
    /// registry went away.
    pub fn reset(&mut self) {
        let Some(owned) = self.inner.take() else {
            return;
        };
        // SAFETY: the payload came from `Box::leak` and `self` no longer
        // refers to it.
        let payload = unsafe { Parked::new(owned.payload) };
        registry::release(owned.slot, payload);
    }

    /// Moves the payload and all of its observers out, leaving `self` empty.
    #[must_use]
    #[inline]
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Exchanges payloads (and observers) with `other`.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.inner, &mut other.inner);
    }

    /// Moves the payload out of the owner. Observers become empty.
    ///
    /// Fails if `self` is empty or if an observer is being borrowed.
    pub fn try_unwrap(mut self) -> Result<T, Self> {
        let closed = match &self.inner {
            Some(owned) => {
                registry::with(|r| r.try_close_unborrowed(owned.slot)).unwrap_or(false)
            }
            None => false,
        };
        match self.inner.take() {
            // SAFETY: the payload came from `Box::leak` and its slot is closed,
            // so no observer can reach it any more.
            Some(owned) if closed => Ok(*unsafe { Box::from_raw(owned.payload.as_ptr()) }),
            inner => {
                self.inner = inner;
                Err(self)
            }
        }
    }

    /// Whether some observer currently holds a [`Ref`](crate::Ref) into the
    /// payload.
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        match &self.inner {
            Some(owned) => registry::with(|r| r.is_borrowed(owned.slot)).unwrap_or(false),
            None => false,
        }
    }

    #[inline]
    pub(crate) fn owned(&self) -> Option<&Owned<T>> {
        self.inner.as_ref()
    }
}

impl<T> Deref for Observable<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic_empty_owner(),
        }
    }
}

impl<T> Drop for Observable<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Box<T>> for Observable<T> {
    #[track_caller]
    fn from(boxed: Box<T>) -> Self {
        Self {
            inner: Some(Owned::adopt(boxed)),
            _marker: PhantomData,
        }
    }
}

impl<T> From<Option<Box<T>>> for Observable<T> {
    #[track_caller]
    fn from(boxed: Option<Box<T>>) -> Self {
        boxed.map_or_else(Self::empty, Self::from)
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}
