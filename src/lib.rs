//! Single-threaded owner/observer pointers.
//!
//! [`Observable<T>`] exclusively owns a heap value. Any number of
//! [`Observer<T>`]s may point at that value without keeping it alive: when the
//! owner is dropped, reset or assigned a new value, every observer of the old
//! value becomes empty instead of dangling. There are no atomic reference
//! counts and no shared control block; each thread keeps a small table that
//! maps owners to a generation and to the chain of their observers.
//!
//! ```
//! use core::cell::Cell;
//! use observable_ptr::Observable;
//!
//! let mut owner = Observable::new(Cell::new(0));
//! let a = owner.observe();
//! let b = a.clone();
//! assert_eq!(owner.observer_count(), 2);
//!
//! a.borrow().set(1);
//! assert_eq!(Cell::get(&owner), 1);
//!
//! owner.reset();
//! assert!(!a.is_valid() && !b.is_valid());
//! assert_eq!(owner.observer_count(), 0);
//! ```
//!
//! Ownership cannot be shared:
//!
//! ```compile_fail
//! fn assert_clone<T: Clone>() {}
//! assert_clone::<observable_ptr::Observable<i32>>();
//! ```
//!
//! Neither pointer may leave its thread:
//!
//! ```compile_fail
//! let observer = observable_ptr::Observable::new(1).observe();
//! std::thread::spawn(move || observer.is_valid());
//! ```
//!
//! ```compile_fail
//! let owner = observable_ptr::Observable::new(1);
//! std::thread::spawn(move || owner.is_valid());
//! ```
//!
//! A borrow cannot outlive its observer:
//!
//! ```compile_fail
//! let owner = observable_ptr::Observable::new(1);
//! let guard = {
//!     let observer = owner.observe();
//!     observer.borrow()
//! };
//! ```

#![warn(unsafe_op_in_unsafe_fn)]

mod observable;
mod observer;
mod panics;
mod registry;

pub use observable::Observable;
pub use observer::{Observer, Ref};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_size() {
        use core::mem::size_of;

        // payload pointer + slot index + generation
        assert_eq!(size_of::<Observable<i32>>(), 24);
        assert_eq!(
            size_of::<Observable<[u8; 64]>>(),
            size_of::<Observable<u8>>()
        );
        assert!(size_of::<Observer<i32>>() <= 4 * size_of::<u64>());
    }
}
