#[cold]
#[track_caller]
pub fn panic_empty_owner() -> ! {
    panic!("dereferenced an empty `Observable`");
}

#[cold]
#[track_caller]
pub fn panic_empty_observer() -> ! {
    panic!("borrowed an `Observer` that observes nothing");
}

#[cold]
#[track_caller]
pub fn panic_registry_overflow() -> ! {
    panic!("observable registry overflow");
}

#[cold]
#[track_caller]
pub fn panic_registry_destroyed() -> ! {
    panic!("created an `Observable` after its thread's registry was destroyed");
}
