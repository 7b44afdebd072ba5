//! Reference-counted heap object protocol.
//!
//! `Value`'s heap-backed variants (`Str`, `Array`, `HashMap`, `Function`)
//! are `Rc`-wrapped; `Rc::clone`/`drop` *are* `retain`/`release` — Rust's
//! ownership model gives us the "a refcount reaches zero exactly once"
//! invariant for free. What spec.md calls the "class equality/hash/destroy
//! protocol" is expressed here as ordinary trait impls (`PartialEq`, `Hash`)
//! per object kind instead of a hand-rolled vtable, since that is the
//! idiomatic Rust shape for the same dispatch.
//!
//! The live-object counter below exists purely to let the refcounting
//! testable property in spec.md §8 ("for a program that creates and
//! releases N objects, the live-object count at program end equals the
//! count before program start") be checked in tests, without imposing any
//! cost on a release build that never asked for it — mirroring how the
//! teacher gates its gas/coverage profiler behind `profile-gas`/
//! `profile-coverage` features rather than always paying for it.

#[cfg(feature = "debug-counters")]
use std::sync::atomic::{AtomicIsize, Ordering};

#[cfg(feature = "debug-counters")]
pub static LIVE_OBJECTS: AtomicIsize = AtomicIsize::new(0);

/// Returns the number of heap objects (strings, arrays, hashmaps,
/// closures/script functions) currently live. Always `0` unless built with
/// the `debug-counters` feature.
pub fn live_object_count() -> isize {
    #[cfg(feature = "debug-counters")]
    {
        LIVE_OBJECTS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "debug-counters"))]
    {
        0
    }
}

pub(crate) fn track_alloc() {
    #[cfg(feature = "debug-counters")]
    LIVE_OBJECTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn track_free() {
    #[cfg(feature = "debug-counters")]
    LIVE_OBJECTS.fetch_sub(1, Ordering::Relaxed);
}
