//! # Memory Subsystem
//!
//! The engine heap: one contiguous byte buffer with a TLSF-style
//! segregated free-list allocator on top. Every dynamic container in the
//! runtime view layer allocates and frees through it.

mod heap;

pub use heap::{align_up, Heap, Ptr};
