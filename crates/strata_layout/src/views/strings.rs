//! # Heap Strings
//!
//! A string is one allocation of `[len: u32][utf-8 bytes]`. The owner
//! stores a single pointer slot; the null sentinel reads as "no string".

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{Heap, Ptr};

use super::value::fnv1a;

/// Allocates a fresh string and returns its pointer.
pub fn alloc_string(heap: &mut Heap, s: &str) -> LayoutResult<Ptr> {
    let bytes = s.as_bytes();
    let ptr = heap.allocate(4 + bytes.len(), "str");
    if ptr.is_null() {
        return Err(LayoutError::OutOfMemory {
            owner: "str",
            size: 4 + bytes.len(),
        });
    }
    heap.write::<u32>(ptr, bytes.len() as u32);
    heap.write_bytes(ptr.add(4), bytes);
    Ok(ptr)
}

/// Reads a string's content; the null pointer reads as empty.
#[must_use]
pub fn read_string(heap: &Heap, ptr: Ptr) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let len = heap.read::<u32>(ptr) as usize;
    String::from_utf8_lossy(heap.bytes(ptr.add(4), len)).into_owned()
}

/// Frees a string allocation; no-op on the null pointer.
pub fn free_string(heap: &mut Heap, ptr: Ptr) {
    if !ptr.is_null() {
        heap.free(ptr);
    }
}

/// Compares a heap string's content with `other`.
#[must_use]
pub fn string_equals(heap: &Heap, ptr: Ptr, other: &str) -> bool {
    if ptr.is_null() {
        return other.is_empty();
    }
    let len = heap.read::<u32>(ptr) as usize;
    heap.bytes(ptr.add(4), len) == other.as_bytes()
}

/// Hashes a heap string's content; the null pointer hashes as empty.
#[must_use]
pub fn hash_string(heap: &Heap, ptr: Ptr) -> u32 {
    if ptr.is_null() {
        return fnv1a(&[]);
    }
    let len = heap.read::<u32>(ptr) as usize;
    fnv1a(heap.bytes(ptr.add(4), len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let mut heap = Heap::new(1024);
        let p = alloc_string(&mut heap, "ancient ruin").unwrap();
        assert_eq!(read_string(&heap, p), "ancient ruin");
        assert!(string_equals(&heap, p, "ancient ruin"));
        assert!(!string_equals(&heap, p, "ancient"));
        free_string(&mut heap, p);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn test_null_reads_empty() {
        let heap = Heap::new(256);
        assert_eq!(read_string(&heap, Ptr::NULL), "");
        assert!(string_equals(&heap, Ptr::NULL, ""));
    }
}
