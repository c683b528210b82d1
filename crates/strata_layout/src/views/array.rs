//! # Dynamic Array View
//!
//! Control block `{length, capacity, elements_ptr}` behind one pointer
//! slot. Growth doubles capacity from a minimum of 4 and is never in
//! place: a fresh region is allocated, element bytes are copied, the old
//! region is freed. Any element view held across a growing mutation is
//! invalid.

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{Heap, Ptr};

use super::structure::StructRef;
use super::value::{ElementType, Value};

/// Control block size: length + capacity + elements pointer.
const CTRL_SIZE: u32 = 12;
/// Capacity the first growth establishes.
const MIN_CAPACITY: u32 = 4;

const LEN_OFFSET: u32 = 0;
const CAP_OFFSET: u32 = 4;
const ELEMS_OFFSET: u32 = 8;

/// A dynamic array view bound to its owner's pointer slot.
#[derive(Clone, Debug)]
pub struct DynArray {
    /// Heap address of the owner's 4-byte pointer slot.
    slot: Ptr,
    /// Element behavior.
    element: ElementType,
}

impl DynArray {
    /// Binds a view to a pointer slot.
    #[must_use]
    pub fn new(slot: Ptr, element: ElementType) -> Self {
        Self { slot, element }
    }

    /// The element behavior this array was specialized with.
    #[must_use]
    pub fn element(&self) -> &ElementType {
        &self.element
    }

    fn ctrl(&self, heap: &Heap) -> Ptr {
        Ptr::new(heap.read(self.slot))
    }

    /// Number of elements. An array that was never allocated is empty,
    /// not an error.
    #[must_use]
    pub fn len(&self, heap: &Heap) -> u32 {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            0
        } else {
            heap.read(ctrl.add(LEN_OFFSET))
        }
    }

    /// True when the array holds no elements.
    #[must_use]
    pub fn is_empty(&self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    /// Current capacity in elements.
    #[must_use]
    pub fn capacity(&self, heap: &Heap) -> u32 {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            0
        } else {
            heap.read(ctrl.add(CAP_OFFSET))
        }
    }

    /// Heap address of the element at `index`, bounds-checked.
    #[must_use]
    pub fn element_at(&self, heap: &Heap, index: u32) -> Option<Ptr> {
        if index >= self.len(heap) {
            return None;
        }
        let ctrl = self.ctrl(heap);
        let elements = Ptr::new(heap.read(ctrl.add(ELEMS_OFFSET)));
        Some(elements.add(index * self.element.size()))
    }

    /// Reads the element at `index`; `None` out of bounds.
    #[must_use]
    pub fn get(&self, heap: &Heap, index: u32) -> Option<Value> {
        self.element_at(heap, index)
            .map(|at| self.element.read(heap, at))
    }

    /// A struct view over the element at `index`, for struct-element
    /// arrays.
    #[must_use]
    pub fn struct_at(&self, heap: &Heap, index: u32) -> Option<StructRef> {
        let at = self.element_at(heap, index)?;
        match &self.element {
            ElementType::Struct(layout) => Some(StructRef::new(at, layout.clone())),
            _ => None,
        }
    }

    /// Appends a value, growing the backing region when full.
    pub fn push(&self, heap: &mut Heap, value: &Value) -> LayoutResult<()> {
        let index = self.push_default(heap)?;
        let at = self
            .element_at(heap, index)
            .ok_or_else(|| LayoutError::TypeMismatch {
                context: "dyn_array".to_string(),
                expected: "a reachable freshly pushed slot",
            })?;
        self.element.write(heap, at, value)
    }

    /// Appends a zeroed element and returns its index. The caller
    /// initializes it in place (the struct-element path).
    pub fn push_default(&self, heap: &mut Heap) -> LayoutResult<u32> {
        let ctrl = self.ensure_ctrl(heap)?;
        let length: u32 = heap.read(ctrl.add(LEN_OFFSET));
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));

        if length >= capacity {
            self.grow(heap, ctrl, capacity)?;
        }

        let elements = Ptr::new(heap.read(ctrl.add(ELEMS_OFFSET)));
        let at = elements.add(length * self.element.size());
        heap.fill(at, self.element.size() as usize, 0);
        heap.write(ctrl.add(LEN_OFFSET), length + 1);
        Ok(length)
    }

    /// Removes and returns the last element. The element's dynamic
    /// payload is released; the backing region does not shrink.
    pub fn pop(&self, heap: &mut Heap) -> Option<Value> {
        let length = self.len(heap);
        if length == 0 {
            return None;
        }
        let ctrl = self.ctrl(heap);
        let at = self.element_at(heap, length - 1)?;
        let value = self.element.read(heap, at);
        self.element.free_dynamic(heap, at);
        heap.write(ctrl.add(LEN_OFFSET), length - 1);
        Some(value)
    }

    /// Index of the first element equal to `value`, by linear scan.
    #[must_use]
    pub fn index_of(&self, heap: &Heap, value: &Value) -> Option<u32> {
        let length = self.len(heap);
        (0..length).find(|&i| {
            self.element_at(heap, i)
                .is_some_and(|at| self.element.equals(heap, at, value))
        })
    }

    /// True when some element equals `value`.
    #[must_use]
    pub fn contains(&self, heap: &Heap, value: &Value) -> bool {
        self.index_of(heap, value).is_some()
    }

    /// Drops every element (releasing dynamic payloads) but keeps the
    /// backing region.
    pub fn clear(&self, heap: &mut Heap) {
        let length = self.len(heap);
        if length == 0 {
            return;
        }
        if self.element.is_dynamic() {
            for i in 0..length {
                if let Some(at) = self.element_at(heap, i) {
                    self.element.free_dynamic(heap, at);
                }
            }
        }
        let ctrl = self.ctrl(heap);
        heap.write(ctrl.add(LEN_OFFSET), 0u32);
    }

    /// Releases everything this array owns and nulls the owner slot.
    pub fn free(&self, heap: &mut Heap) {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return;
        }
        self.clear(heap);
        let elements = Ptr::new(heap.read(ctrl.add(ELEMS_OFFSET)));
        if !elements.is_null() {
            heap.free(elements);
        }
        heap.free(ctrl);
        heap.write(self.slot, Ptr::NULL.offset());
    }

    /// Deep-copies `source` into this array: clears self, then copies
    /// every source element by value (nested allocations included).
    pub fn copy_from(&self, heap: &mut Heap, source: &Self) -> LayoutResult<()> {
        self.clear(heap);
        let source_len = source.len(heap);
        for i in 0..source_len {
            let index = self.push_default(heap)?;
            let src = source
                .element_at(heap, i)
                .ok_or_else(|| LayoutError::TypeMismatch {
                    context: "dyn_array copy".to_string(),
                    expected: "a readable source element",
                })?;
            let dst = self
                .element_at(heap, index)
                .ok_or_else(|| LayoutError::TypeMismatch {
                    context: "dyn_array copy".to_string(),
                    expected: "a reachable destination element",
                })?;
            self.element.copy(heap, src, dst)?;
        }
        Ok(())
    }

    /// Collects every element into owned values, in array order.
    #[must_use]
    pub fn to_vec(&self, heap: &Heap) -> Vec<Value> {
        let length = self.len(heap);
        (0..length).filter_map(|i| self.get(heap, i)).collect()
    }

    fn ensure_ctrl(&self, heap: &mut Heap) -> LayoutResult<Ptr> {
        let ctrl = self.ctrl(heap);
        if !ctrl.is_null() {
            return Ok(ctrl);
        }
        let fresh = heap.allocate(CTRL_SIZE as usize, "dyn_array");
        if fresh.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "dyn_array",
                size: CTRL_SIZE as usize,
            });
        }
        heap.write(self.slot, fresh.offset());
        Ok(fresh)
    }

    /// Doubles the backing region. Never grows in place: allocate, copy,
    /// free the old region.
    fn grow(&self, heap: &mut Heap, ctrl: Ptr, capacity: u32) -> LayoutResult<()> {
        let new_capacity = (capacity * 2).max(MIN_CAPACITY);
        let stride = self.element.size();
        let fresh = heap.allocate((new_capacity * stride) as usize, "dyn_array_elements");
        if fresh.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "dyn_array_elements",
                size: (new_capacity * stride) as usize,
            });
        }

        let old = Ptr::new(heap.read(ctrl.add(ELEMS_OFFSET)));
        if !old.is_null() {
            let length: u32 = heap.read(ctrl.add(LEN_OFFSET));
            heap.copy(old, fresh, (length * stride) as usize);
            heap.free(old);
        }

        heap.write(ctrl.add(CAP_OFFSET), new_capacity);
        heap.write(ctrl.add(ELEMS_OFFSET), fresh.offset());
        tracing::trace!(new_capacity, "dyn_array grown");
        Ok(())
    }
}
