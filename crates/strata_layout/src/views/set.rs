//! # Dynamic Hash Set View
//!
//! The map structure with no value region: membership is the key's own
//! presence. Same bucket array, same chaining, same growth policy.

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{align_up, Heap, Ptr};

use super::value::{ElementType, Value};

const CTRL_SIZE: u32 = 12;
const COUNT_OFFSET: u32 = 0;
const CAP_OFFSET: u32 = 4;
const BUCKETS_OFFSET: u32 = 8;

const INITIAL_BUCKETS: u32 = 8;

/// A dynamic hash set view bound to its owner's pointer slot.
#[derive(Clone, Debug)]
pub struct DynSet {
    slot: Ptr,
    element: ElementType,
}

impl DynSet {
    /// Binds a view to a pointer slot.
    #[must_use]
    pub fn new(slot: Ptr, element: ElementType) -> Self {
        Self { slot, element }
    }

    fn key_offset(&self) -> u32 {
        align_up(4, self.element.alignment())
    }

    fn node_size(&self) -> u32 {
        self.key_offset() + self.element.size()
    }

    fn ctrl(&self, heap: &Heap) -> Ptr {
        Ptr::new(heap.read(self.slot))
    }

    /// Number of members; a never-allocated set is empty.
    #[must_use]
    pub fn len(&self, heap: &Heap) -> u32 {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            0
        } else {
            heap.read(ctrl.add(COUNT_OFFSET))
        }
    }

    /// True when the set has no members.
    #[must_use]
    pub fn is_empty(&self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    /// True when `value` is a member.
    pub fn contains(&self, heap: &Heap, value: &Value) -> LayoutResult<bool> {
        Ok(self.find_node(heap, value)?.is_some())
    }

    /// Inserts `value`; returns `false` when it was already present.
    pub fn insert(&self, heap: &mut Heap, value: &Value) -> LayoutResult<bool> {
        if self.find_node(heap, value)?.is_some() {
            return Ok(false);
        }
        let hash = self.element.hash_value(value)?;

        let ctrl = self.ensure_ctrl(heap)?;
        let count: u32 = heap.read(ctrl.add(COUNT_OFFSET));
        let mut capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));

        if (count + 1) * 4 > capacity * 3 {
            self.grow_and_rehash(heap, ctrl)?;
            capacity = heap.read(ctrl.add(CAP_OFFSET));
        }

        let node = heap.allocate(self.node_size() as usize, "set_node");
        if node.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "set_node",
                size: self.node_size() as usize,
            });
        }
        if let Err(error) = self.element.write(heap, node.add(self.key_offset()), value) {
            heap.free(node);
            return Err(error);
        }

        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let bucket_at = buckets.add((hash & (capacity - 1)) * 4);
        let head: u32 = heap.read(bucket_at);
        heap.write(node, head);
        heap.write(bucket_at, node.offset());
        heap.write(ctrl.add(COUNT_OFFSET), count + 1);
        Ok(true)
    }

    /// Removes `value`; returns `false` when it was not a member.
    pub fn remove(&self, heap: &mut Heap, value: &Value) -> LayoutResult<bool> {
        let Some((node, prev, bucket)) = self.find_node(heap, value)? else {
            return Ok(false);
        };
        let ctrl = self.ctrl(heap);
        let next: u32 = heap.read(Ptr::new(node));
        if prev != 0 {
            heap.write(Ptr::new(prev), next);
        } else {
            let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
            heap.write(buckets.add(bucket * 4), next);
        }

        self.element
            .free_dynamic(heap, Ptr::new(node + self.key_offset()));
        heap.free(Ptr::new(node));

        let count: u32 = heap.read(ctrl.add(COUNT_OFFSET));
        heap.write(ctrl.add(COUNT_OFFSET), count - 1);
        Ok(true)
    }

    /// Drops every member but keeps the bucket array.
    pub fn clear(&self, heap: &mut Heap) {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return;
        }
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        for bucket in 0..capacity {
            let mut node: u32 = heap.read(buckets.add(bucket * 4));
            while node != 0 {
                let next: u32 = heap.read(Ptr::new(node));
                self.element
                    .free_dynamic(heap, Ptr::new(node + self.key_offset()));
                heap.free(Ptr::new(node));
                node = next;
            }
            heap.write(buckets.add(bucket * 4), 0u32);
        }
        heap.write(ctrl.add(COUNT_OFFSET), 0u32);
    }

    /// Releases everything the set owns and nulls the owner slot.
    pub fn free(&self, heap: &mut Heap) {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return;
        }
        self.clear(heap);
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        if !buckets.is_null() {
            heap.free(buckets);
        }
        heap.free(ctrl);
        heap.write(self.slot, Ptr::NULL.offset());
    }

    /// Collects the members in unspecified order.
    #[must_use]
    pub fn items(&self, heap: &Heap) -> Vec<Value> {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return Vec::new();
        }
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let mut out = Vec::new();
        for bucket in 0..capacity {
            let mut node: u32 = heap.read(buckets.add(bucket * 4));
            while node != 0 {
                out.push(self.element.read(heap, Ptr::new(node + self.key_offset())));
                node = heap.read(Ptr::new(node));
            }
        }
        out
    }

    /// Deep-copies `source` into this set.
    pub fn copy_from(&self, heap: &mut Heap, source: &Self) -> LayoutResult<()> {
        self.clear(heap);
        for item in source.items(heap) {
            self.insert(heap, &item)?;
        }
        Ok(())
    }

    fn find_node(&self, heap: &Heap, value: &Value) -> LayoutResult<Option<(u32, u32, u32)>> {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return Ok(None);
        }
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let hash = self.element.hash_value(value)?;
        let bucket = hash & (capacity - 1);

        let mut prev = 0u32;
        let mut node: u32 = heap.read(buckets.add(bucket * 4));
        while node != 0 {
            if self
                .element
                .equals(heap, Ptr::new(node + self.key_offset()), value)
            {
                return Ok(Some((node, prev, bucket)));
            }
            prev = node;
            node = heap.read(Ptr::new(node));
        }
        Ok(None)
    }

    fn ensure_ctrl(&self, heap: &mut Heap) -> LayoutResult<Ptr> {
        let ctrl = self.ctrl(heap);
        if !ctrl.is_null() {
            return Ok(ctrl);
        }
        let fresh = heap.allocate(CTRL_SIZE as usize, "dyn_set");
        if fresh.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "dyn_set",
                size: CTRL_SIZE as usize,
            });
        }
        let buckets = heap.allocate((INITIAL_BUCKETS * 4) as usize, "set_buckets");
        if buckets.is_null() {
            heap.free(fresh);
            return Err(LayoutError::OutOfMemory {
                owner: "set_buckets",
                size: (INITIAL_BUCKETS * 4) as usize,
            });
        }
        heap.write(fresh.add(COUNT_OFFSET), 0u32);
        heap.write(fresh.add(CAP_OFFSET), INITIAL_BUCKETS);
        heap.write(fresh.add(BUCKETS_OFFSET), buckets.offset());
        heap.write(self.slot, fresh.offset());
        Ok(fresh)
    }

    fn grow_and_rehash(&self, heap: &mut Heap, ctrl: Ptr) -> LayoutResult<()> {
        let old_capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let old_buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let new_capacity = old_capacity * 2;

        let new_buckets = heap.allocate((new_capacity * 4) as usize, "set_buckets");
        if new_buckets.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "set_buckets",
                size: (new_capacity * 4) as usize,
            });
        }

        for bucket in 0..old_capacity {
            let mut node: u32 = heap.read(old_buckets.add(bucket * 4));
            while node != 0 {
                let next: u32 = heap.read(Ptr::new(node));
                let hash = self
                    .element
                    .hash_at(heap, Ptr::new(node + self.key_offset()));
                let target = new_buckets.add((hash & (new_capacity - 1)) * 4);
                let head: u32 = heap.read(target);
                heap.write(Ptr::new(node), head);
                heap.write(target, node);
                node = next;
            }
        }

        heap.free(old_buckets);
        heap.write(ctrl.add(CAP_OFFSET), new_capacity);
        heap.write(ctrl.add(BUCKETS_OFFSET), new_buckets.offset());
        tracing::trace!(new_capacity, "dyn_set rehashed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Primitive;

    fn set_fixture(heap: &mut Heap, element: ElementType) -> DynSet {
        let slot = heap.allocate(4, "slot");
        DynSet::new(slot, element)
    }

    #[test]
    fn test_insert_contains_remove() {
        let mut heap = Heap::new(8192);
        let set = set_fixture(&mut heap, ElementType::Primitive(Primitive::U32));

        assert!(set.insert(&mut heap, &Value::U32(4)).unwrap());
        assert!(!set.insert(&mut heap, &Value::U32(4)).unwrap());
        assert!(set.contains(&heap, &Value::U32(4)).unwrap());
        assert_eq!(set.len(&heap), 1);

        assert!(set.remove(&mut heap, &Value::U32(4)).unwrap());
        assert!(!set.contains(&heap, &Value::U32(4)).unwrap());
        assert_eq!(set.len(&heap), 0);
    }

    #[test]
    fn test_membership_survives_rehash() {
        let mut heap = Heap::new(64 * 1024);
        let set = set_fixture(&mut heap, ElementType::Primitive(Primitive::U32));

        for i in 0..50u32 {
            set.insert(&mut heap, &Value::U32(i * 11)).unwrap();
        }
        for i in 0..50u32 {
            assert!(set.contains(&heap, &Value::U32(i * 11)).unwrap());
        }
        assert!(!set.contains(&heap, &Value::U32(3)).unwrap());
    }

    #[test]
    fn test_string_set_frees_cleanly() {
        let mut heap = Heap::new(16 * 1024);
        let set = set_fixture(&mut heap, ElementType::Str);

        set.insert(&mut heap, &Value::Str("oak".into())).unwrap();
        set.insert(&mut heap, &Value::Str("ash".into())).unwrap();
        assert!(set.contains(&heap, &Value::Str("oak".into())).unwrap());

        set.free(&mut heap);
        assert_eq!(heap.live_allocations(), 1);
    }
}
