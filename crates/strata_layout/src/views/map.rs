//! # Dynamic Hash Map View
//!
//! Separate chaining over a power-of-two bucket array. Control block
//! `{count, capacity_buckets, buckets_ptr}` behind one pointer slot;
//! each entry is its own node allocation `[next | key | value]` linked
//! at its bucket head (LIFO - a new entry becomes the head). Growth
//! doubles the bucket array at load factor > 0.75 and relinks the
//! existing nodes; entries are never copied.
//!
//! Iteration order is bucket-index-then-chain order and changes after
//! any rehash. It is deliberately unspecified.

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{align_up, Heap, Ptr};

use super::structure::StructRef;
use super::value::{ElementType, Value};

const CTRL_SIZE: u32 = 12;
const COUNT_OFFSET: u32 = 0;
const CAP_OFFSET: u32 = 4;
const BUCKETS_OFFSET: u32 = 8;

/// Bucket count established on first insert. Always a power of two.
const INITIAL_BUCKETS: u32 = 8;

struct FoundNode {
    node: u32,
    prev: u32,
    bucket: u32,
}

/// A dynamic hash map view bound to its owner's pointer slot.
#[derive(Clone, Debug)]
pub struct DynMap {
    slot: Ptr,
    key: ElementType,
    value: ElementType,
}

impl DynMap {
    /// Binds a view to a pointer slot.
    #[must_use]
    pub fn new(slot: Ptr, key: ElementType, value: ElementType) -> Self {
        Self { slot, key, value }
    }

    /// Byte offset of the key region inside a node.
    fn key_offset(&self) -> u32 {
        align_up(4, self.key.alignment())
    }

    /// Byte offset of the value region inside a node.
    fn value_offset(&self) -> u32 {
        align_up(self.key_offset() + self.key.size(), self.value.alignment())
    }

    fn node_size(&self) -> u32 {
        self.value_offset() + self.value.size()
    }

    fn ctrl(&self, heap: &Heap) -> Ptr {
        Ptr::new(heap.read(self.slot))
    }

    /// Number of entries; a never-allocated map is empty.
    #[must_use]
    pub fn len(&self, heap: &Heap) -> u32 {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            0
        } else {
            heap.read(ctrl.add(COUNT_OFFSET))
        }
    }

    /// True when the map holds no entries.
    #[must_use]
    pub fn is_empty(&self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    /// Current bucket count.
    #[must_use]
    pub fn bucket_capacity(&self, heap: &Heap) -> u32 {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            0
        } else {
            heap.read(ctrl.add(CAP_OFFSET))
        }
    }

    /// Reads the value stored under `key`.
    pub fn get(&self, heap: &Heap, key: &Value) -> LayoutResult<Option<Value>> {
        Ok(self
            .find_node(heap, key)?
            .map(|f| self.value.read(heap, Ptr::new(f.node + self.value_offset()))))
    }

    /// Heap address of the value slot under `key`, when present.
    pub fn value_ptr(&self, heap: &Heap, key: &Value) -> LayoutResult<Option<Ptr>> {
        Ok(self
            .find_node(heap, key)?
            .map(|f| Ptr::new(f.node + self.value_offset())))
    }

    /// A struct view over the value under `key`, for struct-valued maps.
    pub fn struct_value(&self, heap: &Heap, key: &Value) -> LayoutResult<Option<StructRef>> {
        let Some(at) = self.value_ptr(heap, key)? else {
            return Ok(None);
        };
        match &self.value {
            ElementType::Struct(layout) => Ok(Some(StructRef::new(at, layout.clone()))),
            _ => Err(LayoutError::TypeMismatch {
                context: "map value".to_string(),
                expected: "a struct-valued map",
            }),
        }
    }

    /// True when `key` has an entry.
    pub fn contains_key(&self, heap: &Heap, key: &Value) -> LayoutResult<bool> {
        Ok(self.find_node(heap, key)?.is_some())
    }

    /// Inserts or replaces the value under `key`. Replacement frees the
    /// old value's dynamic payload in place; insertion links a new node
    /// at its bucket head.
    pub fn set(&self, heap: &mut Heap, key: &Value, value: &Value) -> LayoutResult<()> {
        let value_at = self.emplace(heap, key)?;
        self.value.free_dynamic(heap, value_at);
        self.value.write(heap, value_at, value)
    }

    /// Returns a live value slot for `key`, inserting a zeroed entry if
    /// absent. Lets callers initialize structured values in place
    /// without a temporary.
    pub fn emplace(&self, heap: &mut Heap, key: &Value) -> LayoutResult<Ptr> {
        if let Some(found) = self.find_node(heap, key)? {
            return Ok(Ptr::new(found.node + self.value_offset()));
        }
        let hash = self.key.hash_value(key)?;
        let node = self.prepare_node(heap)?;
        if let Err(error) = self.key.write(heap, node.add(self.key_offset()), key) {
            heap.free(node);
            return Err(error);
        }
        self.link_node(heap, node, hash);
        Ok(node.add(self.value_offset()))
    }

    /// Removes the entry under `key`: unlink, free the key's owned
    /// allocation and the value's dynamic payload, free the node.
    pub fn remove(&self, heap: &mut Heap, key: &Value) -> LayoutResult<bool> {
        let Some(found) = self.find_node(heap, key)? else {
            return Ok(false);
        };
        let ctrl = self.ctrl(heap);
        let next = self.node_next(heap, found.node);
        if found.prev != 0 {
            self.set_node_next(heap, found.prev, next);
        } else {
            let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
            heap.write(buckets.add(found.bucket * 4), next);
        }

        self.key.free_dynamic(heap, Ptr::new(found.node + self.key_offset()));
        self.value
            .free_dynamic(heap, Ptr::new(found.node + self.value_offset()));
        heap.free(Ptr::new(found.node));

        let count: u32 = heap.read(ctrl.add(COUNT_OFFSET));
        heap.write(ctrl.add(COUNT_OFFSET), count - 1);
        Ok(true)
    }

    /// Drops every entry but keeps the bucket array.
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
                let next = self.node_next(heap, node);
                self.key.free_dynamic(heap, Ptr::new(node + self.key_offset()));
                self.value
                    .free_dynamic(heap, Ptr::new(node + self.value_offset()));
                heap.free(Ptr::new(node));
                node = next;
            }
            heap.write(buckets.add(bucket * 4), 0u32);
        }
        heap.write(ctrl.add(COUNT_OFFSET), 0u32);
    }

    /// Releases everything the map owns and nulls the owner slot.
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

    /// Collects (key, value) pairs in unspecified order.
    #[must_use]
    pub fn entries(&self, heap: &Heap) -> Vec<(Value, Value)> {
        self.collect_nodes(heap)
            .into_iter()
            .map(|node| {
                (
                    self.key.read(heap, Ptr::new(node + self.key_offset())),
                    self.value.read(heap, Ptr::new(node + self.value_offset())),
                )
            })
            .collect()
    }

    /// Collects keys in unspecified order.
    #[must_use]
    pub fn keys(&self, heap: &Heap) -> Vec<Value> {
        self.collect_nodes(heap)
            .into_iter()
            .map(|node| self.key.read(heap, Ptr::new(node + self.key_offset())))
            .collect()
    }

    /// Collects values in unspecified order.
    #[must_use]
    pub fn values(&self, heap: &Heap) -> Vec<Value> {
        self.collect_nodes(heap)
            .into_iter()
            .map(|node| self.value.read(heap, Ptr::new(node + self.value_offset())))
            .collect()
    }

    /// Deep-copies `source` into this map: clears self, then re-inserts
    /// every source entry by value.
    pub fn copy_from(&self, heap: &mut Heap, source: &Self) -> LayoutResult<()> {
        self.clear(heap);
        for src_node in source.collect_nodes(heap) {
            let src_key = Ptr::new(src_node + source.key_offset());
            let src_value = Ptr::new(src_node + source.value_offset());
            let hash = self.key.hash_at(heap, src_key);

            let node = self.prepare_node(heap)?;
            let copied = self
                .key
                .copy(heap, src_key, node.add(self.key_offset()))
                .and_then(|()| {
                    self.value
                        .copy(heap, src_value, node.add(self.value_offset()))
                });
            if let Err(error) = copied {
                self.key.free_dynamic(heap, node.add(self.key_offset()));
                self.value.free_dynamic(heap, node.add(self.value_offset()));
                heap.free(node);
                return Err(error);
            }
            self.link_node(heap, node, hash);
        }
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn node_next(&self, heap: &Heap, node: u32) -> u32 {
        heap.read(Ptr::new(node))
    }

    fn set_node_next(&self, heap: &mut Heap, node: u32, next: u32) {
        heap.write(Ptr::new(node), next);
    }

    fn collect_nodes(&self, heap: &Heap) -> Vec<u32> {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return Vec::new();
        }
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let mut nodes = Vec::new();
        for bucket in 0..capacity {
            let mut node: u32 = heap.read(buckets.add(bucket * 4));
            while node != 0 {
                nodes.push(node);
                node = self.node_next(heap, node);
            }
        }
        nodes
    }

    fn find_node(&self, heap: &Heap, key: &Value) -> LayoutResult<Option<FoundNode>> {
        let ctrl = self.ctrl(heap);
        if ctrl.is_null() {
            return Ok(None);
        }
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let hash = self.key.hash_value(key)?;
        let bucket = hash & (capacity - 1);

        let mut prev = 0u32;
        let mut node: u32 = heap.read(buckets.add(bucket * 4));
        while node != 0 {
            if self
                .key
                .equals(heap, Ptr::new(node + self.key_offset()), key)
            {
                return Ok(Some(FoundNode { node, prev, bucket }));
            }
            prev = node;
            node = self.node_next(heap, node);
        }
        Ok(None)
    }

    fn ensure_ctrl(&self, heap: &mut Heap) -> LayoutResult<Ptr> {
        let ctrl = self.ctrl(heap);
        if !ctrl.is_null() {
            return Ok(ctrl);
        }
        let fresh = heap.allocate(CTRL_SIZE as usize, "dyn_map");
        if fresh.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "dyn_map",
                size: CTRL_SIZE as usize,
            });
        }
        let buckets = heap.allocate((INITIAL_BUCKETS * 4) as usize, "map_buckets");
        if buckets.is_null() {
            heap.free(fresh);
            return Err(LayoutError::OutOfMemory {
                owner: "map_buckets",
                size: (INITIAL_BUCKETS * 4) as usize,
            });
        }
        heap.write(fresh.add(COUNT_OFFSET), 0u32);
        heap.write(fresh.add(CAP_OFFSET), INITIAL_BUCKETS);
        heap.write(fresh.add(BUCKETS_OFFSET), buckets.offset());
        heap.write(self.slot, fresh.offset());
        Ok(fresh)
    }

    /// Allocates a zeroed node, growing the bucket array first when the
    /// load factor would cross 0.75. The node is not linked yet; the
    /// caller fills the key and hands it to [`Self::link_node`].
    fn prepare_node(&self, heap: &mut Heap) -> LayoutResult<Ptr> {
        let ctrl = self.ensure_ctrl(heap)?;
        let count: u32 = heap.read(ctrl.add(COUNT_OFFSET));
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));

        if (count + 1) * 4 > capacity * 3 {
            self.grow_and_rehash(heap, ctrl)?;
        }

        let node = heap.allocate(self.node_size() as usize, "map_node");
        if node.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "map_node",
                size: self.node_size() as usize,
            });
        }
        Ok(node)
    }

    /// Links a prepared node at its bucket head (new entries become the
    /// head, not the tail) and counts it.
    fn link_node(&self, heap: &mut Heap, node: Ptr, hash: u32) {
        let ctrl = self.ctrl(heap);
        let count: u32 = heap.read(ctrl.add(COUNT_OFFSET));
        let capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));

        let buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let bucket_at = buckets.add((hash & (capacity - 1)) * 4);
        let head: u32 = heap.read(bucket_at);
        self.set_node_next(heap, node.offset(), head);
        heap.write(bucket_at, node.offset());
        heap.write(ctrl.add(COUNT_OFFSET), count + 1);
    }

    /// Doubles the bucket array and relinks every node into its new
    /// bucket. Nodes keep their allocations; no key or value is copied.
    fn grow_and_rehash(&self, heap: &mut Heap, ctrl: Ptr) -> LayoutResult<()> {
        let old_capacity: u32 = heap.read(ctrl.add(CAP_OFFSET));
        let old_buckets = Ptr::new(heap.read(ctrl.add(BUCKETS_OFFSET)));
        let new_capacity = old_capacity * 2;

        let new_buckets = heap.allocate((new_capacity * 4) as usize, "map_buckets");
        if new_buckets.is_null() {
            return Err(LayoutError::OutOfMemory {
                owner: "map_buckets",
                size: (new_capacity * 4) as usize,
            });
        }

        for bucket in 0..old_capacity {
            let mut node: u32 = heap.read(old_buckets.add(bucket * 4));
            while node != 0 {
                let next = self.node_next(heap, node);
                let hash = self.key.hash_at(heap, Ptr::new(node + self.key_offset()));
                let target = new_buckets.add((hash & (new_capacity - 1)) * 4);
                let head: u32 = heap.read(target);
                self.set_node_next(heap, node, head);
                heap.write(target, node);
                node = next;
            }
        }

        heap.free(old_buckets);
        heap.write(ctrl.add(CAP_OFFSET), new_capacity);
        heap.write(ctrl.add(BUCKETS_OFFSET), new_buckets.offset());
        tracing::trace!(new_capacity, "dyn_map rehashed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Primitive;

    fn map_fixture(heap: &mut Heap, key: ElementType, value: ElementType) -> DynMap {
        let slot = heap.allocate(4, "slot");
        DynMap::new(slot, key, value)
    }

    #[test]
    fn test_empty_map() {
        let mut heap = Heap::new(512);
        let map = map_fixture(
            &mut heap,
            ElementType::Primitive(Primitive::U32),
            ElementType::Primitive(Primitive::U64),
        );
        assert_eq!(map.len(&heap), 0);
        assert_eq!(map.get(&heap, &Value::U32(1)).unwrap(), None);
    }

    #[test]
    fn test_set_get_replace() {
        let mut heap = Heap::new(4096);
        let map = map_fixture(
            &mut heap,
            ElementType::Primitive(Primitive::U32),
            ElementType::Primitive(Primitive::U64),
        );

        map.set(&mut heap, &Value::U32(7), &Value::U64(70)).unwrap();
        map.set(&mut heap, &Value::U32(8), &Value::U64(80)).unwrap();
        assert_eq!(map.len(&heap), 2);
        assert_eq!(map.get(&heap, &Value::U32(7)).unwrap(), Some(Value::U64(70)));

        // Replacing writes in place, not a second entry.
        map.set(&mut heap, &Value::U32(7), &Value::U64(71)).unwrap();
        assert_eq!(map.len(&heap), 2);
        assert_eq!(map.get(&heap, &Value::U32(7)).unwrap(), Some(Value::U64(71)));
    }

    #[test]
    fn test_rehash_preserves_every_entry() {
        let mut heap = Heap::new(64 * 1024);
        let map = map_fixture(
            &mut heap,
            ElementType::Primitive(Primitive::U32),
            ElementType::Primitive(Primitive::U32),
        );

        // 8 buckets grow at >6, then >12, then >24: 40 entries crosses
        // at least two rehashes.
        for i in 0..40u32 {
            map.set(&mut heap, &Value::U32(i), &Value::U32(i * 2)).unwrap();
        }
        assert!(map.bucket_capacity(&heap) >= 32);
        for i in 0..40u32 {
            assert_eq!(
                map.get(&heap, &Value::U32(i)).unwrap(),
                Some(Value::U32(i * 2)),
                "key {i} lost after rehash"
            );
        }
    }

    #[test]
    fn test_remove_unlinks_and_frees() {
        let mut heap = Heap::new(8192);
        let map = map_fixture(
            &mut heap,
            ElementType::Primitive(Primitive::U16),
            ElementType::Primitive(Primitive::U16),
        );

        for i in 0..5u16 {
            map.set(&mut heap, &Value::U16(i), &Value::U16(i)).unwrap();
        }
        assert!(map.remove(&mut heap, &Value::U16(3)).unwrap());
        assert!(!map.remove(&mut heap, &Value::U16(3)).unwrap());
        assert_eq!(map.len(&heap), 4);
        assert_eq!(map.get(&heap, &Value::U16(3)).unwrap(), None);
        for i in [0u16, 1, 2, 4] {
            assert_eq!(map.get(&heap, &Value::U16(i)).unwrap(), Some(Value::U16(i)));
        }
    }

    #[test]
    fn test_string_keys() {
        let mut heap = Heap::new(16 * 1024);
        let map = map_fixture(&mut heap, ElementType::Str, ElementType::Primitive(Primitive::I64));

        map.set(&mut heap, &Value::Str("health".into()), &Value::I64(100)).unwrap();
        map.set(&mut heap, &Value::Str("mana".into()), &Value::I64(40)).unwrap();
        assert_eq!(
            map.get(&heap, &Value::Str("health".into())).unwrap(),
            Some(Value::I64(100))
        );
        assert!(map.remove(&mut heap, &Value::Str("health".into())).unwrap());
        assert_eq!(map.get(&heap, &Value::Str("health".into())).unwrap(), None);
    }

    #[test]
    fn test_free_balances_allocations() {
        let mut heap = Heap::new(32 * 1024);
        let map = map_fixture(&mut heap, ElementType::Str, ElementType::Primitive(Primitive::U32));

        for i in 0..20u32 {
            map.set(&mut heap, &Value::Str(format!("key_{i}")), &Value::U32(i)).unwrap();
        }
        map.free(&mut heap);
        assert_eq!(map.len(&heap), 0);
        // Only the owner slot remains.
        assert_eq!(heap.live_allocations(), 1);

        // The slot serves a fresh instance afterwards.
        map.set(&mut heap, &Value::Str("again".into()), &Value::U32(1)).unwrap();
        assert_eq!(map.len(&heap), 1);
    }

    #[test]
    fn test_emplace_returns_in_place_slot() {
        let mut heap = Heap::new(4096);
        let map = map_fixture(
            &mut heap,
            ElementType::Primitive(Primitive::U32),
            ElementType::Primitive(Primitive::U64),
        );

        let at = map.emplace(&mut heap, &Value::U32(9)).unwrap();
        heap.write::<u64>(at, 900);
        assert_eq!(map.get(&heap, &Value::U32(9)).unwrap(), Some(Value::U64(900)));

        // Emplacing an existing key returns the same slot.
        let again = map.emplace(&mut heap, &Value::U32(9)).unwrap();
        assert_eq!(at, again);
        assert_eq!(map.len(&heap), 1);
    }
}
