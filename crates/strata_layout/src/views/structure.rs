//! # Struct View
//!
//! [`StructRef`] is the accessor for one schema-described row: a
//! `(base pointer, layout)` pair. Field reads and writes go through the
//! computed [`PropertyLayout`]s - plain primitives, bit-packed spans,
//! enums with valid-value checking, strings, unions, and sub-views for
//! nested containers and structs.
//!
//! The recursive deep-free and deep-copy walkers for dynamic payloads
//! also live here; every container and the ECS row lifecycle funnel
//! through them.

use std::sync::Arc;

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{Heap, Ptr};
use crate::schema::{BinaryTypeInfo, Primitive, ResolvedType, SchemaLayout, UnionInfo};

use super::array::DynArray;
use super::map::DynMap;
use super::set::DynSet;
use super::strings::{alloc_string, free_string, read_string};
use super::value::{encode_primitive, read_primitive, ElementType, Value};

/// A struct view bound to a heap row.
#[derive(Clone, Debug)]
pub struct StructRef {
    base: Ptr,
    layout: Arc<SchemaLayout>,
}

impl StructRef {
    /// Binds a view to a row base pointer.
    #[must_use]
    pub fn new(base: Ptr, layout: Arc<SchemaLayout>) -> Self {
        Self { base, layout }
    }

    /// The row base pointer.
    #[must_use]
    pub fn base(&self) -> Ptr {
        self.base
    }

    /// The layout this view reads through.
    #[must_use]
    pub fn layout(&self) -> &Arc<SchemaLayout> {
        &self.layout
    }

    /// Reads the field `key`.
    pub fn get(&self, heap: &Heap, key: &str) -> LayoutResult<Value> {
        let prop = self.layout.property(key)?;
        let at = self.base.add(prop.offset);

        if let Some(span) = prop.packed {
            let word: u32 = heap.read(at);
            let bits = u64::from((word & span.mask()) >> span.bit_offset);
            return match &prop.info.kind {
                ResolvedType::Primitive(Primitive::Bool) => Ok(Value::Bool(bits != 0)),
                ResolvedType::Primitive(p) => Ok(value_from_bits(*p, bits)),
                _ => Err(LayoutError::TypeMismatch {
                    context: key.to_string(),
                    expected: "a packable field",
                }),
            };
        }

        read_field_value(heap, &prop.info, at)
    }

    /// Writes the field `key`.
    pub fn set(&self, heap: &mut Heap, key: &str, value: &Value) -> LayoutResult<()> {
        let prop = self.layout.property(key)?;
        let at = self.base.add(prop.offset);

        if let Some(span) = prop.packed {
            let bits = value.as_bits().ok_or_else(|| LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "an integer or bool for a bit-packed field",
            })?;
            let word: u32 = heap.read(at);
            let shifted = ((bits as u32) << span.bit_offset) & span.mask();
            heap.write(at, (word & !span.mask()) | shifted);
            return Ok(());
        }

        write_field_value(heap, &prop.info, at, value).map_err(|e| match e {
            LayoutError::TypeMismatch { expected, .. } => LayoutError::TypeMismatch {
                context: key.to_string(),
                expected,
            },
            other => other,
        })
    }

    /// A dynamic-array view over the field `key`.
    pub fn array(&self, key: &str) -> LayoutResult<DynArray> {
        let prop = self.layout.property(key)?;
        match &prop.info.kind {
            ResolvedType::DynArray { element } => Ok(DynArray::new(
                self.base.add(prop.offset),
                ElementType::from_info(element)?,
            )),
            _ => Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a dynamic array field",
            }),
        }
    }

    /// A map view over the field `key`.
    pub fn map(&self, key: &str) -> LayoutResult<DynMap> {
        let prop = self.layout.property(key)?;
        match &prop.info.kind {
            ResolvedType::Map { key: k, value: v } => Ok(DynMap::new(
                self.base.add(prop.offset),
                ElementType::from_info(k)?,
                ElementType::from_info(v)?,
            )),
            _ => Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a map field",
            }),
        }
    }

    /// A set view over the field `key`.
    pub fn hash_set(&self, key: &str) -> LayoutResult<DynSet> {
        let prop = self.layout.property(key)?;
        match &prop.info.kind {
            ResolvedType::Set { element } => Ok(DynSet::new(
                self.base.add(prop.offset),
                ElementType::from_info(element)?,
            )),
            _ => Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a set field",
            }),
        }
    }

    /// A nested struct view over the field `key`.
    pub fn struct_field(&self, key: &str) -> LayoutResult<StructRef> {
        let prop = self.layout.property(key)?;
        match &prop.info.kind {
            ResolvedType::Struct(layout) => Ok(StructRef::new(
                self.base.add(prop.offset),
                Arc::clone(layout),
            )),
            _ => Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a struct field",
            }),
        }
    }

    /// Reads one element of a fixed-array field.
    pub fn fixed_get(&self, heap: &Heap, key: &str, index: u32) -> LayoutResult<Value> {
        let prop = self.layout.property(key)?;
        let ResolvedType::FixedArray { element, count } = &prop.info.kind else {
            return Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a fixed array field",
            });
        };
        if index >= *count {
            return Err(LayoutError::TypeMismatch {
                context: format!("{key}[{index}]"),
                expected: "a fixed array index in range",
            });
        }
        read_field_value(heap, element, self.base.add(prop.offset + index * element.size))
    }

    /// Writes one element of a fixed-array field.
    pub fn fixed_set(
        &self,
        heap: &mut Heap,
        key: &str,
        index: u32,
        value: &Value,
    ) -> LayoutResult<()> {
        let prop = self.layout.property(key)?;
        let ResolvedType::FixedArray { element, count } = &prop.info.kind else {
            return Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a fixed array field",
            });
        };
        if index >= *count {
            return Err(LayoutError::TypeMismatch {
                context: format!("{key}[{index}]"),
                expected: "a fixed array index in range",
            });
        }
        write_field_value(heap, element, self.base.add(prop.offset + index * element.size), value)
    }

    /// Reads one element of a tuple field.
    pub fn tuple_get(&self, heap: &Heap, key: &str, index: usize) -> LayoutResult<Value> {
        let prop = self.layout.property(key)?;
        let ResolvedType::Tuple { elements } = &prop.info.kind else {
            return Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a tuple field",
            });
        };
        let element = elements.get(index).ok_or_else(|| LayoutError::TypeMismatch {
            context: format!("{key}[{index}]"),
            expected: "a tuple element in range",
        })?;
        read_field_value(heap, &element.info, self.base.add(prop.offset + element.offset))
    }

    /// Writes one element of a tuple field.
    pub fn tuple_set(
        &self,
        heap: &mut Heap,
        key: &str,
        index: usize,
        value: &Value,
    ) -> LayoutResult<()> {
        let prop = self.layout.property(key)?;
        let ResolvedType::Tuple { elements } = &prop.info.kind else {
            return Err(LayoutError::TypeMismatch {
                context: key.to_string(),
                expected: "a tuple field",
            });
        };
        let element = elements.get(index).ok_or_else(|| LayoutError::TypeMismatch {
            context: format!("{key}[{index}]"),
            expected: "a tuple element in range",
        })?;
        write_field_value(heap, &element.info, self.base.add(prop.offset + element.offset), value)
    }

    /// Releases every dynamic payload this row owns, nulling the slots.
    pub fn free_dynamic(&self, heap: &mut Heap) {
        free_struct_dynamic(heap, &self.layout, self.base);
    }

    /// Deep-copies `source` into this row. Own payloads are released
    /// first; nested dynamic data is copied by value.
    pub fn copy_from(&self, heap: &mut Heap, source: &Self) -> LayoutResult<()> {
        self.free_dynamic(heap);
        copy_struct_deep(heap, &self.layout, source.base, self.base)
    }
}

/// Builds a primitive value from raw bits (bit-packed field reads).
fn value_from_bits(p: Primitive, bits: u64) -> Value {
    match p {
        Primitive::U8 => Value::U8(bits as u8),
        Primitive::I8 => Value::I8(bits as i8),
        Primitive::U16 => Value::U16(bits as u16),
        Primitive::I16 => Value::I16(bits as i16),
        Primitive::U32 => Value::U32(bits as u32),
        Primitive::I32 => Value::I32(bits as i32),
        Primitive::U64 => Value::U64(bits),
        Primitive::I64 => Value::I64(bits as i64),
        Primitive::F32 => Value::F32(f32::from_bits(bits as u32)),
        Primitive::F64 => Value::F64(f64::from_bits(bits)),
        Primitive::Bool => Value::Bool(bits != 0),
    }
}

/// Writes the low bytes of `raw` as base type `p`.
fn write_primitive_bits(heap: &mut Heap, p: Primitive, at: Ptr, raw: u64) {
    match p {
        Primitive::U8 => heap.write(at, raw as u8),
        Primitive::I8 => heap.write(at, raw as i8),
        Primitive::U16 => heap.write(at, raw as u16),
        Primitive::I16 => heap.write(at, raw as i16),
        Primitive::U32 | Primitive::F32 => heap.write(at, raw as u32),
        Primitive::I32 => heap.write(at, raw as i32),
        Primitive::U64 | Primitive::F64 => heap.write(at, raw),
        Primitive::I64 => heap.write(at, raw as i64),
        Primitive::Bool => heap.write(at, u8::from(raw != 0)),
    }
}

/// Reads a field-shaped value. Containers are rejected; they go through
/// their view accessors.
pub(crate) fn read_field_value(
    heap: &Heap,
    info: &BinaryTypeInfo,
    at: Ptr,
) -> LayoutResult<Value> {
    match &info.kind {
        ResolvedType::Primitive(p) => Ok(read_primitive(heap, *p, at)),
        ResolvedType::Enum { base, .. } => Ok(read_primitive(heap, *base, at)),
        ResolvedType::Str => {
            let ptr = Ptr::new(heap.read(at));
            if ptr.is_null() {
                Ok(Value::Null)
            } else {
                Ok(Value::Str(read_string(heap, ptr)))
            }
        }
        ResolvedType::Struct(layout) => {
            Ok(Value::Bytes(heap.bytes(at, layout.total_size as usize).to_vec()))
        }
        ResolvedType::Union(u) if !u.tagged_pointer => {
            let tag: u8 = heap.read(at);
            if tag == 0 {
                return Ok(Value::Null);
            }
            let Some(variant) = u.variants.get(tag as usize - 1) else {
                tracing::warn!(tag, "union tag out of range, reading as null");
                return Ok(Value::Null);
            };
            read_field_value(heap, variant, at.add(u.data_offset))
        }
        ResolvedType::Union(_) => {
            let ptr = Ptr::new(heap.read(at));
            if ptr.is_null() {
                Ok(Value::Null)
            } else {
                Err(LayoutError::TypeMismatch {
                    context: "tagged-pointer union".to_string(),
                    expected: "layout-only support for multi-variant pointer unions",
                })
            }
        }
        _ => Err(LayoutError::TypeMismatch {
            context: "field".to_string(),
            expected: "a scalar field; containers use their view accessors",
        }),
    }
}

/// Writes a field-shaped value.
pub(crate) fn write_field_value(
    heap: &mut Heap,
    info: &BinaryTypeInfo,
    at: Ptr,
    value: &Value,
) -> LayoutResult<()> {
    match &info.kind {
        ResolvedType::Primitive(p) => {
            let bytes = encode_primitive(*p, value)?;
            heap.write_bytes(at, &bytes);
            Ok(())
        }
        ResolvedType::Enum { name, base, members } => {
            let raw = value.as_bits().ok_or_else(|| LayoutError::TypeMismatch {
                context: name.clone(),
                expected: "an integer enum value",
            })?;
            if !members.iter().any(|(_, v)| *v as u64 == raw) {
                return Err(LayoutError::InvalidEnumValue {
                    enum_name: name.clone(),
                    value: raw,
                });
            }
            write_primitive_bits(heap, *base, at, raw);
            Ok(())
        }
        ResolvedType::Str => ElementType::Str.write(heap, at, value),
        ResolvedType::Struct(layout) => match value {
            Value::Bytes(b) if b.len() == layout.total_size as usize => {
                heap.write_bytes(at, b);
                Ok(())
            }
            _ => Err(LayoutError::TypeMismatch {
                context: layout.type_name.clone(),
                expected: "raw bytes matching the struct size",
            }),
        },
        ResolvedType::Union(u) if !u.tagged_pointer => write_union_value(heap, u, at, value),
        ResolvedType::Union(_) => match value {
            Value::Null => {
                let ptr = Ptr::new(heap.read(at));
                if !ptr.is_null() {
                    tracing::warn!("nulling a tagged-pointer union without freeing its payload");
                }
                heap.write(at, Ptr::NULL.offset());
                Ok(())
            }
            _ => Err(LayoutError::TypeMismatch {
                context: "tagged-pointer union".to_string(),
                expected: "layout-only support for multi-variant pointer unions",
            }),
        },
        _ => Err(LayoutError::TypeMismatch {
            context: "field".to_string(),
            expected: "a scalar field; containers use their view accessors",
        }),
    }
}

fn write_union_value(
    heap: &mut Heap,
    u: &UnionInfo,
    at: Ptr,
    value: &Value,
) -> LayoutResult<()> {
    // Release whatever the current variant owned.
    let old_tag: u8 = heap.read(at);
    if old_tag > 0 {
        if let Some(old) = u.variants.get(old_tag as usize - 1) {
            if old.is_dynamic {
                free_info_dynamic(heap, old, at.add(u.data_offset));
            }
        }
    }

    if matches!(value, Value::Null) {
        if !u.nullable {
            return Err(LayoutError::NoMatchingVariant("union".to_string()));
        }
        heap.write::<u8>(at, 0);
        let data_len = u.variants.iter().map(|v| v.size).max().unwrap_or(0);
        heap.fill(at.add(u.data_offset), data_len as usize, 0);
        return Ok(());
    }

    let index = u
        .variants
        .iter()
        .position(|v| variant_accepts(v, value))
        .ok_or_else(|| LayoutError::NoMatchingVariant("union".to_string()))?;

    heap.write(at, (index + 1) as u8);
    let data_at = at.add(u.data_offset);
    let data_len = u.variants.iter().map(|v| v.size).max().unwrap_or(0);
    heap.fill(data_at, data_len as usize, 0);
    write_field_value(heap, &u.variants[index], data_at, value)
}

fn variant_accepts(info: &BinaryTypeInfo, value: &Value) -> bool {
    match (&info.kind, value) {
        (ResolvedType::Primitive(p), v) => encode_primitive(*p, v).is_ok(),
        (ResolvedType::Enum { .. }, v) => v.as_bits().is_some(),
        (ResolvedType::Str, Value::Str(_)) => true,
        (ResolvedType::Struct(layout), Value::Bytes(b)) => {
            b.len() == layout.total_size as usize
        }
        _ => false,
    }
}

// ============================================================================
// DEEP FREE / DEEP COPY
// ============================================================================

/// Releases every dynamic payload a row owns, nulling pointer slots so a
/// second pass is a no-op.
pub fn free_struct_dynamic(heap: &mut Heap, layout: &SchemaLayout, base: Ptr) {
    if !layout.has_dynamic_data {
        return;
    }
    for prop in &layout.properties {
        if prop.packed.is_none() && prop.info.is_dynamic {
            free_info_dynamic(heap, &prop.info, base.add(prop.offset));
        }
    }
}

/// Releases the dynamic payload of one value location.
pub fn free_info_dynamic(heap: &mut Heap, info: &BinaryTypeInfo, at: Ptr) {
    match &info.kind {
        ResolvedType::Primitive(_) | ResolvedType::Enum { .. } => {}
        ResolvedType::Str => {
            let ptr = Ptr::new(heap.read(at));
            free_string(heap, ptr);
            heap.write(at, Ptr::NULL.offset());
        }
        ResolvedType::Struct(layout) => free_struct_dynamic(heap, layout, at),
        ResolvedType::FixedArray { element, count } => {
            if element.is_dynamic {
                for i in 0..*count {
                    free_info_dynamic(heap, element, at.add(i * element.size));
                }
            }
        }
        ResolvedType::Tuple { elements } => {
            for element in elements {
                if element.info.is_dynamic {
                    free_info_dynamic(heap, &element.info, at.add(element.offset));
                }
            }
        }
        ResolvedType::DynArray { element } => match ElementType::from_info(element) {
            Ok(et) => DynArray::new(at, et).free(heap),
            Err(_) => tracing::warn!("skipping free of array with unsupported element"),
        },
        ResolvedType::Map { key, value } => {
            match (ElementType::from_info(key), ElementType::from_info(value)) {
                (Ok(k), Ok(v)) => DynMap::new(at, k, v).free(heap),
                _ => tracing::warn!("skipping free of map with unsupported key/value"),
            }
        }
        ResolvedType::Set { element } => match ElementType::from_info(element) {
            Ok(et) => DynSet::new(at, et).free(heap),
            Err(_) => tracing::warn!("skipping free of set with unsupported element"),
        },
        ResolvedType::SparseSet => {
            let ptr = Ptr::new(heap.read(at));
            if !ptr.is_null() {
                heap.free(ptr);
                heap.write(at, Ptr::NULL.offset());
            }
        }
        ResolvedType::Union(u) if !u.tagged_pointer => {
            let tag: u8 = heap.read(at);
            if tag > 0 {
                if let Some(variant) = u.variants.get(tag as usize - 1) {
                    if variant.is_dynamic {
                        free_info_dynamic(heap, variant, at.add(u.data_offset));
                    }
                }
            }
        }
        ResolvedType::Union(_) => {
            let ptr = Ptr::new(heap.read(at));
            if !ptr.is_null() {
                tracing::warn!("leaking tagged-pointer union payload of unknown variant");
                heap.write(at, Ptr::NULL.offset());
            }
        }
    }
}

/// Deep-copies a row: raw fixed bytes first, then fresh allocations for
/// every dynamic payload. `dst` must not own anything.
pub fn copy_struct_deep(
    heap: &mut Heap,
    layout: &SchemaLayout,
    src: Ptr,
    dst: Ptr,
) -> LayoutResult<()> {
    heap.copy(src, dst, layout.total_size as usize);
    copy_struct_fixups(heap, layout, src, dst)
}

/// Replaces aliased pointers in a freshly byte-copied row with deep
/// copies of the source payloads.
pub(crate) fn copy_struct_fixups(
    heap: &mut Heap,
    layout: &SchemaLayout,
    src: Ptr,
    dst: Ptr,
) -> LayoutResult<()> {
    if !layout.has_dynamic_data {
        return Ok(());
    }
    for prop in &layout.properties {
        if prop.packed.is_none() && prop.info.is_dynamic {
            copy_info_fixup(heap, &prop.info, src.add(prop.offset), dst.add(prop.offset))?;
        }
    }
    Ok(())
}

fn copy_info_fixup(
    heap: &mut Heap,
    info: &BinaryTypeInfo,
    src: Ptr,
    dst: Ptr,
) -> LayoutResult<()> {
    match &info.kind {
        ResolvedType::Str => {
            let ptr = Ptr::new(heap.read(src));
            if ptr.is_null() {
                heap.write(dst, Ptr::NULL.offset());
            } else {
                let content = read_string(heap, ptr);
                let fresh = alloc_string(heap, &content)?;
                heap.write(dst, fresh.offset());
            }
            Ok(())
        }
        ResolvedType::Struct(layout) => copy_struct_fixups(heap, layout, src, dst),
        ResolvedType::FixedArray { element, count } => {
            if element.is_dynamic {
                for i in 0..*count {
                    copy_info_fixup(heap, element, src.add(i * element.size), dst.add(i * element.size))?;
                }
            }
            Ok(())
        }
        ResolvedType::Tuple { elements } => {
            for element in elements {
                if element.info.is_dynamic {
                    copy_info_fixup(
                        heap,
                        &element.info,
                        src.add(element.offset),
                        dst.add(element.offset),
                    )?;
                }
            }
            Ok(())
        }
        ResolvedType::DynArray { element } => {
            let et = ElementType::from_info(element)?;
            heap.write(dst, Ptr::NULL.offset());
            DynArray::new(dst, et.clone()).copy_from(heap, &DynArray::new(src, et))
        }
        ResolvedType::Map { key, value } => {
            let k = ElementType::from_info(key)?;
            let v = ElementType::from_info(value)?;
            heap.write(dst, Ptr::NULL.offset());
            DynMap::new(dst, k.clone(), v.clone()).copy_from(heap, &DynMap::new(src, k, v))
        }
        ResolvedType::Set { element } => {
            let et = ElementType::from_info(element)?;
            heap.write(dst, Ptr::NULL.offset());
            DynSet::new(dst, et.clone()).copy_from(heap, &DynSet::new(src, et))
        }
        ResolvedType::SparseSet => {
            heap.write(dst, Ptr::NULL.offset());
            Ok(())
        }
        ResolvedType::Union(u) if !u.tagged_pointer => {
            let tag: u8 = heap.read(dst);
            if tag > 0 {
                if let Some(variant) = u.variants.get(tag as usize - 1) {
                    if variant.is_dynamic {
                        copy_info_fixup(
                            heap,
                            variant,
                            src.add(u.data_offset),
                            dst.add(u.data_offset),
                        )?;
                    }
                }
            }
            Ok(())
        }
        ResolvedType::Union(_) => {
            tracing::warn!("dropping tagged-pointer union payload during deep copy");
            heap.write(dst, Ptr::NULL.offset());
            Ok(())
        }
        ResolvedType::Primitive(_) | ResolvedType::Enum { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDef, FieldSpec, TypeResolver};

    fn row(heap: &mut Heap, layout: &Arc<SchemaLayout>) -> StructRef {
        let base = heap.allocate(layout.total_size.max(1) as usize, "row");
        StructRef::new(base, Arc::clone(layout))
    }

    #[test]
    fn test_scalar_fields_round_trip() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct(
                "stats",
                &[
                    FieldSpec::new("level", "u16"),
                    FieldSpec::new("speed", "f32"),
                    FieldSpec::new("alive", "bool"),
                ],
            )
            .unwrap();

        let mut heap = Heap::new(1024);
        let view = row(&mut heap, &layout);
        view.set(&mut heap, "level", &Value::U16(12)).unwrap();
        view.set(&mut heap, "speed", &Value::F32(1.5)).unwrap();
        view.set(&mut heap, "alive", &Value::Bool(true)).unwrap();

        assert_eq!(view.get(&heap, "level").unwrap(), Value::U16(12));
        assert_eq!(view.get(&heap, "speed").unwrap(), Value::F32(1.5));
        assert_eq!(view.get(&heap, "alive").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_bit_packed_fields_do_not_clobber_neighbors() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct(
                "flags",
                &[
                    FieldSpec::new("kind", "u8").bits(3),
                    FieldSpec::new("visible", "bool").bits(1),
                    FieldSpec::new("team", "u8").bits(4),
                ],
            )
            .unwrap();

        let mut heap = Heap::new(256);
        let view = row(&mut heap, &layout);
        view.set(&mut heap, "kind", &Value::U8(5)).unwrap();
        view.set(&mut heap, "visible", &Value::Bool(true)).unwrap();
        view.set(&mut heap, "team", &Value::U8(9)).unwrap();

        assert_eq!(view.get(&heap, "kind").unwrap(), Value::U8(5));
        assert_eq!(view.get(&heap, "visible").unwrap(), Value::Bool(true));
        assert_eq!(view.get(&heap, "team").unwrap(), Value::U8(9));

        // Rewriting one span leaves the others alone.
        view.set(&mut heap, "kind", &Value::U8(2)).unwrap();
        assert_eq!(view.get(&heap, "visible").unwrap(), Value::Bool(true));
        assert_eq!(view.get(&heap, "team").unwrap(), Value::U8(9));
    }

    #[test]
    fn test_enum_field_validates_members() {
        let mut resolver = TypeResolver::new();
        resolver
            .register_enum(EnumDef::new("rarity", &[("common", 0), ("rare", 1), ("epic", 2)]))
            .unwrap();
        let layout = resolver
            .register_struct("item", &[FieldSpec::new("rarity", "rarity")])
            .unwrap();

        let mut heap = Heap::new(256);
        let view = row(&mut heap, &layout);
        view.set(&mut heap, "rarity", &Value::U8(2)).unwrap();
        assert_eq!(view.get(&heap, "rarity").unwrap(), Value::U8(2));

        let err = view.set(&mut heap, "rarity", &Value::U8(9)).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_string_field_lifecycle() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct(
                "named",
                &[FieldSpec::new("id", "u32"), FieldSpec::new("name", "str")],
            )
            .unwrap();

        let mut heap = Heap::new(2048);
        let view = row(&mut heap, &layout);
        assert_eq!(view.get(&heap, "name").unwrap(), Value::Null);

        view.set(&mut heap, "name", &Value::Str("kestrel".into())).unwrap();
        assert_eq!(view.get(&heap, "name").unwrap(), Value::Str("kestrel".into()));

        view.set(&mut heap, "name", &Value::Str("osprey".into())).unwrap();
        view.free_dynamic(&mut heap);
        assert_eq!(view.get(&heap, "name").unwrap(), Value::Null);
        // Row allocation only.
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn test_optional_fixed_union() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct("maybe", &[FieldSpec::new("cooldown", "u16 | undefined")])
            .unwrap();

        let mut heap = Heap::new(256);
        let view = row(&mut heap, &layout);

        // Zeroed row reads as unset.
        assert_eq!(view.get(&heap, "cooldown").unwrap(), Value::Null);

        view.set(&mut heap, "cooldown", &Value::U16(30)).unwrap();
        assert_eq!(view.get(&heap, "cooldown").unwrap(), Value::U16(30));

        view.set(&mut heap, "cooldown", &Value::Null).unwrap();
        assert_eq!(view.get(&heap, "cooldown").unwrap(), Value::Null);
    }

    #[test]
    fn test_union_variant_dispatch() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct("mixed", &[FieldSpec::new("payload", "u32 | f64")])
            .unwrap();

        let mut heap = Heap::new(256);
        let view = row(&mut heap, &layout);

        view.set(&mut heap, "payload", &Value::U32(42)).unwrap();
        assert_eq!(view.get(&heap, "payload").unwrap(), Value::U32(42));

        view.set(&mut heap, "payload", &Value::F64(0.25)).unwrap();
        assert_eq!(view.get(&heap, "payload").unwrap(), Value::F64(0.25));

        let err = view.set(&mut heap, "payload", &Value::Str("no".into())).unwrap_err();
        assert!(matches!(err, LayoutError::NoMatchingVariant(_)));
    }

    #[test]
    fn test_tuple_field_access() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct("entry", &[FieldSpec::new("record", "[u32, str, bool]")])
            .unwrap();
        assert!(layout.has_dynamic_data);

        let mut heap = Heap::new(1024);
        let view = row(&mut heap, &layout);
        view.tuple_set(&mut heap, "record", 0, &Value::U32(7)).unwrap();
        view.tuple_set(&mut heap, "record", 1, &Value::Str("tag".into())).unwrap();
        view.tuple_set(&mut heap, "record", 2, &Value::Bool(true)).unwrap();

        assert_eq!(view.tuple_get(&heap, "record", 0).unwrap(), Value::U32(7));
        assert_eq!(view.tuple_get(&heap, "record", 1).unwrap(), Value::Str("tag".into()));
        assert_eq!(view.tuple_get(&heap, "record", 2).unwrap(), Value::Bool(true));

        view.free_dynamic(&mut heap);
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn test_fixed_array_field_access() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct("grid_row", &[FieldSpec::new("cells", "[u16, 4]")])
            .unwrap();
        assert_eq!(layout.total_size, 8);

        let mut heap = Heap::new(256);
        let view = row(&mut heap, &layout);
        for i in 0..4u32 {
            view.fixed_set(&mut heap, "cells", i, &Value::U16(i as u16 * 3)).unwrap();
        }
        assert_eq!(view.fixed_get(&heap, "cells", 2).unwrap(), Value::U16(6));
        assert!(view.fixed_get(&heap, "cells", 4).is_err());
    }

    #[test]
    fn test_nested_container_deep_copy() {
        let mut resolver = TypeResolver::new();
        let layout = resolver
            .register_struct(
                "inventory",
                &[
                    FieldSpec::new("owner", "str"),
                    FieldSpec::new("items", "arr<str>"),
                    FieldSpec::new("counts", "map<str, u32>"),
                ],
            )
            .unwrap();

        let mut heap = Heap::new(64 * 1024);
        let a = row(&mut heap, &layout);
        let b = row(&mut heap, &layout);

        a.set(&mut heap, "owner", &Value::Str("echo".into())).unwrap();
        a.array("items").unwrap().push(&mut heap, &Value::Str("rope".into())).unwrap();
        a.map("counts")
            .unwrap()
            .set(&mut heap, &Value::Str("rope".into()), &Value::U32(3))
            .unwrap();

        b.copy_from(&mut heap, &a).unwrap();

        // Destroying the source leaves the copy intact.
        a.free_dynamic(&mut heap);
        assert_eq!(b.get(&heap, "owner").unwrap(), Value::Str("echo".into()));
        assert_eq!(
            b.array("items").unwrap().get(&heap, 0),
            Some(Value::Str("rope".into()))
        );
        assert_eq!(
            b.map("counts").unwrap().get(&heap, &Value::Str("rope".into())).unwrap(),
            Some(Value::U32(3))
        );

        b.free_dynamic(&mut heap);
        // Only the two row allocations remain.
        assert_eq!(heap.live_allocations(), 2);
    }
}
