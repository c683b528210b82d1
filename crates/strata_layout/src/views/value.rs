//! # Values and Element Behavior
//!
//! [`Value`] is the owned form data takes when it crosses the view API
//! boundary. [`ElementType`] is the closed set of element behaviors the
//! dynamic containers are specialized over: inline primitive, heap
//! string, or inline schema-described struct. Every container operation
//! dispatches through one `match` here - the variant set is fixed at
//! schema-resolution time.

use std::sync::Arc;

use crate::error::{LayoutError, LayoutResult};
use crate::memory::{Heap, Ptr};
use crate::schema::{BinaryTypeInfo, Primitive, ResolvedType, SchemaLayout};

use super::strings::{alloc_string, free_string, hash_string, read_string, string_equals};
use super::structure::{copy_struct_fixups, free_struct_dynamic};

/// FNV-1a over a byte slice; the hash all containers key on.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// An owned value crossing the view API boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// 8-bit unsigned.
    U8(u8),
    /// 8-bit signed.
    I8(i8),
    /// 16-bit unsigned.
    U16(u16),
    /// 16-bit signed.
    I16(i16),
    /// 32-bit unsigned.
    U32(u32),
    /// 32-bit signed.
    I32(i32),
    /// 64-bit unsigned.
    U64(u64),
    /// 64-bit signed.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// Owned string content.
    Str(String),
    /// The raw fixed-region bytes of a schema-described value.
    Bytes(Vec<u8>),
    /// Null / unset.
    Null,
}

impl Value {
    /// The value's integer bits, when it has any (for enums and
    /// bit-packed fields).
    #[must_use]
    pub fn as_bits(&self) -> Option<u64> {
        Some(match self {
            Self::U8(v) => u64::from(*v),
            Self::U16(v) => u64::from(*v),
            Self::U32(v) => u64::from(*v),
            Self::U64(v) => *v,
            Self::I8(v) => *v as u64,
            Self::I16(v) => *v as u64,
            Self::I32(v) => *v as u64,
            Self::I64(v) => *v as u64,
            Self::Bool(v) => u64::from(*v),
            _ => return None,
        })
    }

    /// Human-readable kind name, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::I8(_) => "i8",
            Self::U16(_) => "u16",
            Self::I16(_) => "i16",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Null => "null",
        }
    }
}

/// Reads a primitive at `at` into its owned form.
#[must_use]
pub(crate) fn read_primitive(heap: &Heap, p: Primitive, at: Ptr) -> Value {
    match p {
        Primitive::U8 => Value::U8(heap.read(at)),
        Primitive::I8 => Value::I8(heap.read(at)),
        Primitive::U16 => Value::U16(heap.read(at)),
        Primitive::I16 => Value::I16(heap.read(at)),
        Primitive::U32 => Value::U32(heap.read(at)),
        Primitive::I32 => Value::I32(heap.read(at)),
        Primitive::U64 => Value::U64(heap.read(at)),
        Primitive::I64 => Value::I64(heap.read(at)),
        Primitive::F32 => Value::F32(heap.read(at)),
        Primitive::F64 => Value::F64(heap.read(at)),
        Primitive::Bool => Value::Bool(heap.read::<u8>(at) != 0),
    }
}

/// Encodes a primitive value into its inline byte form.
pub(crate) fn encode_primitive(p: Primitive, value: &Value) -> LayoutResult<Vec<u8>> {
    let mismatch = || LayoutError::TypeMismatch {
        context: value.kind_name().to_string(),
        expected: p.name(),
    };
    Ok(match (p, value) {
        (Primitive::U8, Value::U8(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::I8, Value::I8(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::U16, Value::U16(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::I16, Value::I16(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::U32, Value::U32(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::I32, Value::I32(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::U64, Value::U64(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::I64, Value::I64(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::F32, Value::F32(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::F64, Value::F64(v)) => v.to_ne_bytes().to_vec(),
        (Primitive::Bool, Value::Bool(v)) => vec![u8::from(*v)],
        _ => return Err(mismatch()),
    })
}

/// The closed set of container element behaviors.
#[derive(Clone, Debug)]
pub enum ElementType {
    /// Inline fixed-size primitive, stored by value.
    Primitive(Primitive),
    /// Heap string; the element slot holds a pointer.
    Str,
    /// Inline schema-described struct row.
    Struct(Arc<SchemaLayout>),
}

impl ElementType {
    /// Derives the element behavior for a resolved type. Enums collapse
    /// to their base primitive; anything without an inline or
    /// pointer-slot element form is rejected.
    pub fn from_info(info: &BinaryTypeInfo) -> LayoutResult<Self> {
        match &info.kind {
            ResolvedType::Primitive(p) => Ok(Self::Primitive(*p)),
            ResolvedType::Enum { base, .. } => Ok(Self::Primitive(*base)),
            ResolvedType::Str => Ok(Self::Str),
            ResolvedType::Struct(layout) => Ok(Self::Struct(Arc::clone(layout))),
            _ => Err(LayoutError::TypeMismatch {
                context: "container element".to_string(),
                expected: "a primitive, str, or registered struct",
            }),
        }
    }

    /// Size of one inline element slot.
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            Self::Primitive(p) => p.size(),
            Self::Str => crate::schema::PTR_SIZE,
            Self::Struct(layout) => layout.total_size,
        }
    }

    /// Alignment of one inline element slot.
    #[must_use]
    pub fn alignment(&self) -> u32 {
        match self {
            Self::Primitive(p) => p.alignment(),
            Self::Str => crate::schema::PTR_ALIGN,
            Self::Struct(layout) => layout.alignment,
        }
    }

    /// True when the element owns heap sub-data that must be freed.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Primitive(_) => false,
            Self::Str => true,
            Self::Struct(layout) => layout.has_dynamic_data,
        }
    }

    /// Encodes a value into inline element bytes (not used for `Str`).
    pub fn encode(&self, value: &Value) -> LayoutResult<Vec<u8>> {
        match self {
            Self::Primitive(p) => encode_primitive(*p, value),
            Self::Struct(layout) => match value {
                Value::Bytes(b) if b.len() == layout.total_size as usize => Ok(b.clone()),
                _ => Err(LayoutError::TypeMismatch {
                    context: value.kind_name().to_string(),
                    expected: "raw bytes matching the struct size",
                }),
            },
            Self::Str => Err(LayoutError::TypeMismatch {
                context: "str element".to_string(),
                expected: "string elements are written through their pointer slot",
            }),
        }
    }

    /// Reads the element at `at` into its owned form.
    #[must_use]
    pub fn read(&self, heap: &Heap, at: Ptr) -> Value {
        match self {
            Self::Primitive(p) => read_primitive(heap, *p, at),
            Self::Str => {
                let ptr: Ptr = Ptr::new(heap.read(at));
                if ptr.is_null() {
                    Value::Null
                } else {
                    Value::Str(read_string(heap, ptr))
                }
            }
            Self::Struct(layout) => {
                Value::Bytes(heap.bytes(at, layout.total_size as usize).to_vec())
            }
        }
    }

    /// Writes `value` into the element at `at`, replacing what was there.
    /// For strings, the previous allocation is freed first.
    pub fn write(&self, heap: &mut Heap, at: Ptr, value: &Value) -> LayoutResult<()> {
        match self {
            Self::Primitive(_) | Self::Struct(_) => {
                let bytes = self.encode(value)?;
                heap.write_bytes(at, &bytes);
                Ok(())
            }
            Self::Str => {
                let old = Ptr::new(heap.read::<u32>(at));
                match value {
                    Value::Null => {
                        free_string(heap, old);
                        heap.write::<u32>(at, Ptr::NULL.offset());
                        Ok(())
                    }
                    Value::Str(s) => {
                        let fresh = alloc_string(heap, s)?;
                        free_string(heap, old);
                        heap.write::<u32>(at, fresh.offset());
                        Ok(())
                    }
                    _ => Err(LayoutError::TypeMismatch {
                        context: value.kind_name().to_string(),
                        expected: "str",
                    }),
                }
            }
        }
    }

    /// Compares the element at `at` with a search value. Fixed-size
    /// elements byte-compare their inline region; strings compare
    /// content.
    #[must_use]
    pub fn equals(&self, heap: &Heap, at: Ptr, value: &Value) -> bool {
        match self {
            Self::Primitive(_) | Self::Struct(_) => match self.encode(value) {
                Ok(bytes) => heap.bytes(at, bytes.len()) == bytes.as_slice(),
                Err(_) => false,
            },
            Self::Str => {
                let ptr = Ptr::new(heap.read::<u32>(at));
                match value {
                    Value::Str(s) => string_equals(heap, ptr, s),
                    Value::Null => ptr.is_null(),
                    _ => false,
                }
            }
        }
    }

    /// Hashes the element stored at `at`.
    #[must_use]
    pub fn hash_at(&self, heap: &Heap, at: Ptr) -> u32 {
        match self {
            Self::Primitive(_) | Self::Struct(_) => {
                fnv1a(heap.bytes(at, self.size() as usize))
            }
            Self::Str => hash_string(heap, Ptr::new(heap.read::<u32>(at))),
        }
    }

    /// Hashes a search value without writing it anywhere. Must agree
    /// with [`Self::hash_at`] for the same logical value.
    pub fn hash_value(&self, value: &Value) -> LayoutResult<u32> {
        match self {
            Self::Primitive(_) | Self::Struct(_) => Ok(fnv1a(&self.encode(value)?)),
            Self::Str => match value {
                Value::Str(s) => Ok(fnv1a(s.as_bytes())),
                Value::Null => Ok(fnv1a(&[])),
                _ => Err(LayoutError::TypeMismatch {
                    context: value.kind_name().to_string(),
                    expected: "str",
                }),
            },
        }
    }

    /// Frees the element's owned heap sub-data and nulls its pointer
    /// slots. No-op for primitives.
    pub fn free_dynamic(&self, heap: &mut Heap, at: Ptr) {
        match self {
            Self::Primitive(_) => {}
            Self::Str => {
                let ptr = Ptr::new(heap.read::<u32>(at));
                free_string(heap, ptr);
                heap.write::<u32>(at, Ptr::NULL.offset());
            }
            Self::Struct(layout) => free_struct_dynamic(heap, layout, at),
        }
    }

    /// Deep-copies the element at `src` into `dst`. `dst` is assumed to
    /// own nothing yet (fresh or already freed).
    pub fn copy(&self, heap: &mut Heap, src: Ptr, dst: Ptr) -> LayoutResult<()> {
        match self {
            Self::Primitive(p) => {
                heap.copy(src, dst, p.size() as usize);
                Ok(())
            }
            Self::Str => {
                let ptr = Ptr::new(heap.read::<u32>(src));
                if ptr.is_null() {
                    heap.write::<u32>(dst, Ptr::NULL.offset());
                } else {
                    let content = read_string(heap, ptr);
                    let fresh = alloc_string(heap, &content)?;
                    heap.write::<u32>(dst, fresh.offset());
                }
                Ok(())
            }
            Self::Struct(layout) => {
                heap.copy(src, dst, layout.total_size as usize);
                copy_struct_fixups(heap, layout, src, dst)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_vectors() {
        // Standard FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
    }

    #[test]
    fn test_primitive_write_read() {
        let mut heap = Heap::new(256);
        let p = heap.allocate(8, "test");
        let elem = ElementType::Primitive(Primitive::I32);

        elem.write(&mut heap, p, &Value::I32(-77)).unwrap();
        assert_eq!(elem.read(&heap, p), Value::I32(-77));
        assert!(elem.equals(&heap, p, &Value::I32(-77)));
        assert!(!elem.equals(&heap, p, &Value::I32(77)));
    }

    #[test]
    fn test_write_rejects_mismatched_kind() {
        let mut heap = Heap::new(256);
        let p = heap.allocate(8, "test");
        let elem = ElementType::Primitive(Primitive::U8);
        let err = elem.write(&mut heap, p, &Value::U32(1)).unwrap_err();
        assert!(matches!(err, LayoutError::TypeMismatch { .. }));
    }

    #[test]
    fn test_str_element_replaces_and_frees() {
        let mut heap = Heap::new(1024);
        let p = heap.allocate(4, "test");
        let elem = ElementType::Str;

        elem.write(&mut heap, p, &Value::Str("first".into())).unwrap();
        elem.write(&mut heap, p, &Value::Str("second".into())).unwrap();
        assert_eq!(elem.read(&heap, p), Value::Str("second".into()));

        elem.free_dynamic(&mut heap, p);
        assert_eq!(elem.read(&heap, p), Value::Null);
        // Only the slot block itself remains live.
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn test_hash_value_agrees_with_hash_at() {
        let mut heap = Heap::new(512);
        let p = heap.allocate(8, "test");
        let elem = ElementType::Primitive(Primitive::U64);
        elem.write(&mut heap, p, &Value::U64(123_456_789)).unwrap();
        assert_eq!(
            elem.hash_at(&heap, p),
            elem.hash_value(&Value::U64(123_456_789)).unwrap()
        );

        let s = ElementType::Str;
        let q = heap.allocate(4, "test");
        s.write(&mut heap, q, &Value::Str("key".into())).unwrap();
        assert_eq!(s.hash_at(&heap, q), s.hash_value(&Value::Str("key".into())).unwrap());
    }
}
