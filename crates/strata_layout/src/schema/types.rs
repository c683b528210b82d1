//! # Binary Type Descriptions
//!
//! The resolved, structural form of every type the schema grammar can
//! express. A [`BinaryTypeInfo`] is what the layout calculator and the
//! runtime views consume: size, alignment, dynamic-ness, and a closed
//! [`ResolvedType`] kind.

use std::sync::Arc;

use super::layout::SchemaLayout;

/// Size of a heap pointer slot in bytes. Strings and all dynamic
/// collections occupy exactly one of these in their owning struct.
pub const PTR_SIZE: u32 = 4;
/// Alignment of a heap pointer slot.
pub const PTR_ALIGN: u32 = 4;

/// Fixed-size primitive types of the schema grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// 8-bit unsigned integer.
    U8,
    /// 8-bit signed integer.
    I8,
    /// 16-bit unsigned integer.
    U16,
    /// 16-bit signed integer.
    I16,
    /// 32-bit unsigned integer.
    U32,
    /// 32-bit signed integer.
    I32,
    /// 64-bit unsigned integer.
    U64,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Boolean, stored as one byte.
    Bool,
}

impl Primitive {
    /// Parses a primitive type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "u8" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u64" => Self::U64,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "bool" => Self::Bool,
            _ => return None,
        })
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Alignment in bytes (equal to size for every primitive).
    #[must_use]
    pub const fn alignment(self) -> u32 {
        self.size()
    }

    /// Canonical grammar name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
        }
    }

    /// True for the integer primitives (enum base candidates, bit-packable).
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64 | Self::Bool)
    }

    /// Largest value an integer base type can hold.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U8 => u8::MAX as u64,
            Self::I8 => i8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::I16 => i16::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::I32 => i32::MAX as u64,
            Self::U64 | Self::F64 => u64::MAX,
            Self::I64 => i64::MAX as u64,
            Self::F32 | Self::Bool => 1,
        }
    }

    /// Smallest value an integer base type can hold.
    #[must_use]
    pub const fn min_value(self) -> i64 {
        match self {
            Self::I8 => i8::MIN as i64,
            Self::I16 => i16::MIN as i64,
            Self::I32 => i32::MIN as i64,
            Self::I64 => i64::MIN,
            _ => 0,
        }
    }

    /// Checks whether `value` fits this type's range.
    #[must_use]
    pub fn fits(self, value: i64) -> bool {
        if value < self.min_value() {
            return false;
        }
        value < 0 || (value as u64) <= self.max_value()
    }
}

/// One element of a laid-out tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleElement {
    /// The element's resolved type.
    pub info: BinaryTypeInfo,
    /// Byte offset of the element from the tuple start.
    pub offset: u32,
}

/// Layout metadata for a union type.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionInfo {
    /// The non-null variants, in declaration order. Tag value `n + 1`
    /// selects `variants[n]`; tag 0 means unset/null.
    pub variants: Vec<BinaryTypeInfo>,
    /// Whether the union admits an `undefined` variant.
    pub nullable: bool,
    /// True when every variant is a pointer-sized dynamic type, collapsing
    /// the union to a single tagged-pointer slot with no tag byte.
    pub tagged_pointer: bool,
    /// Byte offset of the variant data region (0 for tagged-pointer form).
    pub data_offset: u32,
}

/// The closed set of resolved type shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedType {
    /// A fixed-size primitive.
    Primitive(Primitive),
    /// A heap string; one pointer slot in the owner.
    Str,
    /// A registered enum; stored as its base integer type.
    Enum {
        /// Enum type name.
        name: String,
        /// Base integer type.
        base: Primitive,
        /// Member (name, value) pairs; the valid-value set.
        members: Vec<(String, i64)>,
    },
    /// A registered struct, stored inline.
    Struct(Arc<SchemaLayout>),
    /// A fixed-length inline array.
    FixedArray {
        /// Element type.
        element: Box<BinaryTypeInfo>,
        /// Element count.
        count: u32,
    },
    /// An inline tuple with per-element offsets.
    Tuple {
        /// Laid-out elements.
        elements: Vec<TupleElement>,
    },
    /// A dynamic array; one pointer slot in the owner.
    DynArray {
        /// Element type.
        element: Box<BinaryTypeInfo>,
    },
    /// A dynamic hash map; one pointer slot in the owner.
    Map {
        /// Key type.
        key: Box<BinaryTypeInfo>,
        /// Value type.
        value: Box<BinaryTypeInfo>,
    },
    /// A dynamic hash set; one pointer slot in the owner.
    Set {
        /// Element type.
        element: Box<BinaryTypeInfo>,
    },
    /// An opaque sparse-set handle; one pointer slot in the owner.
    SparseSet,
    /// A tagged union.
    Union(UnionInfo),
}

/// Resolved binary description of one type: everything the layout
/// calculator and the runtime views need to place and access it.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryTypeInfo {
    /// Size of the type's fixed region in bytes.
    pub size: u32,
    /// Alignment of the fixed region, a power of two.
    pub alignment: u32,
    /// True when the type transitively owns heap-allocated sub-data.
    pub is_dynamic: bool,
    /// Structural shape.
    pub kind: ResolvedType,
}

impl BinaryTypeInfo {
    /// Builds the info for a primitive.
    #[must_use]
    pub fn primitive(p: Primitive) -> Self {
        Self {
            size: p.size(),
            alignment: p.alignment(),
            is_dynamic: false,
            kind: ResolvedType::Primitive(p),
        }
    }

    /// Builds the info for a pointer-slot dynamic type.
    #[must_use]
    pub fn pointer_slot(kind: ResolvedType) -> Self {
        Self {
            size: PTR_SIZE,
            alignment: PTR_ALIGN,
            is_dynamic: true,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(Primitive::U8.size(), 1);
        assert_eq!(Primitive::Bool.size(), 1);
        assert_eq!(Primitive::U16.size(), 2);
        assert_eq!(Primitive::F32.size(), 4);
        assert_eq!(Primitive::I64.size(), 8);
        assert_eq!(Primitive::F64.alignment(), 8);
    }

    #[test]
    fn test_range_checks() {
        assert!(Primitive::U8.fits(255));
        assert!(!Primitive::U8.fits(256));
        assert!(!Primitive::U8.fits(-1));
        assert!(Primitive::I8.fits(-128));
        assert!(!Primitive::I8.fits(-129));
        assert!(Primitive::I16.fits(32767));
        assert!(!Primitive::I16.fits(32768));
    }
}
