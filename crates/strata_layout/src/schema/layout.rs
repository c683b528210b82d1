//! # Schema Layout Calculator
//!
//! Places a declared field list into byte offsets: alignment padding,
//! bit-packed containers, trailing pad to the struct alignment. Pure in
//! the resolver state; the resolver memoizes results by type name.

use crate::error::{LayoutError, LayoutResult};
use crate::memory::align_up;

use super::resolver::{FieldSpec, TypeResolver};
use super::types::{BinaryTypeInfo, Primitive, ResolvedType};

/// Placement of a bit-packed field inside its shared 4-byte container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSpan {
    /// First bit inside the container (0 = least significant).
    pub bit_offset: u8,
    /// Width in bits.
    pub bit_width: u8,
}

impl BitSpan {
    /// Mask selecting this span inside the container word.
    #[must_use]
    pub const fn mask(self) -> u32 {
        let width_mask = if self.bit_width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bit_width) - 1
        };
        width_mask << self.bit_offset
    }
}

/// One field of a laid-out struct.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyLayout {
    /// The field key.
    pub key: String,
    /// The declared type string, verbatim.
    pub type_string: String,
    /// Byte offset from the struct start. For bit-packed fields, the
    /// offset of the shared container word.
    pub offset: u32,
    /// Size of the field's region in bytes (container size when packed).
    pub size: u32,
    /// Alignment of the field's region.
    pub alignment: u32,
    /// Resolved binary type description.
    pub info: BinaryTypeInfo,
    /// Present when the field is bit-packed into a shared container.
    pub packed: Option<BitSpan>,
}

/// Computed layout of one struct/component type.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaLayout {
    /// The registered type name.
    pub type_name: String,
    /// Total size in bytes; always a multiple of `alignment`.
    pub total_size: u32,
    /// Struct alignment: the maximum field alignment.
    pub alignment: u32,
    /// True when any field transitively owns heap-allocated data.
    pub has_dynamic_data: bool,
    /// Fields in declaration order.
    pub properties: Vec<PropertyLayout>,
}

impl SchemaLayout {
    /// Looks up a field by key.
    pub fn property(&self, key: &str) -> LayoutResult<&PropertyLayout> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| LayoutError::UnknownField {
                type_name: self.type_name.clone(),
                field: key.to_string(),
            })
    }
}

/// Size of the shared container bit-packed fields accumulate into.
const BIT_CONTAINER_SIZE: u32 = 4;
/// Capacity of the shared container in bits.
const BIT_CONTAINER_BITS: u8 = 32;

/// Computes the layout of `type_name` from its declared fields.
///
/// Fields are placed in declaration order: each field's offset is its
/// predecessor's end padded up to the field's alignment. Fields declared
/// with an explicit bit width accumulate into a shared 4-byte container;
/// a field that would overflow the container, or any unpacked field,
/// closes the current container.
pub fn calculate_schema_layout(
    resolver: &TypeResolver,
    type_name: &str,
    fields: &[FieldSpec],
) -> LayoutResult<SchemaLayout> {
    let mut current_offset: u32 = 0;
    let mut max_alignment: u32 = 1;
    let mut has_dynamic_data = false;
    let mut properties = Vec::with_capacity(fields.len());

    // Open bit container: (container offset, bits used so far).
    let mut container: Option<(u32, u8)> = None;

    for field in fields {
        let info = resolver.resolve(&field.type_string)?;

        if let Some(bits) = field.bits {
            if bits == 0 || bits > BIT_CONTAINER_BITS {
                return Err(LayoutError::InvalidBitWidth {
                    field: field.key.clone(),
                    bits,
                });
            }
            let packable = matches!(
                &info.kind,
                ResolvedType::Primitive(p) if p.is_integer() || matches!(p, Primitive::Bool)
            );
            if !packable {
                return Err(LayoutError::TypeMismatch {
                    context: field.key.clone(),
                    expected: "an integer or bool for a bit-width annotation",
                });
            }

            let (container_offset, bit_offset) = match container {
                Some((offset, used)) if used + bits <= BIT_CONTAINER_BITS => (offset, used),
                _ => {
                    // Start a fresh container.
                    let offset = align_up(current_offset, BIT_CONTAINER_SIZE);
                    current_offset = offset + BIT_CONTAINER_SIZE;
                    (offset, 0)
                }
            };
            container = Some((container_offset, bit_offset + bits));
            max_alignment = max_alignment.max(BIT_CONTAINER_SIZE);

            properties.push(PropertyLayout {
                key: field.key.clone(),
                type_string: field.type_string.clone(),
                offset: container_offset,
                size: BIT_CONTAINER_SIZE,
                alignment: BIT_CONTAINER_SIZE,
                info,
                packed: Some(BitSpan {
                    bit_offset,
                    bit_width: bits,
                }),
            });
            continue;
        }

        // Any unpacked field closes the open container.
        container = None;

        let offset = align_up(current_offset, info.alignment);
        current_offset = offset + info.size;
        max_alignment = max_alignment.max(info.alignment);
        has_dynamic_data |= info.is_dynamic;

        properties.push(PropertyLayout {
            key: field.key.clone(),
            type_string: field.type_string.clone(),
            offset,
            size: info.size,
            alignment: info.alignment,
            info,
            packed: None,
        });
    }

    Ok(SchemaLayout {
        type_name: type_name.to_string(),
        total_size: align_up(current_offset, max_alignment),
        alignment: max_alignment,
        has_dynamic_data,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::super::resolver::{FieldSpec, TypeResolver};
    use super::*;

    fn layout_of(fields: &[FieldSpec]) -> SchemaLayout {
        let resolver = TypeResolver::new();
        calculate_schema_layout(&resolver, "test_struct", fields).unwrap()
    }

    #[test]
    fn test_sequential_placement_with_padding() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u8"),
            FieldSpec::new("b", "u32"),
            FieldSpec::new("c", "u16"),
        ]);

        assert_eq!(layout.property("a").unwrap().offset, 0);
        assert_eq!(layout.property("b").unwrap().offset, 4);
        assert_eq!(layout.property("c").unwrap().offset, 8);
        assert_eq!(layout.alignment, 4);
        assert_eq!(layout.total_size, 12);
        assert!(!layout.has_dynamic_data);
    }

    #[test]
    fn test_total_size_is_multiple_of_alignment() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u64"),
            FieldSpec::new("b", "u8"),
        ]);
        assert_eq!(layout.alignment, 8);
        assert_eq!(layout.total_size % layout.alignment, 0);
        assert_eq!(layout.total_size, 16);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let fields = [
            FieldSpec::new("x", "f32"),
            FieldSpec::new("name", "str"),
            FieldSpec::new("flags", "u8").bits(3),
            FieldSpec::new("on", "bool").bits(1),
            FieldSpec::new("tail", "u64"),
        ];
        let resolver = TypeResolver::new();
        let a = calculate_schema_layout(&resolver, "t", &fields).unwrap();
        let b = calculate_schema_layout(&resolver, "t", &fields).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_byte_ranges_overlap() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u8"),
            FieldSpec::new("b", "u64"),
            FieldSpec::new("c", "u16"),
            FieldSpec::new("d", "u32"),
            FieldSpec::new("e", "str"),
        ]);

        for (i, p) in layout.properties.iter().enumerate() {
            for q in layout.properties.iter().skip(i + 1) {
                let disjoint = p.offset + p.size <= q.offset || q.offset + q.size <= p.offset;
                assert!(disjoint, "{} overlaps {}", p.key, q.key);
            }
        }
    }

    #[test]
    fn test_bit_fields_share_one_container() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u8").bits(3),
            FieldSpec::new("b", "u8").bits(5),
            FieldSpec::new("c", "bool").bits(1),
        ]);

        let a = layout.property("a").unwrap();
        let b = layout.property("b").unwrap();
        let c = layout.property("c").unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 0);
        assert_eq!(c.offset, 0);
        assert_eq!(a.packed.unwrap().bit_offset, 0);
        assert_eq!(b.packed.unwrap().bit_offset, 3);
        assert_eq!(c.packed.unwrap().bit_offset, 8);
        assert_eq!(layout.total_size, 4);
    }

    #[test]
    fn test_bit_container_overflow_starts_new_container() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u32").bits(20),
            FieldSpec::new("b", "u32").bits(20),
        ]);

        assert_eq!(layout.property("a").unwrap().offset, 0);
        assert_eq!(layout.property("b").unwrap().offset, 4);
        assert_eq!(layout.property("b").unwrap().packed.unwrap().bit_offset, 0);
        assert_eq!(layout.total_size, 8);
    }

    #[test]
    fn test_unpacked_field_closes_container() {
        let layout = layout_of(&[
            FieldSpec::new("a", "u8").bits(4),
            FieldSpec::new("mid", "u8"),
            FieldSpec::new("b", "u8").bits(4),
        ]);

        assert_eq!(layout.property("a").unwrap().offset, 0);
        assert_eq!(layout.property("mid").unwrap().offset, 4);
        // A new container opens after the interruption.
        assert_eq!(layout.property("b").unwrap().offset, 8);
        assert_eq!(layout.property("b").unwrap().packed.unwrap().bit_offset, 0);
    }

    #[test]
    fn test_dynamic_field_marks_struct_dynamic() {
        let layout = layout_of(&[
            FieldSpec::new("id", "u32"),
            FieldSpec::new("name", "str"),
        ]);
        assert!(layout.has_dynamic_data);
        assert_eq!(layout.property("name").unwrap().size, 4);
    }

    #[test]
    fn test_zero_bit_width_rejected() {
        let resolver = TypeResolver::new();
        let err = calculate_schema_layout(
            &resolver,
            "t",
            &[FieldSpec::new("a", "u8").bits(0)],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidBitWidth { .. }));
    }
}
