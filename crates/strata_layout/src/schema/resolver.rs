//! # Type Resolver
//!
//! Parses the schema type-string grammar and resolves every type to a
//! [`BinaryTypeInfo`]. Owns the registries of struct layouts and enum
//! definitions; struct layouts are computed once and memoized by name.
//!
//! ## Grammar
//!
//! ```text
//! primitive   u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 bool str
//! fixed array [T, N]           fixed_arr<T, N>
//! tuple       [T1, T2, ...]
//! dyn array   T[]              arr<T>
//! map         map<K, V>
//! set         set<T>
//! sparse set  sparseset
//! union       T1 | T2 | ... | undefined
//! named       any registered struct or enum
//! ```
//!
//! Resolution failures are hard errors: this is a build-time tool and
//! must fail loudly rather than default silently.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LayoutError, LayoutResult};
use crate::memory::align_up;

use super::layout::{calculate_schema_layout, SchemaLayout};
use super::types::{BinaryTypeInfo, Primitive, ResolvedType, TupleElement, UnionInfo, PTR_ALIGN, PTR_SIZE};

/// One declared field of a struct/component schema.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    /// Field key.
    pub key: String,
    /// Type string in the schema grammar.
    pub type_string: String,
    /// Explicit bit width; opts the field into bit packing.
    pub bits: Option<u8>,
}

impl FieldSpec {
    /// Declares a field.
    #[must_use]
    pub fn new(key: &str, type_string: &str) -> Self {
        Self {
            key: key.to_string(),
            type_string: type_string.to_string(),
            bits: None,
        }
    }

    /// Declares an explicit bit width, opting into bit packing.
    #[must_use]
    pub fn bits(mut self, bits: u8) -> Self {
        self.bits = Some(bits);
        self
    }
}

/// A registered enum definition.
#[derive(Clone, Debug)]
pub struct EnumDef {
    /// Enum type name.
    pub name: String,
    /// Base integer type members are stored as.
    pub base: Primitive,
    /// Member (name, value) pairs.
    pub members: Vec<(String, i64)>,
}

impl EnumDef {
    /// Declares an enum with the default `u8` base type.
    #[must_use]
    pub fn new(name: &str, members: &[(&str, i64)]) -> Self {
        Self::with_base(name, Primitive::U8, members)
    }

    /// Declares an enum with an explicit base type.
    #[must_use]
    pub fn with_base(name: &str, base: Primitive, members: &[(&str, i64)]) -> Self {
        Self {
            name: name.to_string(),
            base,
            members: members
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        }
    }
}

/// Registry of struct layouts and enum definitions, plus the grammar
/// parser. One resolver instance per world; never process-wide.
#[derive(Default)]
pub struct TypeResolver {
    structs: HashMap<String, Arc<SchemaLayout>>,
    enums: HashMap<String, EnumDef>,
}

impl TypeResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enum, validating every member against the base type's
    /// range.
    pub fn register_enum(&mut self, def: EnumDef) -> LayoutResult<()> {
        if !def.base.is_integer() {
            return Err(LayoutError::TypeMismatch {
                context: def.name.clone(),
                expected: "an integer base type for an enum",
            });
        }
        if self.enums.contains_key(&def.name) || self.structs.contains_key(&def.name) {
            return Err(LayoutError::DuplicateType(def.name));
        }
        for (member, value) in &def.members {
            if !def.base.fits(*value) {
                return Err(LayoutError::EnumValueOutOfRange {
                    enum_name: def.name.clone(),
                    member: member.clone(),
                    value: *value,
                    base_type: def.base.name(),
                    max: def.base.max_value(),
                });
            }
        }
        self.enums.insert(def.name.clone(), def);
        Ok(())
    }

    /// Registers a struct schema, computing and memoizing its layout.
    pub fn register_struct(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> LayoutResult<Arc<SchemaLayout>> {
        if self.structs.contains_key(name) || self.enums.contains_key(name) {
            return Err(LayoutError::DuplicateType(name.to_string()));
        }
        let layout = Arc::new(calculate_schema_layout(self, name, fields)?);
        self.structs.insert(name.to_string(), Arc::clone(&layout));
        Ok(layout)
    }

    /// Returns the memoized layout of a registered struct.
    pub fn layout_of(&self, name: &str) -> LayoutResult<Arc<SchemaLayout>> {
        self.structs
            .get(name)
            .cloned()
            .ok_or_else(|| LayoutError::UnknownType(name.to_string()))
    }

    /// Checks whether `name` is a registered struct.
    #[must_use]
    pub fn has_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    /// Resolves a type string to its binary description.
    pub fn resolve(&self, type_string: &str) -> LayoutResult<BinaryTypeInfo> {
        let s = type_string.trim();
        if s.is_empty() {
            return Err(LayoutError::UnresolvableType(type_string.to_string()));
        }

        // Unions first: `|` binds loosest.
        let union_parts = split_top_level(s, '|');
        if union_parts.len() > 1 {
            return self.resolve_union(s, &union_parts);
        }

        // `T[]` suffix form.
        if let Some(prefix) = s.strip_suffix("[]") {
            let element = self.resolve(prefix)?;
            return Ok(BinaryTypeInfo::pointer_slot(ResolvedType::DynArray {
                element: Box::new(element),
            }));
        }

        // `[T, N]` fixed array or `[T1, T2, ...]` tuple.
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return self.resolve_bracket(s, inner);
        }

        // Generic forms: arr<T>, fixed_arr<T, N>, map<K, V>, set<T>.
        if let Some((head, args)) = parse_generic(s) {
            return self.resolve_generic(s, head, &args);
        }

        match s {
            "str" => return Ok(BinaryTypeInfo::pointer_slot(ResolvedType::Str)),
            "sparseset" => {
                return Ok(BinaryTypeInfo::pointer_slot(ResolvedType::SparseSet));
            }
            _ => {}
        }

        if let Some(p) = Primitive::parse(s) {
            return Ok(BinaryTypeInfo::primitive(p));
        }

        if let Some(def) = self.enums.get(s) {
            return Ok(BinaryTypeInfo {
                size: def.base.size(),
                alignment: def.base.alignment(),
                is_dynamic: false,
                kind: ResolvedType::Enum {
                    name: def.name.clone(),
                    base: def.base,
                    members: def.members.clone(),
                },
            });
        }

        if let Some(layout) = self.structs.get(s) {
            return Ok(BinaryTypeInfo {
                size: layout.total_size,
                alignment: layout.alignment,
                is_dynamic: layout.has_dynamic_data,
                kind: ResolvedType::Struct(Arc::clone(layout)),
            });
        }

        Err(LayoutError::UnresolvableType(type_string.to_string()))
    }

    fn resolve_bracket(&self, whole: &str, inner: &str) -> LayoutResult<BinaryTypeInfo> {
        let parts = split_top_level(inner, ',');
        if parts.is_empty() {
            return Err(LayoutError::UnresolvableType(whole.to_string()));
        }

        // `[T, N]` - a fixed array when the tail parses as a count.
        if parts.len() == 2 {
            if let Ok(count) = parts[1].trim().parse::<u32>() {
                let element = self.resolve(parts[0])?;
                return Ok(fixed_array_info(element, count));
            }
        }

        // Otherwise a tuple.
        let mut elements = Vec::with_capacity(parts.len());
        let mut current_offset = 0u32;
        let mut max_alignment = 1u32;
        let mut is_dynamic = false;
        for part in &parts {
            let info = self.resolve(part)?;
            let offset = align_up(current_offset, info.alignment);
            current_offset = offset + info.size;
            max_alignment = max_alignment.max(info.alignment);
            is_dynamic |= info.is_dynamic;
            elements.push(TupleElement { info, offset });
        }

        Ok(BinaryTypeInfo {
            size: align_up(current_offset, max_alignment),
            alignment: max_alignment,
            is_dynamic,
            kind: ResolvedType::Tuple { elements },
        })
    }

    fn resolve_generic(
        &self,
        whole: &str,
        head: &str,
        args: &[&str],
    ) -> LayoutResult<BinaryTypeInfo> {
        match (head, args.len()) {
            ("arr", 1) => {
                let element = self.resolve(args[0])?;
                Ok(BinaryTypeInfo::pointer_slot(ResolvedType::DynArray {
                    element: Box::new(element),
                }))
            }
            ("set", 1) => {
                let element = self.resolve(args[0])?;
                Ok(BinaryTypeInfo::pointer_slot(ResolvedType::Set {
                    element: Box::new(element),
                }))
            }
            ("map", 2) => {
                let key = self.resolve(args[0])?;
                let value = self.resolve(args[1])?;
                Ok(BinaryTypeInfo::pointer_slot(ResolvedType::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                }))
            }
            ("fixed_arr", 2) => {
                let count: u32 = args[1]
                    .trim()
                    .parse()
                    .map_err(|_| LayoutError::UnresolvableType(whole.to_string()))?;
                let element = self.resolve(args[0])?;
                Ok(fixed_array_info(element, count))
            }
            _ => Err(LayoutError::UnresolvableType(whole.to_string())),
        }
    }

    fn resolve_union(&self, whole: &str, parts: &[&str]) -> LayoutResult<BinaryTypeInfo> {
        let mut nullable = false;
        let mut variants = Vec::new();
        for part in parts {
            if part.trim() == "undefined" {
                nullable = true;
            } else {
                variants.push(self.resolve(part)?);
            }
        }

        if variants.is_empty() {
            return Err(LayoutError::UnresolvableType(whole.to_string()));
        }

        // A single variant with no null alternative is just that type.
        // So is an optional dynamic type: the null pointer is the tag.
        if variants.len() == 1 && (!nullable || variants[0].is_dynamic) {
            return Ok(variants.remove(0));
        }

        // Every variant pointer-sized and dynamic: one tagged-pointer slot.
        if variants.iter().all(|v| v.is_dynamic && v.size == PTR_SIZE) {
            return Ok(BinaryTypeInfo {
                size: PTR_SIZE,
                alignment: PTR_ALIGN,
                is_dynamic: true,
                kind: ResolvedType::Union(UnionInfo {
                    variants,
                    nullable,
                    tagged_pointer: true,
                    data_offset: 0,
                }),
            });
        }

        // General form: 1 tag byte, padded to the widest variant alignment.
        let max_size = variants.iter().map(|v| v.size).max().unwrap_or(0);
        let max_alignment = variants.iter().map(|v| v.alignment).max().unwrap_or(1);
        let is_dynamic = variants.iter().any(|v| v.is_dynamic);
        let data_offset = align_up(1, max_alignment);

        Ok(BinaryTypeInfo {
            size: data_offset + max_size,
            alignment: max_alignment,
            is_dynamic,
            kind: ResolvedType::Union(UnionInfo {
                variants,
                nullable,
                tagged_pointer: false,
                data_offset,
            }),
        })
    }
}

fn fixed_array_info(element: BinaryTypeInfo, count: u32) -> BinaryTypeInfo {
    BinaryTypeInfo {
        size: element.size * count,
        alignment: element.alignment,
        is_dynamic: element.is_dynamic,
        kind: ResolvedType::FixedArray {
            element: Box::new(element),
            count,
        },
    }
}

/// Splits `s` on `separator`, ignoring separators nested inside
/// `[]`/`<>`/`()` pairs.
fn split_top_level(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '<' | '(' => depth += 1,
            ']' | '>' | ')' => depth -= 1,
            c if c == separator && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Parses `head<args>` forms, returning the head and top-level args.
fn parse_generic(s: &str) -> Option<(&str, Vec<&str>)> {
    let open = s.find('<')?;
    if !s.ends_with('>') {
        return None;
    }
    let head = s[..open].trim();
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let inner = &s[open + 1..s.len() - 1];
    Some((head, split_top_level(inner, ',')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_resolution() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("u32").unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.alignment, 4);
        assert!(!info.is_dynamic);
    }

    #[test]
    fn test_str_is_pointer_slot() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("str").unwrap();
        assert_eq!(info.size, PTR_SIZE);
        assert_eq!(info.alignment, PTR_ALIGN);
        assert!(info.is_dynamic);
    }

    #[test]
    fn test_dyn_array_both_syntaxes() {
        let resolver = TypeResolver::new();
        for ty in ["u16[]", "arr<u16>"] {
            let info = resolver.resolve(ty).unwrap();
            assert_eq!(info.size, PTR_SIZE, "{ty}");
            assert!(info.is_dynamic, "{ty}");
            assert!(matches!(info.kind, ResolvedType::DynArray { .. }), "{ty}");
        }
    }

    #[test]
    fn test_fixed_array_both_syntaxes() {
        let resolver = TypeResolver::new();
        for ty in ["[u32, 8]", "fixed_arr<u32, 8>"] {
            let info = resolver.resolve(ty).unwrap();
            assert_eq!(info.size, 32, "{ty}");
            assert_eq!(info.alignment, 4, "{ty}");
            assert!(!info.is_dynamic, "{ty}");
        }
    }

    #[test]
    fn test_map_and_set() {
        let resolver = TypeResolver::new();
        let map = resolver.resolve("map<str, u64>").unwrap();
        assert_eq!(map.size, PTR_SIZE);
        assert!(map.is_dynamic);
        assert!(matches!(map.kind, ResolvedType::Map { .. }));

        let set = resolver.resolve("set<u32>").unwrap();
        assert!(matches!(set.kind, ResolvedType::Set { .. }));
    }

    #[test]
    fn test_tuple_with_dynamic_element() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("[u32, str, bool]").unwrap();

        assert!(info.is_dynamic);
        // u32 at 0, str slot at 4, bool at 8, padded to 4-byte alignment.
        assert_eq!(info.size, 12);
        assert_eq!(info.alignment, 4);
        let ResolvedType::Tuple { elements } = &info.kind else {
            panic!("expected tuple");
        };
        assert_eq!(elements[0].offset, 0);
        assert_eq!(elements[1].offset, 4);
        assert_eq!(elements[2].offset, 8);
    }

    #[test]
    fn test_union_of_fixed_variants() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("u32 | u64").unwrap();

        // 1 tag byte padded to 8, plus the widest variant.
        assert_eq!(info.alignment, 8);
        assert_eq!(info.size, 16);
        let ResolvedType::Union(u) = &info.kind else {
            panic!("expected union");
        };
        assert_eq!(u.data_offset, 8);
        assert!(!u.nullable);
        assert!(!u.tagged_pointer);
    }

    #[test]
    fn test_optional_fixed_adds_tag() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("u16 | undefined").unwrap();

        assert_eq!(info.alignment, 2);
        assert_eq!(info.size, 4); // tag byte padded to 2 + u16
        let ResolvedType::Union(u) = &info.kind else {
            panic!("expected union");
        };
        assert!(u.nullable);
        assert_eq!(u.data_offset, 2);
    }

    #[test]
    fn test_optional_dynamic_needs_no_tag() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("str | undefined").unwrap();
        assert_eq!(info.size, PTR_SIZE);
        assert!(matches!(info.kind, ResolvedType::Str));
    }

    #[test]
    fn test_all_dynamic_union_collapses_to_tagged_pointer() {
        let resolver = TypeResolver::new();
        let info = resolver.resolve("str | arr<u8> | undefined").unwrap();
        assert_eq!(info.size, PTR_SIZE);
        let ResolvedType::Union(u) = &info.kind else {
            panic!("expected union");
        };
        assert!(u.tagged_pointer);
        assert_eq!(u.variants.len(), 2);
    }

    #[test]
    fn test_enum_resolves_to_base_type() {
        let mut resolver = TypeResolver::new();
        resolver
            .register_enum(EnumDef::new("block_kind", &[("air", 0), ("stone", 1)]))
            .unwrap();

        let info = resolver.resolve("block_kind").unwrap();
        assert_eq!(info.size, 1);
        assert!(!info.is_dynamic);
    }

    #[test]
    fn test_enum_member_overflow_is_descriptive() {
        let mut resolver = TypeResolver::new();
        let err = resolver
            .register_enum(EnumDef::new("damage_kind", &[("fire", 1), ("void", 300)]))
            .unwrap_err();

        let LayoutError::EnumValueOutOfRange {
            enum_name,
            member,
            value,
            base_type,
            max,
        } = &err
        else {
            panic!("expected range error, got {err:?}");
        };
        assert_eq!(enum_name, "damage_kind");
        assert_eq!(member, "void");
        assert_eq!(*value, 300);
        assert_eq!(*base_type, "u8");
        assert_eq!(*max, 255);

        let message = err.to_string();
        assert!(message.contains("damage_kind"));
        assert!(message.contains("void"));
        assert!(message.contains("300"));
        assert!(message.contains("255"));
    }

    #[test]
    fn test_nested_struct_resolution() {
        let mut resolver = TypeResolver::new();
        resolver
            .register_struct(
                "vec3",
                &[
                    FieldSpec::new("x", "f32"),
                    FieldSpec::new("y", "f32"),
                    FieldSpec::new("z", "f32"),
                ],
            )
            .unwrap();

        let info = resolver.resolve("vec3").unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(info.alignment, 4);
        assert!(!info.is_dynamic);

        // And a struct embedding it inherits its footprint.
        let outer = resolver
            .register_struct(
                "transform",
                &[
                    FieldSpec::new("position", "vec3"),
                    FieldSpec::new("scale", "f32"),
                ],
            )
            .unwrap();
        assert_eq!(outer.total_size, 16);
    }

    #[test]
    fn test_unresolvable_type_is_a_hard_error() {
        let resolver = TypeResolver::new();
        let err = resolver.resolve("definitely_not_a_type").unwrap_err();
        assert!(matches!(err, LayoutError::UnresolvableType(_)));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut resolver = TypeResolver::new();
        resolver
            .register_struct("thing", &[FieldSpec::new("a", "u8")])
            .unwrap();
        let err = resolver
            .register_struct("thing", &[FieldSpec::new("a", "u8")])
            .unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateType(_)));
    }
}
