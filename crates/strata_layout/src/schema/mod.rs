//! # Schema Subsystem
//!
//! The build-time half of the layout engine: the type-string grammar, the
//! resolver that turns type strings into binary type descriptions, and the
//! layout calculator that places fields into byte offsets.

mod layout;
mod resolver;
mod types;

pub use layout::{calculate_schema_layout, BitSpan, PropertyLayout, SchemaLayout};
pub use resolver::{EnumDef, FieldSpec, TypeResolver};
pub use types::{BinaryTypeInfo, Primitive, ResolvedType, TupleElement, UnionInfo, PTR_ALIGN, PTR_SIZE};
