//! # Strata Layout Engine
//!
//! The binary layout and runtime memory model of the engine:
//!
//! - **Schema**: a type-string grammar, a resolver, and a layout
//!   calculator that places declared fields into byte offsets with
//!   alignment padding, bit-packed containers, and union tag placement.
//! - **Memory**: one growable byte buffer with a TLSF-style segregated
//!   free-list allocator; "pointers" are byte offsets and the null
//!   sentinel is offset zero.
//! - **Views**: dynamic containers (array, hash map, hash set, string)
//!   and struct accessors built directly on the raw buffer with manual
//!   pointer bookkeeping, growth, and rehashing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_layout::{FieldSpec, Heap, StructRef, TypeResolver, Value};
//!
//! let mut resolver = TypeResolver::new();
//! let layout = resolver.register_struct(
//!     "actor",
//!     &[FieldSpec::new("id", "u32"), FieldSpec::new("name", "str")],
//! )?;
//!
//! let mut heap = Heap::new(64 * 1024);
//! let base = heap.allocate(layout.total_size as usize, "actor");
//! let view = StructRef::new(base, layout);
//! view.set(&mut heap, "name", &Value::Str("scout".into()))?;
//! ```

pub mod error;
pub mod memory;
pub mod schema;
pub mod views;

pub use error::{LayoutError, LayoutResult};
pub use memory::{align_up, Heap, Ptr};
pub use schema::{
    calculate_schema_layout, BinaryTypeInfo, BitSpan, EnumDef, FieldSpec, Primitive,
    PropertyLayout, ResolvedType, SchemaLayout, TupleElement, TypeResolver, UnionInfo, PTR_ALIGN,
    PTR_SIZE,
};
pub use views::{
    alloc_string, copy_struct_deep, fnv1a, free_info_dynamic, free_string, free_struct_dynamic,
    hash_string, read_string, string_equals, DynArray, DynMap, DynSet, ElementType, StructRef,
    Value,
};
