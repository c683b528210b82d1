//! # Layout Error Types
//!
//! All errors that can occur in the schema layout engine and the runtime
//! containers built on it.

use thiserror::Error;

/// Errors that can occur during type resolution, layout calculation, or
/// runtime container operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A type string could not be parsed or matched against any registered type.
    #[error("unresolvable type: `{0}` is not a primitive, a registered type, or a collection")]
    UnresolvableType(String),

    /// A referenced struct or enum type has no registered schema.
    #[error("unknown type: `{0}` has no registered schema")]
    UnknownType(String),

    /// A type was registered twice under the same name.
    #[error("duplicate type registration: `{0}`")]
    DuplicateType(String),

    /// An enum member value does not fit the enum's base integer type.
    #[error(
        "enum `{enum_name}` member `{member}` has value {value}, \
         which exceeds the {base_type} maximum of {max}"
    )]
    EnumValueOutOfRange {
        /// The enum type being laid out.
        enum_name: String,
        /// The offending member name.
        member: String,
        /// The declared member value.
        value: i64,
        /// Name of the base integer type.
        base_type: &'static str,
        /// Maximum value representable by the base type.
        max: u64,
    },

    /// A value written to an enum field is not one of the enum's members.
    #[error("value {value} is not a member of enum `{enum_name}`")]
    InvalidEnumValue {
        /// The enum type.
        enum_name: String,
        /// The rejected value.
        value: u64,
    },

    /// A bit width annotation is invalid for the annotated type.
    #[error("field `{field}` declares {bits} bits, which does not fit a 32-bit container")]
    InvalidBitWidth {
        /// The offending field key.
        field: String,
        /// The declared width.
        bits: u8,
    },

    /// A field key was not found in a struct layout.
    #[error("struct `{type_name}` has no field `{field}`")]
    UnknownField {
        /// The struct type.
        type_name: String,
        /// The missing field key.
        field: String,
    },

    /// A value's kind does not match the field or element type it was written to.
    #[error("type mismatch writing to `{context}`: expected {expected}")]
    TypeMismatch {
        /// Field key or container description.
        context: String,
        /// Human-readable expected kind.
        expected: &'static str,
    },

    /// The heap could not satisfy an allocation request.
    #[error("out of memory: `{owner}` requested {size} bytes")]
    OutOfMemory {
        /// Diagnostic tag of the requesting container.
        owner: &'static str,
        /// Requested size in bytes.
        size: usize,
    },

    /// A union value did not match any declared variant.
    #[error("value does not match any variant of union `{0}`")]
    NoMatchingVariant(String),
}

/// Result type for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;
