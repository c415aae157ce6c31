//! The built-in registry: a fixed table of well-known objects and the
//! descriptor lists their lazily materialized properties come from.

use crate::magic::MagicString;
use crate::property::PropertyAttributes;

/// Identifies one of the engine's resident built-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinId {
    /// `Object` and `Object.prototype`.
    Object,
    /// `Function` and `Function.prototype`.
    Function,
    /// `Array` and `Array.prototype`.
    Array,
    /// `String` and `String.prototype`.
    String,
    /// `Number` and `Number.prototype`.
    Number,
    /// `Boolean` and `Boolean.prototype`.
    Boolean,
    /// `Error` and `Error.prototype`.
    Error,
    /// `TypeError`.
    TypeError,
    /// `RangeError`.
    RangeError,
    /// `ReferenceError`.
    ReferenceError,
    /// `SyntaxError`.
    SyntaxError,
    /// `URIError`.
    UriError,
    /// `EvalError`.
    EvalError,
    /// The global object itself.
    Global,
}

impl BuiltinId {
    /// The six sibling error constructors that share `Error.prototype`
    /// as their prototype's `[[Prototype]]`.
    pub const ERROR_SIBLINGS: [BuiltinId; 6] = [
        BuiltinId::TypeError,
        BuiltinId::RangeError,
        BuiltinId::ReferenceError,
        BuiltinId::SyntaxError,
        BuiltinId::UriError,
        BuiltinId::EvalError,
    ];
}

/// A property name as it appears in a static descriptor table: either
/// one of the engine's magic strings or a literal not worth interning
/// statically.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorName {
    /// A magic string id.
    Magic(MagicString),
    /// A literal name.
    Literal(&'static str),
}

impl DescriptorName {
    /// The name as a Rust string slice.
    pub fn as_str(self) -> &'static str {
        match self {
            DescriptorName::Magic(m) => m.as_str(),
            DescriptorName::Literal(s) => s,
        }
    }
}

/// What a descriptor materializes into.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorKind {
    /// A native routine, dispatched by id within this built-in.
    Routine {
        /// The routine's id, passed to `intrinsics::dispatch`.
        routine_id: u32,
        /// Declared parameter count (`Function.prototype.length`).
        arg_count: u8,
    },
    /// A numeric constant (`NaN`, `Infinity`).
    Number(f64),
    /// A string constant.
    StringConst(&'static str),
    /// `undefined`.
    Undefined,
    /// A reference to another built-in's constructor or prototype
    /// object (`Error.prototype`, `Object.prototype`, …).
    BuiltinRef {
        /// Which built-in.
        id: BuiltinId,
        /// Whether to use its prototype object rather than its
        /// constructor function.
        prototype: bool,
    },
}

/// One row of a built-in's descriptor table.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinDescriptor {
    /// The property name.
    pub name: DescriptorName,
    /// Attribute bits the materialized property is given.
    pub attributes: PropertyAttributes,
    /// What the property materializes to.
    pub kind: DescriptorKind,
}

const fn routine(name: DescriptorName, routine_id: u32, arg_count: u8) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        attributes: PropertyAttributes {
            writable: true,
            enumerable: false,
            configurable: true,
        },
        kind: DescriptorKind::Routine { routine_id, arg_count },
    }
}

/// `Object`'s and `Object.prototype`'s lazily materialized members.
pub const OBJECT_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Literal("defineProperty"), 0, 3),
    routine(DescriptorName::Literal("getOwnPropertyDescriptor"), 1, 2),
    routine(DescriptorName::Literal("keys"), 2, 1),
    routine(DescriptorName::Literal("create"), 3, 2),
    routine(DescriptorName::Magic(MagicString::ToString), 4, 0),
    routine(DescriptorName::Magic(MagicString::ValueOf), 5, 0),
];

/// `Function.prototype`'s lazily materialized members.
pub const FUNCTION_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Magic(MagicString::Call), 0, 1),
    routine(DescriptorName::Literal("apply"), 1, 2),
    routine(DescriptorName::Magic(MagicString::Bind), 2, 1),
    routine(DescriptorName::Magic(MagicString::ToString), 3, 0),
];

/// `Array` and `Array.prototype`'s lazily materialized members.
pub const ARRAY_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Literal("push"), 0, 1),
    routine(DescriptorName::Literal("pop"), 1, 0),
    routine(DescriptorName::Literal("slice"), 2, 2),
    routine(DescriptorName::Magic(MagicString::ToString), 3, 0),
];

/// `String.prototype`'s lazily materialized members.
pub const STRING_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Magic(MagicString::ValueOf), 0, 0),
    routine(DescriptorName::Magic(MagicString::ToString), 1, 0),
];

/// `Number.prototype`'s lazily materialized members.
pub const NUMBER_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Magic(MagicString::ValueOf), 0, 0),
    routine(DescriptorName::Magic(MagicString::ToString), 1, 0),
];

/// `Boolean.prototype`'s lazily materialized members.
pub const BOOLEAN_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Magic(MagicString::ValueOf), 0, 0),
    routine(DescriptorName::Magic(MagicString::ToString), 1, 0),
];

/// `Error.prototype`'s lazily materialized members. The six sibling
/// constructors' prototypes share this table, chained to `Error.prototype`
/// through the ordinary prototype link rather than duplicating rows.
pub const ERROR_DESCRIPTORS: &[BuiltinDescriptor] = &[
    routine(DescriptorName::Magic(MagicString::ToString), 0, 0),
    BuiltinDescriptor {
        name: DescriptorName::Literal("name"),
        attributes: PropertyAttributes {
            writable: true,
            enumerable: false,
            configurable: true,
        },
        kind: DescriptorKind::StringConst("Error"),
    },
];

/// The global object's fixed, non-configurable bindings.
pub const GLOBAL_DESCRIPTORS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: DescriptorName::Literal("NaN"),
        attributes: PropertyAttributes {
            writable: false,
            enumerable: false,
            configurable: false,
        },
        kind: DescriptorKind::Number(f64::NAN),
    },
    BuiltinDescriptor {
        name: DescriptorName::Literal("Infinity"),
        attributes: PropertyAttributes {
            writable: false,
            enumerable: false,
            configurable: false,
        },
        kind: DescriptorKind::Number(f64::INFINITY),
    },
    BuiltinDescriptor {
        name: DescriptorName::Literal("undefined"),
        attributes: PropertyAttributes {
            writable: false,
            enumerable: false,
            configurable: false,
        },
        kind: DescriptorKind::Undefined,
    },
    routine(DescriptorName::Literal("eval"), 0, 1),
];

/// The descriptor table for a given built-in id.
pub fn descriptors_for(id: BuiltinId) -> &'static [BuiltinDescriptor] {
    match id {
        BuiltinId::Object => OBJECT_DESCRIPTORS,
        BuiltinId::Function => FUNCTION_DESCRIPTORS,
        BuiltinId::Array => ARRAY_DESCRIPTORS,
        BuiltinId::String => STRING_DESCRIPTORS,
        BuiltinId::Number => NUMBER_DESCRIPTORS,
        BuiltinId::Boolean => BOOLEAN_DESCRIPTORS,
        BuiltinId::Error
        | BuiltinId::TypeError
        | BuiltinId::RangeError
        | BuiltinId::ReferenceError
        | BuiltinId::SyntaxError
        | BuiltinId::UriError
        | BuiltinId::EvalError => ERROR_DESCRIPTORS,
        BuiltinId::Global => GLOBAL_DESCRIPTORS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_id_has_a_descriptor_table() {
        let ids = [
            BuiltinId::Object,
            BuiltinId::Function,
            BuiltinId::Array,
            BuiltinId::String,
            BuiltinId::Number,
            BuiltinId::Boolean,
            BuiltinId::Error,
            BuiltinId::Global,
        ];
        for id in ids {
            assert!(!descriptors_for(id).is_empty());
        }
    }

    #[test]
    fn global_bindings_are_non_writable_non_configurable() {
        for d in GLOBAL_DESCRIPTORS.iter().filter(|d| d.name.as_str() != "eval") {
            assert!(!d.attributes.writable);
            assert!(!d.attributes.configurable);
        }
    }

    #[test]
    fn error_siblings_cover_the_six_required_kinds() {
        assert_eq!(BuiltinId::ERROR_SIBLINGS.len(), 6);
    }
}
