//! Property keys, attributes, descriptors, and the singly-linked chain
//! an object's own properties live in.

use std::rc::Rc;

use glint_vm_bytecode::Value;

use crate::magic::MagicString;

/// A property name.
///
/// `Index` is a fast path for array-like access; it is interchangeable
/// with the decimal-string spelling of the same number for every
/// observable purpose, so [`PropertyKey::string`] folds digit-only names
/// into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// One of the engine's well-known names.
    Magic(MagicString),
    /// An interned string name.
    String(Rc<str>),
    /// An array index, 0 or positive, below `2^32 - 1`.
    Index(u32),
}

impl PropertyKey {
    /// Build a key from a Rust string, recognizing magic names and array
    /// indices.
    pub fn string(s: &str) -> Self {
        if let Some(magic) = MagicString::from_str(s) {
            return PropertyKey::Magic(magic);
        }
        if let Ok(index) = s.parse::<u32>() {
            if index.to_string() == s {
                return PropertyKey::Index(index);
            }
        }
        PropertyKey::String(Rc::from(s))
    }

    /// Build an index key directly.
    pub const fn index(i: u32) -> Self {
        PropertyKey::Index(i)
    }

    /// The key rendered as a Rust string, for diagnostics and `for-in`.
    pub fn to_display_string(&self) -> String {
        match self {
            PropertyKey::Magic(m) => m.as_str().to_string(),
            PropertyKey::String(s) => s.to_string(),
            PropertyKey::Index(i) => i.to_string(),
        }
    }
}

impl From<MagicString> for PropertyKey {
    fn from(m: MagicString) -> Self {
        PropertyKey::Magic(m)
    }
}

/// The three independent bits ECMA-262 attaches to every property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Data properties only: may `put` change the value.
    pub writable: bool,
    /// Does the property appear in `for-in` / `Object.keys`.
    pub enumerable: bool,
    /// May the property be deleted or have its descriptor changed.
    pub configurable: bool,
}

impl PropertyAttributes {
    /// `{writable: true, enumerable: true, configurable: true}`, the
    /// default for a property created by ordinary assignment.
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// `{writable: false, enumerable: false, configurable: false}`, the
    /// shape every lazily materialized property starts from.
    pub const fn sealed() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// `{writable: true, enumerable: false, configurable: false}`, the
    /// shape of `Array.prototype.length` per ECMA-262 15.4.5.1.
    pub const fn length() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: false,
        }
    }
}

/// What a property node actually holds.
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    /// A plain value slot.
    Data {
        /// The current value.
        value: Value,
        /// See [`PropertyAttributes`].
        attributes: PropertyAttributes,
    },
    /// A getter/setter pair. Either side may be absent.
    Accessor {
        /// Called with no arguments on `get`.
        get: Option<Value>,
        /// Called with the assigned value on `put`.
        set: Option<Value>,
        /// See [`PropertyAttributes`]. `writable` is meaningless here.
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// A data property with default attributes.
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// A data property with explicit attributes.
    pub fn data_with(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// This descriptor's attribute bits, regardless of kind.
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            PropertyDescriptor::Data { attributes, .. } => *attributes,
            PropertyDescriptor::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Mutable access to the attribute bits.
    pub fn attributes_mut(&mut self) -> &mut PropertyAttributes {
        match self {
            PropertyDescriptor::Data { attributes, .. } => attributes,
            PropertyDescriptor::Accessor { attributes, .. } => attributes,
        }
    }

    /// The stored value, for a data property.
    pub fn value(&self) -> Option<Value> {
        match self {
            PropertyDescriptor::Data { value, .. } => Some(*value),
            PropertyDescriptor::Accessor { .. } => None,
        }
    }

    /// Whether this descriptor is an accessor pair.
    pub fn is_accessor(&self) -> bool {
        matches!(self, PropertyDescriptor::Accessor { .. })
    }
}

struct PropertyNode {
    key: PropertyKey,
    descriptor: PropertyDescriptor,
    next: Option<Box<PropertyNode>>,
}

/// An object's own properties, stored as a singly-linked chain in
/// insertion order. Lookups are linear, matching the assumption that
/// most objects carry a handful of properties; `for-in` order falls out
/// of the chain order for free.
#[derive(Default)]
pub struct PropertyChain {
    head: Option<Box<PropertyNode>>,
}

impl PropertyChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the descriptor for `key`, if an own property by that name
    /// exists.
    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if &n.key == key {
                return Some(&n.descriptor);
            }
            node = n.next.as_deref();
        }
        None
    }

    /// Mutably borrow the descriptor for `key`, if present.
    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertyDescriptor> {
        let mut node = self.head.as_deref_mut();
        while let Some(n) = node {
            if &n.key == key {
                return Some(&mut n.descriptor);
            }
            node = n.next.as_deref_mut();
        }
        None
    }

    /// Whether an own property by this name exists.
    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert a new property or overwrite an existing one in place,
    /// preserving its position in the chain.
    pub fn set(&mut self, key: PropertyKey, descriptor: PropertyDescriptor) {
        if let Some(existing) = self.get_mut(&key) {
            *existing = descriptor;
            return;
        }
        self.head = Some(Box::new(PropertyNode {
            key,
            descriptor,
            next: self.head.take(),
        }));
    }

    /// Remove a property by name, returning whether one was present.
    pub fn remove(&mut self, key: &PropertyKey) -> bool {
        let mut current = &mut self.head;
        loop {
            match current {
                Some(node) if &node.key == key => {
                    *current = node.next.take();
                    return true;
                }
                Some(node) => current = &mut node.next,
                None => return false,
            }
        }
    }

    /// Iterate own properties in chain (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyDescriptor)> {
        let mut node = self.head.as_deref();
        std::iter::from_fn(move || {
            let n = node?;
            node = n.next.as_deref();
            Some((&n.key, &n.descriptor))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_strings_fold_into_index_keys() {
        assert_eq!(PropertyKey::string("12"), PropertyKey::Index(12));
        assert_eq!(PropertyKey::string("0"), PropertyKey::Index(0));
        assert_ne!(PropertyKey::string("01"), PropertyKey::Index(1));
    }

    #[test]
    fn known_names_fold_into_magic_keys() {
        assert_eq!(PropertyKey::string("length"), PropertyKey::Magic(MagicString::Length));
    }

    #[test]
    fn chain_set_then_get_round_trips() {
        let mut chain = PropertyChain::new();
        let key = PropertyKey::string("x");
        chain.set(key.clone(), PropertyDescriptor::data(Value::integer(5)));
        assert_eq!(chain.get(&key).unwrap().value(), Some(Value::integer(5)));
    }

    #[test]
    fn chain_preserves_insertion_order() {
        let mut chain = PropertyChain::new();
        chain.set(PropertyKey::string("a"), PropertyDescriptor::data(Value::integer(1)));
        chain.set(PropertyKey::string("b"), PropertyDescriptor::data(Value::integer(2)));
        let names: Vec<_> = chain.iter().map(|(k, _)| k.to_display_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn remove_respects_configurable_only_at_the_caller() {
        let mut chain = PropertyChain::new();
        let key = PropertyKey::string("x");
        chain.set(key.clone(), PropertyDescriptor::data(Value::integer(1)));
        assert!(chain.remove(&key));
        assert!(!chain.contains(&key));
        assert!(!chain.remove(&key));
    }
}
