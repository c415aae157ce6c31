//! Magic strings: well-known property names shared across the engine,
//! identified by a small id so the interpreter and object model never
//! have to allocate or hash-compare them.

/// A statically known string, addressed by id instead of by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MagicString {
    /// `length`
    Length,
    /// `prototype`
    Prototype,
    /// `constructor`
    Constructor,
    /// `name`
    Name,
    /// `message`
    Message,
    /// `caller`
    Caller,
    /// `arguments`
    Arguments,
    /// `call`
    Call,
    /// `apply`
    Apply,
    /// `bind`
    Bind,
    /// `toString`
    ToString,
    /// `valueOf`
    ValueOf,
}

impl MagicString {
    /// All magic strings, in id order. Kept in one place so the registry
    /// and the interner can both iterate it.
    pub const ALL: [MagicString; 12] = [
        MagicString::Length,
        MagicString::Prototype,
        MagicString::Constructor,
        MagicString::Name,
        MagicString::Message,
        MagicString::Caller,
        MagicString::Arguments,
        MagicString::Call,
        MagicString::Apply,
        MagicString::Bind,
        MagicString::ToString,
        MagicString::ValueOf,
    ];

    /// The UTF-8 text this id denotes.
    pub const fn as_str(self) -> &'static str {
        match self {
            MagicString::Length => "length",
            MagicString::Prototype => "prototype",
            MagicString::Constructor => "constructor",
            MagicString::Name => "name",
            MagicString::Message => "message",
            MagicString::Caller => "caller",
            MagicString::Arguments => "arguments",
            MagicString::Call => "call",
            MagicString::Apply => "apply",
            MagicString::Bind => "bind",
            MagicString::ToString => "toString",
            MagicString::ValueOf => "valueOf",
        }
    }

    /// Look up the magic id matching `s`, if any.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_magic_string_round_trips_through_its_text() {
        for magic in MagicString::ALL {
            assert_eq!(MagicString::from_str(magic.as_str()), Some(magic));
        }
    }

    #[test]
    fn unknown_text_has_no_magic_id() {
        assert_eq!(MagicString::from_str("not-a-magic-string"), None);
    }
}
