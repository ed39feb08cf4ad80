//! Identifier management using string interning.
//!
//! Element ids and kind names arrive as strings in every snapshot and are
//! compared constantly during reconciliation; interning them makes the
//! `(kind, id)` identity keys cheap to copy, hash and compare.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use string_interner::{DefaultStringInterner, DefaultSymbol};

static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn interner() -> &'static Mutex<DefaultStringInterner> {
    INTERNER.get_or_init(|| Mutex::new(DefaultStringInterner::new()))
}

/// Efficient identifier type using string interning.
///
/// # Examples
///
/// ```
/// use armilla_core::identifier::Id;
///
/// let kind = Id::new("node");
/// let id = Id::new("3");
///
/// assert_eq!(kind, Id::new("node"));
/// assert_eq!(id, "3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from a string slice.
    pub fn new(name: &str) -> Self {
        let mut interner = interner().lock().expect("Failed to acquire interner lock");
        Self(interner.get_or_intern(name))
    }

    /// Creates an `Id` scoped under a namespace, e.g. `link:next`.
    ///
    /// Used to keep synthesized shape kinds (edges, pointers, labels)
    /// disjoint from caller-declared element kinds.
    pub fn scoped(namespace: &str, name: &str) -> Self {
        Self::new(&format!("{namespace}:{name}"))
    }

    /// Resolves the interned string for this identifier.
    pub fn resolve(&self) -> String {
        let interner = interner().lock().expect("Failed to acquire interner lock");
        interner
            .resolve(self.0)
            .expect("Symbol should exist in interner")
            .to_string()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    /// Allows direct comparison with string slices: `id == "string"`
    fn eq(&self, other: &str) -> bool {
        let interner = interner().lock().expect("Failed to acquire interner lock");
        interner
            .resolve(self.0)
            .expect("Symbol should exist in interner")
            == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_interns_equal_strings() {
        let id1 = Id::new("node");
        let id2 = Id::new("node");
        let id3 = Id::new("edge");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1, "node");
    }

    #[test]
    fn test_scoped() {
        let scoped = Id::scoped("link", "next");
        assert_eq!(scoped, "link:next");
        assert_ne!(scoped, Id::new("next"));
    }

    #[test]
    fn test_display_round_trip() {
        let id = Id::new("some_kind");
        assert_eq!(format!("{id}"), "some_kind");
        assert_eq!(id.resolve(), "some_kind");
    }

    #[test]
    fn test_usable_as_map_key() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(Id::new("a"), 1);
        map.insert(Id::new("b"), 2);

        assert_eq!(map.get(&Id::new("a")), Some(&1));
        assert_eq!(map.len(), 2);
    }
}
