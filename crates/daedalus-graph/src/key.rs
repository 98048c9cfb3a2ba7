//! Nominal type keys for graph nodes.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a dependency node by its Rust type.
///
/// Equality and hashing use the `TypeId` only; the name is carried for
/// diagnostics and plan dumps.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for a type.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the full type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the short type name (without module path).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.short_name())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Engine;
    struct Cache;

    #[test]
    fn test_key_identity() {
        assert_eq!(TypeKey::of::<Engine>(), TypeKey::of::<Engine>());
        assert_ne!(TypeKey::of::<Engine>(), TypeKey::of::<Cache>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeKey::of::<Engine>().short_name(), "Engine");
    }

    #[test]
    fn test_key_hashing() {
        let mut set = HashSet::new();
        set.insert(TypeKey::of::<Engine>());
        set.insert(TypeKey::of::<Engine>());
        set.insert(TypeKey::of::<Cache>());
        assert_eq!(set.len(), 2);
    }
}
