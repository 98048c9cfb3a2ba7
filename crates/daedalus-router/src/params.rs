//! Captured path parameters.

use smallvec::SmallVec;

/// Parameters stored inline before spilling to the heap.
const INLINE: usize = 4;

/// The (name, value) pairs captured while matching a path.
///
/// Backed by a small vector so the common one-or-two-parameter case
/// allocates nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    pairs: SmallVec<[(String, String); INLINE]>,
}

impl Params {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a captured parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Returns the value captured for a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Removes the most recently captured parameter.
    pub(crate) fn pop(&mut self) {
        self.pairs.pop();
    }

    /// Returns the number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates the captured pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut params = Params::new();
        params.insert("org", "acme");
        params.insert("user", "u7");

        assert_eq!(params.get("org"), Some("acme"));
        assert_eq!(params.get("user"), Some("u7"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_iter_preserves_capture_order() {
        let mut params = Params::new();
        params.insert("a", "1");
        params.insert("b", "2");

        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn test_spills_past_inline_capacity() {
        let mut params = Params::new();
        for i in 0..8 {
            params.insert(format!("k{i}"), format!("v{i}"));
        }
        assert_eq!(params.len(), 8);
        assert_eq!(params.get("k6"), Some("v6"));
    }
}
