use linked_hash_map::LinkedHashMap;
use std::{fmt::Display, hash::Hash, iter::IntoIterator};
use thiserror::Error;

/// An insertion-ordered map that rejects duplicate keys. The compiler uses
/// this for every ordered name-to-thing mapping where a second binding for
/// the same name indicates a bug upstream: document values, projection
/// reshapes, and grouped accumulators.
#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub struct UniqueLinkedHashMap<K, V>(LinkedHashMap<K, V>)
where
    K: Hash + Eq + PartialEq + Display;

impl<K, V> Default for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + PartialEq + Display,
{
    fn default() -> Self {
        Self(LinkedHashMap::default())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate key found: {0}")]
pub struct DuplicateKeyError(pub String);

impl DuplicateKeyError {
    pub fn get_key_name(self) -> String {
        self.0
    }
}

impl<K, V> UniqueLinkedHashMap<K, V>
where
    K: Hash + PartialEq + Eq + Display,
{
    pub fn new() -> Self {
        Self(LinkedHashMap::new())
    }

    pub fn insert(&mut self, k: K, v: V) -> Result<(), DuplicateKeyError> {
        // Check before inserting so the error can carry the key, not the
        // value that displaced it.
        if self.0.contains_key(&k) {
            return Err(DuplicateKeyError(format!("{}", k)));
        }
        self.0.insert(k, v);
        Ok(())
    }

    pub fn insert_many(
        &mut self,
        other: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), DuplicateKeyError> {
        for (k, v) in other {
            self.insert(k, v)?;
        }
        Ok(())
    }

    /// Disjoint union of two maps, preserving `self`'s entries first.
    pub fn merge(mut self, other: Self) -> Result<Self, DuplicateKeyError> {
        self.insert_many(other)?;
        Ok(self)
    }

    pub fn get(&self, k: &K) -> Option<&V> {
        self.0.get(k)
    }

    pub fn remove(&mut self, k: &K) -> Option<V> {
        self.0.remove(k)
    }

    pub fn contains_key(&self, k: &K) -> bool {
        self.0.contains_key(k)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter()
    }

    /// Drop every entry whose key fails the predicate, preserving order.
    pub fn retain_keys(self, mut keep: impl FnMut(&K) -> bool) -> Self {
        Self(self.0.into_iter().filter(|(k, _)| keep(k)).collect())
    }
}

impl<K, V> IntoIterator for UniqueLinkedHashMap<K, V>
where
    K: Hash + PartialEq + Eq + Display,
{
    type Item = (K, V);
    type IntoIter = linked_hash_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a UniqueLinkedHashMap<K, V>
where
    K: Hash + PartialEq + Eq + Display,
{
    type Item = (&'a K, &'a V);
    type IntoIter = linked_hash_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K, V> From<LinkedHashMap<K, V>> for UniqueLinkedHashMap<K, V>
where
    K: Hash + Eq + PartialEq + Display,
{
    fn from(lhm: LinkedHashMap<K, V>) -> Self {
        Self(lhm)
    }
}

impl<K, V> From<UniqueLinkedHashMap<K, V>> for LinkedHashMap<K, V>
where
    K: Hash + Eq + PartialEq + Display,
{
    fn from(ulhm: UniqueLinkedHashMap<K, V>) -> Self {
        ulhm.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_preserves_order() {
        let mut m = UniqueLinkedHashMap::new();
        m.insert("z", 1).unwrap();
        m.insert("a", 2).unwrap();
        m.insert("m", 3).unwrap();
        assert_eq!(vec![&"z", &"a", &"m"], m.keys().collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_insert_is_an_error() {
        let mut m = UniqueLinkedHashMap::new();
        m.insert("a", 1).unwrap();
        assert_eq!(
            Err(DuplicateKeyError("a".to_string())),
            m.insert("a", 2)
        );
    }

    #[test]
    fn merge_disjoint_appends() {
        let mut l = UniqueLinkedHashMap::new();
        l.insert("a", 1).unwrap();
        let mut r = UniqueLinkedHashMap::new();
        r.insert("b", 2).unwrap();
        let merged = l.merge(r).unwrap();
        assert_eq!(vec![&"a", &"b"], merged.keys().collect::<Vec<_>>());
    }

    #[test]
    fn merge_overlapping_reports_key() {
        let mut l = UniqueLinkedHashMap::new();
        l.insert("a", 1).unwrap();
        let mut r = UniqueLinkedHashMap::new();
        r.insert("a", 2).unwrap();
        assert_eq!(Err(DuplicateKeyError("a".to_string())), l.merge(r));
    }

    #[test]
    fn retain_keys_preserves_order() {
        let mut m = UniqueLinkedHashMap::new();
        m.insert("a", 1).unwrap();
        m.insert("b", 2).unwrap();
        m.insert("c", 3).unwrap();
        let m = m.retain_keys(|k| *k != "b");
        assert_eq!(vec![&"a", &"c"], m.keys().collect::<Vec<_>>());
    }
}
