//! Resolution of named top-level declarations across imported modules.
use std::collections::HashMap;
use weft_xpath1::QualifiedName;

#[derive(Debug, Clone)]
struct Ranked<T> {
    precedence: usize,
    position: usize,
    value: T,
}

/// Declarations keyed by expanded name. The visible one has the highest import
/// precedence, then the latest declaration position.
#[derive(Debug, Clone)]
pub struct NamedTable<T> {
    entries: HashMap<QualifiedName, Vec<Ranked<T>>>,
}

impl<T> Default for NamedTable<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> NamedTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: QualifiedName, precedence: usize, position: usize, value: T) {
        self.entries.entry(name).or_default().push(Ranked {
            precedence,
            position,
            value,
        });
    }

    fn winner(candidates: &[Ranked<T>]) -> Option<&Ranked<T>> {
        candidates
            .iter()
            .max_by_key(|r| (r.precedence, r.position))
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&T> {
        self.entries
            .get(name)
            .and_then(|c| Self::winner(c))
            .map(|r| &r.value)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.entries.contains_key(name)
    }

    /// Names declared more than once at the winning precedence.
    pub fn conflicts(&self) -> Vec<&QualifiedName> {
        let mut names: Vec<&QualifiedName> = self
            .entries
            .iter()
            .filter(|(_, candidates)| {
                Self::winner(candidates).is_some_and(|top| {
                    candidates.iter().filter(|r| r.precedence == top.precedence).count() > 1
                })
            })
            .map(|(name, _)| name)
            .collect();
        names.sort_by_key(|n| n.to_string());
        names
    }

    /// The visible declaration of every name.
    pub fn winners(&self) -> impl Iterator<Item = (&QualifiedName, &T)> {
        self.entries
            .iter()
            .filter_map(|(name, c)| Self::winner(c).map(|r| (name, &r.value)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_then_position() {
        let mut table = NamedTable::new();
        let name = QualifiedName::local("t");
        table.insert(name.clone(), 2, 1, "main-early");
        table.insert(name.clone(), 1, 9, "imported");
        table.insert(name.clone(), 2, 5, "main-late");
        assert_eq!(table.get(&name), Some(&"main-late"));
        assert_eq!(table.conflicts(), vec![&name]);
    }

    #[test]
    fn test_imported_duplicate_is_not_a_conflict() {
        let mut table = NamedTable::new();
        let name = QualifiedName::new(Some("a"), "v", Some("urn:a"));
        table.insert(name.clone(), 1, 0, 1);
        table.insert(QualifiedName::new(Some("b"), "v", Some("urn:a")), 2, 1, 2);
        assert_eq!(table.get(&name), Some(&2));
        assert!(table.conflicts().is_empty());
        assert_eq!(table.len(), 1);
    }
}
