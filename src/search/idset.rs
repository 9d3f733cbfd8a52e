//! Ordered identifier sets.

use std::collections::HashSet;

use serde::Serialize;

use crate::store::Uid;

/// An ordered, duplicate-free list of message identifiers.
///
/// Set operations keep the order of the left-hand operand, so a set that came
/// from a sorted source stays sorted after filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdSet {
    ids: Vec<Uid>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[Uid] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = Uid> + '_ {
        self.ids.iter().copied()
    }

    pub fn into_vec(self) -> Vec<Uid> {
        self.ids
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.ids.contains(&uid)
    }

    /// Members of `self` that are also in `other`, in `self`'s order.
    pub fn intersect(&self, other: &IdSet) -> IdSet {
        let keep: HashSet<Uid> = other.iter().collect();
        self.retain_members(&keep)
    }

    /// Members of `self` that are not in `other`, in `self`'s order.
    pub fn difference(&self, other: &IdSet) -> IdSet {
        let drop: HashSet<Uid> = other.iter().collect();
        IdSet {
            ids: self.iter().filter(|uid| !drop.contains(uid)).collect(),
        }
    }

    /// Append the members of `other` not already present.
    pub fn union_with(&mut self, other: &IdSet) {
        let mut seen: HashSet<Uid> = self.iter().collect();
        for uid in other.iter() {
            if seen.insert(uid) {
                self.ids.push(uid);
            }
        }
    }

    /// Reorder: the members of `self` in the order they appear in `order`.
    ///
    /// Members absent from `order` are dropped; this is how a native sort of
    /// the whole mailbox is narrowed to a search result.
    pub fn ordered_by(&self, order: &[Uid]) -> IdSet {
        let members: HashSet<Uid> = self.iter().collect();
        order.iter().copied().filter(|uid| members.contains(uid)).collect()
    }

    fn retain_members(&self, keep: &HashSet<Uid>) -> IdSet {
        IdSet {
            ids: self.iter().filter(|uid| keep.contains(uid)).collect(),
        }
    }
}

impl FromIterator<Uid> for IdSet {
    /// Collect identifiers, dropping repeats after their first occurrence.
    fn from_iter<I: IntoIterator<Item = Uid>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        IdSet {
            ids: iter.into_iter().filter(|uid| seen.insert(*uid)).collect(),
        }
    }
}

impl From<Vec<Uid>> for IdSet {
    fn from(ids: Vec<Uid>) -> Self {
        ids.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = Uid;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Uid>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[Uid]) -> IdSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_collect_drops_duplicates_keeping_first() {
        assert_eq!(set(&[3, 1, 3, 2, 1]).as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn test_intersect_keeps_left_order() {
        let left = set(&[5, 3, 1, 4]);
        let right = set(&[1, 4, 5]);
        assert_eq!(left.intersect(&right).as_slice(), &[5, 1, 4]);
    }

    #[test]
    fn test_difference() {
        assert_eq!(set(&[1, 2, 3, 4]).difference(&set(&[2, 4])).as_slice(), &[1, 3]);
        assert_eq!(set(&[1, 2]).difference(&IdSet::new()).as_slice(), &[1, 2]);
    }

    #[test]
    fn test_union_appends_new_members() {
        let mut acc = set(&[2, 7]);
        acc.union_with(&set(&[7, 1, 2, 9]));
        assert_eq!(acc.as_slice(), &[2, 7, 1, 9]);
    }

    #[test]
    fn test_ordered_by_filters_sort_order() {
        let result = set(&[1, 2, 5]);
        assert_eq!(result.ordered_by(&[5, 3, 1, 4, 2]).as_slice(), &[5, 1, 2]);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        assert_eq!(serde_json::to_string(&set(&[4, 2])).unwrap(), "[4,2]");
    }
}
