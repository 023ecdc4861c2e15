use std::cmp::Ordering;

/// Orders the keys of a tree. Shared by every thread using the tree.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;
}

/// Uses the key's own `Ord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl<K: Ord> KeyComparator<K> for DefaultComparator {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

impl<K, F> KeyComparator<K> for F
where
    F: Fn(&K, &K) -> Ordering + Send + Sync,
{
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        self(lhs, rhs)
    }
}
