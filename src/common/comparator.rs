use std::cmp::Ordering;
use std::marker::PhantomData;

/// A total order over a key type, returning the usual three-way result.
///
/// Every `BPlusTree` instantiation in the original draft this crate is based
/// on is parameterized on a `KeyComparator` object rather than requiring
/// `Ord` directly; kept here as a thin trait so a caller with a non-default
/// ordering (e.g. descending, or a multi-column composite) isn't forced to
/// implement `Ord` on their key type.
pub trait KeyComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// The comparator used when a tree is built without specifying one:
/// defers to the key type's own `Ord` impl.
pub struct NaturalOrderComparator<K>(PhantomData<K>);

impl<K> NaturalOrderComparator<K> {
    pub fn new() -> Self {
        NaturalOrderComparator(PhantomData)
    }
}

impl<K> Default for NaturalOrderComparator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> KeyComparator<K> for NaturalOrderComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}
