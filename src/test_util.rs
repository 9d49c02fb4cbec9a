use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// Asserts that both slices hold the same set of elements, ignoring order and repeats.
pub fn assert_elements_eq<T: Clone + Debug + Eq + Hash>(v1: &[T], v2: &[T]) {
    let set1: HashSet<T> = v1.iter().cloned().collect();
    let set2: HashSet<T> = v2.iter().cloned().collect();
    assert_eq!(set1, set2);
}
