use fnv::FnvBuildHasher;
use std::collections::{hash_map::Entry, HashMap};
use std::hash::{BuildHasher, Hash};

/// A capacity-bounded map that evicts its Least Recently Used entry. Here, "used" means read
/// through `get` or written through `insert`.
///
/// Lookups go through a hash map keyed by the full key, which points at a slot in a doubly-linked
/// recency list stored in a `Vec`. Slots of evicted entries are recycled, so the list never holds
/// more than `capacity` values.
#[derive(Clone, Debug)]
pub struct LruCache<K, V, H = FnvBuildHasher> {
    capacity: usize,
    slots: HashMap<K, usize, H>,
    order: RecencyList<(K, V)>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V, FnvBuildHasher> {
    pub fn new(capacity: usize) -> Self {
        Self::with_hasher(capacity, FnvBuildHasher::default())
    }
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq + Clone,
    H: BuildHasher,
{
    /// `capacity` must be at least 1.
    pub fn with_hasher(capacity: usize, hasher_builder: H) -> Self {
        assert!(capacity > 0, "an LRU cache needs room for at least one entry");

        LruCache {
            capacity,
            slots: HashMap::with_capacity_and_hasher(capacity, hasher_builder),
            order: RecencyList::with_capacity(capacity),
        }
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.slots.get(key)?;
        self.order.move_to_front(slot);

        Some(&self.order.get(slot).1)
    }

    /// Looks up `key` without touching the recency order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.slots.get(key).map(|&slot| &self.order.get(slot).1)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Inserts `val` as the most recently used entry.
    ///
    /// Replacing an existing key promotes it and does not evict anything. Otherwise, when the
    /// cache is full, the least recently used entry is removed *before* the new one goes in, and
    /// is returned.
    pub fn insert(&mut self, key: K, val: V) -> Option<(K, V)> {
        if let Some(&slot) = self.slots.get(&key) {
            self.order.move_to_front(slot);
            self.order.replace(slot, (key, val));

            return None;
        }

        let evicted = if self.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        match self.slots.entry(key) {
            Entry::Vacant(vacant) => {
                let key = vacant.key().clone();
                vacant.insert(self.order.push_front((key, val)));
            }
            Entry::Occupied(_) => unreachable!("key was checked above"),
        }

        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slots.remove(key)?;

        Some(self.order.remove(slot).1)
    }

    /// Removes and returns the least recently used entry.
    pub fn evict_lru(&mut self) -> Option<(K, V)> {
        let (key, val) = self.order.pop_back()?;
        self.slots.remove(&key);

        Some((key, val))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.order.iter_front_to_back().map(|(k, _)| k)
    }
}

/// Doubly-linked list using Vec as storage.
#[derive(Clone, Debug)]
struct RecencyList<T> {
    cells: Vec<Cell<T>>,
}

#[derive(Clone, Debug)]
struct Cell<T> {
    value: Option<T>,
    next: usize,
    prev: usize,
}

/// Free and occupied cells are each linked into a cyclic list with one auxiliary cell.
/// Cell #0 heads the list of free cells, cell #1 heads the list of occupied cells. The front of
/// the occupied list is the most recently used value.
impl<T> RecencyList<T> {
    const FREE: usize = 0;
    const OCCUPIED: usize = 1;

    fn with_capacity(capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity + 2);
        cells.push(Cell {
            value: None,
            next: Self::FREE,
            prev: Self::FREE,
        });
        cells.push(Cell {
            value: None,
            next: Self::OCCUPIED,
            prev: Self::OCCUPIED,
        });

        RecencyList { cells }
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.cells[index].prev;
        let next = self.cells[index].next;
        self.cells[prev].next = next;
        self.cells[next].prev = prev;
    }

    fn link_after(&mut self, index: usize, prev: usize) {
        let next = self.cells[prev].next;
        self.cells[index].prev = prev;
        self.cells[index].next = next;
        self.cells[prev].next = index;
        self.cells[next].prev = index;
    }

    fn move_to_front(&mut self, index: usize) {
        self.unlink(index);
        self.link_after(index, Self::OCCUPIED);
    }

    fn push_front(&mut self, value: T) -> usize {
        let index = if self.cells[Self::FREE].next == Self::FREE {
            self.cells.push(Cell {
                value: None,
                next: Self::FREE,
                prev: Self::FREE,
            });

            self.cells.len() - 1
        } else {
            let recycled = self.cells[Self::FREE].next;
            self.unlink(recycled);

            recycled
        };
        self.cells[index].value = Some(value);
        self.link_after(index, Self::OCCUPIED);

        index
    }

    fn remove(&mut self, index: usize) -> T {
        self.unlink(index);
        self.link_after(index, Self::FREE);

        self.cells[index].value.take().expect("removed an empty cell")
    }

    fn pop_back(&mut self) -> Option<T> {
        let back = self.cells[Self::OCCUPIED].prev;
        if back == Self::OCCUPIED {
            return None;
        }

        Some(self.remove(back))
    }

    fn get(&self, index: usize) -> &T {
        self.cells[index].value.as_ref().expect("read an empty cell")
    }

    fn replace(&mut self, index: usize, value: T) -> Option<T> {
        self.cells[index].value.replace(value)
    }

    fn iter_front_to_back(&self) -> impl Iterator<Item = &T> {
        let mut cursor = self.cells[Self::OCCUPIED].next;

        std::iter::from_fn(move || {
            if cursor == Self::OCCUPIED {
                return None;
            }
            let cell = &self.cells[cursor];
            cursor = cell.next;

            cell.value.as_ref()
        })
    }

    fn clear(&mut self) {
        self.cells.truncate(2);
        self.cells[Self::FREE].next = Self::FREE;
        self.cells[Self::FREE].prev = Self::FREE;
        self.cells[Self::OCCUPIED].next = Self::OCCUPIED;
        self.cells[Self::OCCUPIED].prev = Self::OCCUPIED;
    }
}
