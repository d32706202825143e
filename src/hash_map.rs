use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::allocator::Allocator;
use crate::allocator::Global;
use crate::error::Error;
use crate::hash::DefaultHashBuilder;
use crate::hash_table;
use crate::hash_table::HashTable;
pub use crate::hash_table::Drain;
pub use crate::hash_table::IntoIter;
pub use crate::hash_table::Iter;
pub use crate::hash_table::IterMut;

/// Returns a closure recomputing a stored key's hash, for the table operations
/// that move entries between chains.
fn make_hasher<K: Hash, S: BuildHasher>(hash_builder: &S) -> impl Fn(&K) -> u64 + '_ {
    move |key: &K| hash_builder.hash_one(key)
}

/// A hash map backed by a coalesced [`HashTable`].
///
/// `HashMap<K, V, S, A>` stores key-value pairs where keys implement
/// `Hash + Eq`, hashing them with the builder `S` and allocating its single
/// slot buffer from `A`. Lookups borrow the key the way the standard maps do,
/// so a `HashMap<String, _>` can be queried with a `&str`.
///
/// # Performance Characteristics
///
/// - **Memory**: one slot of `(K, V)` plus a 4-byte link per bucket, and one
///   bit per bucket for the occupancy bitmask. No hashes are stored.
/// - **Lookup**: one masked hash to the home slot, then a walk of that key's
///   chain only; chains of different home slots never merge.
///
/// # Examples
///
/// ```rust
/// use coal_hash::HashMap;
///
/// let mut scores: HashMap<&str, u32> = HashMap::new();
/// scores.insert("ada", 10);
/// scores.insert("grace", 12);
///
/// assert_eq!(scores.get("ada"), Some(&10));
/// assert_eq!(scores.count("linus"), 0);
/// assert_eq!(scores.len(), 2);
/// ```
///
/// Erasing while iterating is rejected at compile time:
///
/// ```rust,compile_fail
/// use coal_hash::HashMap;
///
/// let mut map: HashMap<u32, u32> = (0..8).map(|k| (k, k)).collect();
/// for (k, _) in map.iter() {
///     map.erase(k);
/// }
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S = DefaultHashBuilder, A: Allocator = Global> {
    table: HashTable<K, V, A>,
    hash_builder: S,
}

impl<K, V, S, A> Debug for HashMap<K, V, S, A>
where
    K: Debug,
    V: Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.table.iter()).finish()
    }
}

impl<K, V, S> HashMap<K, V, S, Global>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// use coal_hash::hash::BuildIntHasher;
    ///
    /// let mut map = HashMap::with_hasher(BuildIntHasher::default());
    /// map.insert(7u32, "seven");
    /// assert_eq!(map.get(&7), Some(&"seven"));
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map that holds at least `capacity` entries without
    /// growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// # use coal_hash::hash::BuildIntHasher;
    /// let map: HashMap<u64, String, _> =
    ///     HashMap::with_capacity_and_hasher(100, BuildIntHasher::default());
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_capacity_and_hasher_in(capacity, hash_builder, Global)
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    /// Creates an empty map using `allocator` for its slot buffer.
    pub fn with_capacity_and_hasher_in(capacity: usize, hash_builder: S, allocator: A) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, allocator),
            hash_builder,
        }
    }

    /// Creates a map with every knob given explicitly.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLoadFactor`] if `max_load_factor` is outside
    /// `(0.2, 0.9999)`, [`Error::CapacityOverflow`] if `capacity` cannot be
    /// represented, [`Error::OutOfMemory`] if the allocator fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::Global;
    /// # use coal_hash::HashMap;
    /// # use coal_hash::DefaultHashBuilder;
    /// let map: HashMap<u32, u32> =
    ///     HashMap::try_with_config(4, 0.875, DefaultHashBuilder::default(), Global).unwrap();
    /// assert_eq!(map.bucket_count(), 8);
    /// assert_eq!(map.max_load_factor(), 0.875);
    /// ```
    pub fn try_with_config(
        capacity: usize,
        max_load_factor: f32,
        hash_builder: S,
        allocator: A,
    ) -> Result<Self, Error> {
        Ok(Self {
            table: HashTable::try_with_config(capacity, max_load_factor, allocator)?,
            hash_builder,
        })
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map accepts before it grows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let map: HashMap<i32, i32> = HashMap::with_capacity(50);
    /// assert!(map.capacity() >= 50);
    /// assert!(map.capacity() < map.bucket_count());
    /// ```
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of slots; always a power of two.
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Returns the largest bucket count the map can grow to.
    pub fn max_bucket_count(&self) -> usize {
        self.table.max_bucket_count()
    }

    /// Returns the most entries the map can hold at its current maximum
    /// load factor.
    pub fn max_capacity(&self) -> usize {
        self.table.max_capacity()
    }

    /// Returns `len / bucket_count`.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Returns the configured maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Changes the maximum load factor, growing the map if its entries no
    /// longer fit under the new one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLoadFactor`] if `max_load_factor` is outside
    /// `(0.2, 0.9999)`; the error of the growth otherwise. The map is unchanged
    /// on error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::Error;
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, u32> = (0..100).map(|k| (k, k)).collect();
    ///
    /// map.set_max_load_factor(0.5).unwrap();
    /// assert!(map.load_factor() <= 0.5);
    ///
    /// assert_eq!(map.set_max_load_factor(1.0), Err(Error::InvalidLoadFactor(1.0)));
    /// assert_eq!(map.max_load_factor(), 0.5);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) -> Result<(), Error> {
        self.table.set_max_load_factor(max_load_factor, make_hasher(&self.hash_builder))
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns a reference to the map's allocator.
    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    /// Removes every entry, keeping the allocated buckets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u8, char> = HashMap::new();
    /// map.insert(1, 'a');
    /// let buckets = map.bucket_count();
    ///
    /// map.clear();
    /// assert!(map.is_empty());
    /// assert_eq!(map.bucket_count(), buckets);
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Makes room for at least `additional` more entries without growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) if the
    /// allocator fails.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional, make_hasher(&self.hash_builder));
    }

    /// Fallible [`reserve`](HashMap::reserve). On error the map is unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table.try_reserve(additional, make_hasher(&self.hash_builder))
    }

    /// Rebuilds the map with at least `buckets` buckets, or more if its
    /// entries need them.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, u32> = (0..10).map(|k| (k, k)).collect();
    /// map.rehash(200);
    /// assert_eq!(map.bucket_count(), 256);
    /// assert_eq!(map.get(&7), Some(&7));
    /// ```
    pub fn rehash(&mut self, buckets: usize) {
        self.table.rehash(buckets, make_hasher(&self.hash_builder));
    }

    /// Fallible [`rehash`](HashMap::rehash). On error the map is unchanged.
    pub fn try_rehash(&mut self, buckets: usize) -> Result<(), Error> {
        self.table.try_rehash(buckets, make_hasher(&self.hash_builder))
    }

    /// Shrinks the bucket count to the smallest one that holds the current
    /// entries.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit(make_hasher(&self.hash_builder));
    }

    /// Fallible [`shrink_to_fit`](HashMap::shrink_to_fit). On error the map is
    /// unchanged.
    pub fn try_shrink_to_fit(&mut self) -> Result<(), Error> {
        self.table.try_shrink_to_fit(make_hasher(&self.hash_builder))
    }

    /// Inserts `key` with `value` unless the key is present. Returns the value
    /// now stored under the key and whether the insertion happened; an
    /// existing value is left alone and the arguments are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<&str, i32> = HashMap::new();
    /// assert_eq!(map.emplace("a", 1), (&mut 1, true));
    /// assert_eq!(map.emplace("a", 2), (&mut 1, false));
    /// ```
    pub fn emplace(&mut self, key: K, value: V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(value), true),
        }
    }

    /// Inserts `key` with `value`, overwriting the value of a present key.
    /// Returns the stored value and `true` if the key was new.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<&str, i32> = HashMap::new();
    /// assert_eq!(map.insert_or_assign("a", 1), (&mut 1, true));
    /// assert_eq!(map.insert_or_assign("a", 2), (&mut 2, false));
    /// ```
    pub fn insert_or_assign(&mut self, key: K, value: V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => {
                let slot = entry.into_mut();
                *slot = value;
                (slot, false)
            }
            Entry::Vacant(entry) => (entry.insert(value), true),
        }
    }

    /// Inserts a key-value pair, returning the previous value of the key.
    ///
    /// The stored key is kept when the key was already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<i32, &str> = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map[&37], "b");
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Fallible [`insert`](HashMap::insert). On error the map is unchanged
    /// and `key` and `value` are dropped.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        match self.try_entry(key)? {
            Entry::Occupied(mut entry) => Ok(Some(entry.insert(value))),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(None)
            }
        }
    }

    /// Inserts a key that is known to be absent, skipping the equality checks.
    ///
    /// Inserting a key that is already present leaves both copies in the map;
    /// lookups then see one of them.
    pub fn insert_unique(&mut self, key: K, value: V) -> (&K, &mut V) {
        let hash = self.hash_builder.hash_one(&key);
        self.table.insert_unique(hash, key, value, make_hasher(&self.hash_builder))
    }

    /// Returns a reference to the value of the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<String, i32> = HashMap::new();
    /// map.insert("one".to_string(), 1);
    /// assert_eq!(map.get("one"), Some(&1));
    /// assert_eq!(map.get("two"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value of the key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |k| key.eq(k.borrow()))
    }

    /// Returns a mutable reference to the value of the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_mut(hash, |k| key.eq(k.borrow())).map(|(_, v)| v)
    }

    /// Returns a reference to the value of the key, or
    /// [`Error::KeyNotFound`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::Error;
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, &str> = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.at(&1), Ok(&"a"));
    /// assert_eq!(map.at(&2), Err(Error::KeyNotFound));
    /// ```
    pub fn at<Q>(&self, key: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns a mutable reference to the value of the key, or
    /// [`Error::KeyNotFound`].
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if the map contains the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns the number of entries with the key: `0` or `1`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Removes the key, returning whether it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, u32> = HashMap::new();
    /// map.insert(3, 9);
    /// assert!(map.erase(&3));
    /// assert!(!map.erase(&3));
    /// ```
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).is_some()
    }

    /// Removes the key, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the key, returning the stored key and value if it was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |k| key.eq(k.borrow()))
    }

    /// Keeps only the entries for which `keep` returns `true`. Every entry is
    /// visited exactly once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, u32> = (0..8).map(|k| (k, k * 10)).collect();
    /// map.retain(|&k, _| k % 2 == 0);
    /// assert_eq!(map.len(), 4);
    /// ```
    pub fn retain(&mut self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(keep, make_hasher(&self.hash_builder));
    }

    /// Gets the entry of `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut letters: HashMap<char, u32> = HashMap::new();
    /// for ch in "a short treatise on fungi".chars() {
    ///     *letters.entry(ch).or_insert(0) += 1;
    /// }
    ///
    /// assert_eq!(letters[&'s'], 2);
    /// assert_eq!(letters[&'t'], 3);
    /// assert_eq!(letters.get(&'y'), None);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, A> {
        let hash = self.hash_builder.hash_one(&key);
        let entry = self.table.entry(hash, |k| *k == key, make_hasher(&self.hash_builder));
        Entry::wrap(entry, key)
    }

    /// Fallible [`entry`](HashMap::entry): fails if making room for a missing
    /// key fails. On error the map is unchanged.
    pub fn try_entry(&mut self, key: K) -> Result<Entry<'_, K, V, A>, Error> {
        let hash = self.hash_builder.hash_one(&key);
        let entry = self.table.try_entry(hash, |k| *k == key, make_hasher(&self.hash_builder))?;
        Ok(Entry::wrap(entry, key))
    }

    /// Returns an iterator over the entries, in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.table.iter()
    }

    /// Returns an iterator over the entries with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.table.iter_mut()
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, u32> = HashMap::new();
    /// map.insert(1, 10);
    /// map.insert(2, 20);
    ///
    /// let total: u32 = map.values().sum();
    /// assert_eq!(total, 30);
    /// ```
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes every entry and yields it. The map is empty once this returns,
    /// whether or not the iterator is consumed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let mut map: HashMap<u32, &str> = HashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let pairs: Vec<_> = map.drain().collect();
    /// assert!(map.is_empty());
    /// assert_eq!(pairs.len(), 2);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, A> {
        self.table.drain()
    }

    /// Returns the number of chains.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn main_slot_count(&self) -> usize {
        self.table.main_slot_count(make_hasher(&self.hash_builder))
    }

    /// Returns the length of the chain rooted at `bucket`.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn bucket_size(&self, bucket: usize) -> usize {
        self.table.bucket_size(bucket, make_hasher(&self.hash_builder))
    }

    /// Returns the chain-length histogram: entry `n` counts chains of
    /// `n + 1` entries.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn chain_histogram(&self) -> alloc::vec::Vec<usize> {
        self.table.chain_histogram(make_hasher(&self.hash_builder))
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> hash_table::DebugStats {
        self.table.debug_stats(make_hasher(&self.hash_builder))
    }

    /// Pretty-prints the chain-length histogram to stdout.
    ///
    /// Requires the `stats` and `std` features.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_chain_histogram(&self) {
        self.table.print_chain_histogram(make_hasher(&self.hash_builder));
    }
}

impl<K, V, S> HashMap<K, V, S, Global>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty map using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::HashMap;
    /// let map: HashMap<i32, String> = HashMap::new();
    /// assert_eq!(map.len(), 0);
    /// assert_eq!(map.bucket_count(), 8);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map that holds at least `capacity` entries without
    /// growing, using the default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S, A> Default for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::with_capacity_and_hasher_in(0, S::default(), A::default())
    }
}

impl<K, V, S, A> PartialEq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    A: Allocator,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| v == ov))
    }
}

impl<K, V, S, A> Eq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    A: Allocator,
{
}

impl<K, Q, V, S, A> Index<&Q> for HashMap<K, V, S, A>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
    A: Allocator,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("{}", Error::KeyNotFound),
        }
    }
}

impl<K, V, S, A> Extend<(K, V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        // Duplicates are common in extend input; only trust the lower bound
        // fully when the map is empty.
        let hint = if self.is_empty() {
            iter.size_hint().0
        } else {
            iter.size_hint().0.div_ceil(2)
        };
        self.reserve(hint);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S, A> Extend<(&'a K, &'a V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S, Global>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S, A: Allocator> IntoIterator for HashMap<K, V, S, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.into_iter()
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a HashMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter()
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a mut HashMap<K, V, S, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, A: Allocator = Global> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, A>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, A>),
}

impl<'a, K, V, A: Allocator> Entry<'a, K, V, A> {
    fn wrap(entry: hash_table::Entry<'a, K, V, A>, key: K) -> Self {
        match entry {
            hash_table::Entry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            hash_table::Entry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value computed by `default` if the entry is vacant and
    /// returns a mutable reference to the value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V: Default, A: Allocator> Entry<'a, K, V, A> {
    /// Inserts the default value if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, A: Allocator = Global> {
    entry: hash_table::VacantEntry<'a, K, V, A>,
    key: K,
}

impl<'a, K, V, A: Allocator> VacantEntry<'a, K, V, A> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        self.entry.insert(self.key, value).1
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, A: Allocator = Global> {
    entry: hash_table::OccupiedEntry<'a, K, V, A>,
}

impl<'a, K, V, A: Allocator> OccupiedEntry<'a, K, V, A> {
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.entry.get()
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.entry.get_mut()
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        self.entry.into_mut()
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.entry.get_mut(), value)
    }

    /// Removes the entry and returns its value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry and returns the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a [`HashMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// An iterator over mutable references to the values of a [`HashMap`].
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    /// Sends every key to the same home slot.
    #[derive(Clone, Default)]
    struct ConstantHasher;

    impl Hasher for ConstantHasher {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _bytes: &[u8]) {}
    }

    impl BuildHasher for ConstantHasher {
        type Hasher = ConstantHasher;

        fn build_hasher(&self) -> Self::Hasher {
            ConstantHasher
        }
    }

    fn sip_map<K: Hash + Eq, V>() -> HashMap<K, V, SipHashBuilder> {
        HashMap::with_hasher(SipHashBuilder::default())
    }

    #[test]
    fn test_new_and_with_hasher() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);

        let map2 = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
        assert_eq!(map2.bucket_count(), 8);
    }

    #[test]
    fn test_with_capacity() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::with_capacity(100);
        assert!(map.capacity() >= 100);
        assert!(map.is_empty());

        let map2 =
            HashMap::<i32, String, _>::with_capacity_and_hasher(200, SipHashBuilder::default());
        assert!(map2.capacity() >= 200);
        assert!(map2.bucket_count().is_power_of_two());
    }

    #[test]
    fn test_try_with_config() {
        let map = HashMap::<u32, u32, _>::try_with_config(
            10,
            0.5,
            SipHashBuilder::default(),
            Global,
        )
        .unwrap();
        assert_eq!(map.max_load_factor(), 0.5);
        assert!(map.capacity() >= 10);

        for bad in [0.1, 0.9999, 1.0] {
            let result =
                HashMap::<u32, u32, _>::try_with_config(10, bad, SipHashBuilder::default(), Global);
            assert!(matches!(result, Err(Error::InvalidLoadFactor(_))));
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut map = sip_map();

        assert_eq!(map.insert(1, "alpha".to_string()), None);
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());

        assert_eq!(map.get(&1), Some(&"alpha".to_string()));
        assert_eq!(map.get(&2), None);

        assert_eq!(
            map.insert(1, "world".to_string()),
            Some("alpha".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"world".to_string()));
    }

    #[test]
    fn test_emplace_keeps_existing_value() {
        let mut map = sip_map();
        let (value, inserted) = map.emplace("k", 1);
        assert!(inserted);
        *value += 1;

        let (value, inserted) = map.emplace("k", 100);
        assert!(!inserted);
        assert_eq!(*value, 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_or_assign() {
        let mut map = sip_map();
        assert_eq!(map.insert_or_assign(5, 'a'), (&mut 'a', true));
        assert_eq!(map.insert_or_assign(5, 'b'), (&mut 'b', false));
        assert_eq!(map.get(&5), Some(&'b'));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_try_insert() {
        let mut map = sip_map();
        assert_eq!(map.try_insert(1, 10), Ok(None));
        assert_eq!(map.try_insert(1, 11), Ok(Some(10)));
        assert_eq!(map.get(&1), Some(&11));
    }

    #[test]
    fn test_insert_unique() {
        let mut map = sip_map();
        for k in 0..100u32 {
            let (key, value) = map.insert_unique(k, k * 2);
            assert_eq!((*key, *value), (k, k * 2));
        }
        assert_eq!(map.len(), 100);
        assert!((0..100).all(|k| map.get(&k) == Some(&(k * 2))));
    }

    #[test]
    fn test_get_mut() {
        let mut map = sip_map();
        map.insert(1, "alpha".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"alpha world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_get_key_value_and_borrowed_lookup() {
        let mut map = sip_map();
        map.insert("alpha".to_string(), 1);

        assert_eq!(map.get_key_value("alpha"), Some((&"alpha".to_string(), &1)));
        assert!(map.contains_key("alpha"));
        assert!(!map.contains_key("beta"));
        assert_eq!(map.remove("alpha"), Some(1));
    }

    #[test]
    fn test_size_limits() {
        let map: HashMap<u32, u32, SipHashBuilder> = sip_map();
        assert_eq!(map.max_bucket_count(), 1 << 31);
        assert!(map.max_capacity() < map.max_bucket_count());
        assert!(map.max_capacity() >= map.capacity());
    }

    #[test]
    fn test_at_and_index() {
        let mut map = sip_map();
        map.insert(1, 100);

        assert_eq!(map.at(&1), Ok(&100));
        assert_eq!(map.at(&2), Err(Error::KeyNotFound));
        *map.at_mut(&1).unwrap() += 1;
        assert_eq!(map.at_mut(&2), Err(Error::KeyNotFound));
        assert_eq!(map[&1], 101);
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn test_index_missing_key_panics() {
        let map: HashMap<u32, u32, SipHashBuilder> = HashMap::new();
        let _ = map[&3];
    }

    #[test]
    fn test_contains_key_and_count() {
        let mut map = sip_map();
        assert!(!map.contains_key(&1));
        assert_eq!(map.count(&1), 0);

        map.insert(1, "value".to_string());
        assert!(map.contains_key(&1));
        assert_eq!(map.count(&1), 1);
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_remove() {
        let mut map = sip_map();
        map.insert(1, "alpha".to_string());
        map.insert(2, "world".to_string());

        assert_eq!(map.remove(&1), Some("alpha".to_string()));
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));

        assert_eq!(map.remove(&1), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut map = sip_map();
        map.insert(7, 7);
        assert!(map.erase(&7));
        assert!(!map.erase(&7));
        assert!(!map.erase(&8));
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_entry() {
        let mut map = sip_map();
        map.insert(1, "alpha".to_string());

        assert_eq!(map.remove_entry(&1), Some((1, "alpha".to_string())));
        assert!(map.is_empty());
        assert_eq!(map.remove_entry(&1), None);
    }

    #[test]
    fn test_clear() {
        let mut map = sip_map();
        map.insert(1, "a".to_string());
        map.insert(2, "b".to_string());
        map.insert(3, "c".to_string());

        assert_eq!(map.len(), 3);
        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn test_reserve_and_shrink() {
        let mut map: HashMap<i32, String, SipHashBuilder> = HashMap::new();
        map.reserve(100);
        assert!(map.capacity() >= 100);

        map.insert(1, "uno".to_string());
        map.shrink_to_fit();
        assert_eq!(map.bucket_count(), 8);
        assert_eq!(map.get(&1), Some(&"uno".to_string()));

        assert_eq!(map.try_reserve(usize::MAX), Err(Error::CapacityOverflow));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_rehash() {
        let mut map = sip_map();
        for k in 0..20 {
            map.insert(k, k);
        }
        map.rehash(1000);
        assert_eq!(map.bucket_count(), 1024);
        map.try_rehash(0).unwrap();
        assert_eq!(map.bucket_count(), 32);
        assert!((0..20).all(|k| map.get(&k) == Some(&k)));
    }

    #[test]
    fn test_max_load_factor() {
        let mut map = sip_map();
        for k in 0..200 {
            map.insert(k, ());
        }

        map.set_max_load_factor(0.3).unwrap();
        assert!(map.load_factor() <= 0.3);
        assert_eq!(map.len(), 200);

        assert_eq!(
            map.set_max_load_factor(f32::NAN).map_err(|e| e.to_string()),
            Err("max load factor NaN is outside (0.2, 0.9999)".to_string())
        );
        assert_eq!(map.max_load_factor(), 0.3);
    }

    #[test]
    fn test_entry_api() {
        let mut map = sip_map();

        match map.entry(1) {
            Entry::Vacant(entry) => {
                entry.insert("first".to_string());
            }
            Entry::Occupied(_) => unreachable!("key 1 is absent"),
        }

        match map.entry(1) {
            Entry::Occupied(entry) => {
                assert_eq!(entry.get(), &"first".to_string());
            }
            Entry::Vacant(_) => unreachable!("key 1 is present"),
        }

        let value = map.entry(2).or_insert("second".to_string());
        assert_eq!(value, &"second".to_string());

        let value = map.entry(3).or_insert_with(|| "third".to_string());
        assert_eq!(value, &"third".to_string());

        map.entry(3).and_modify(|v| v.push('!'));
        assert_eq!(map.get(&3), Some(&"third!".to_string()));
        assert_eq!(map.entry(9).key(), &9);
    }

    #[test]
    fn test_entry_or_default() {
        let mut map: HashMap<i32, Vec<i32>, SipHashBuilder> = HashMap::new();

        map.entry(1).or_default().push(42);
        map.entry(1).or_default().push(43);

        assert_eq!(map.get(&1), Some(&vec![42, 43]));
    }

    #[test]
    fn test_occupied_entry() {
        let mut map = sip_map();
        map.insert(1, "original".to_string());

        match map.entry(1) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.get(), &"original".to_string());

                entry.get_mut().push_str(" modified");
                assert_eq!(entry.get(), &"original modified".to_string());

                let old = entry.insert("replaced".to_string());
                assert_eq!(old, "original modified".to_string());
            }
            Entry::Vacant(_) => unreachable!("key 1 is present"),
        }

        match map.entry(1) {
            Entry::Occupied(entry) => {
                assert_eq!(entry.remove_entry(), (1, "replaced".to_string()));
            }
            Entry::Vacant(_) => unreachable!("key 1 is present"),
        }
        assert!(map.is_empty());
    }

    #[test]
    fn test_vacant_entry() {
        let mut map: HashMap<i32, String, SipHashBuilder> = HashMap::new();

        match map.entry(1) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.into_key(), 1);
            }
            Entry::Occupied(_) => unreachable!("key 1 is absent"),
        }
        assert!(map.is_empty());

        match map.entry(1) {
            Entry::Vacant(entry) => {
                let value = entry.insert("inserted".to_string());
                assert_eq!(value, &"inserted".to_string());
            }
            Entry::Occupied(_) => unreachable!("key 1 is absent"),
        }
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_iterators() {
        let mut map = sip_map();
        map.insert(1, "uno".to_string());
        map.insert(2, "dos".to_string());
        map.insert(3, "three".to_string());

        let pairs: Vec<_> = map.iter().collect();
        assert_eq!(pairs.len(), 3);

        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(map.values().len(), 3);

        for value in map.values_mut() {
            value.make_ascii_uppercase();
        }
        for (_, value) in &mut map {
            value.push('.');
        }

        let mut values: Vec<_> = map.values().cloned().collect();
        values.sort();
        assert_eq!(values, ["DOS.", "THREE.", "UNO."]);

        let mut owned: Vec<_> = map.into_iter().collect();
        owned.sort();
        assert_eq!(owned[0], (1, "UNO.".to_string()));
    }

    #[test]
    fn test_drain() {
        let mut map = sip_map();
        map.insert(1, "uno".to_string());
        map.insert(2, "dos".to_string());

        let mut drained: Vec<_> = map.drain().collect();
        drained.sort();

        assert_eq!(drained, vec![(1, "uno".to_string()), (2, "dos".to_string())]);
        assert!(map.is_empty());
    }

    #[test]
    fn test_retain() {
        let mut map = sip_map();
        for k in 0..100 {
            map.insert(k, k);
        }

        let mut visited = 0;
        map.retain(|&k, v| {
            visited += 1;
            *v *= 2;
            k % 4 == 0
        });

        assert_eq!(visited, 100);
        assert_eq!(map.len(), 25);
        assert!(map.iter().all(|(k, v)| k % 4 == 0 && *v == k * 2));
    }

    #[test]
    fn test_clone_eq_and_debug() {
        let mut map = sip_map();
        map.insert(1, "a".to_string());

        let mut cloned = map.clone();
        assert_eq!(map, cloned);
        assert_eq!(format!("{map:?}"), r#"{1: "a"}"#);

        cloned.insert(2, "b".to_string());
        assert_ne!(map, cloned);
        cloned.remove(&2);
        cloned.insert(1, "c".to_string());
        assert_ne!(map, cloned);
    }

    #[test]
    fn test_extend_and_from_iter() {
        let mut map: HashMap<u32, u32, SipHashBuilder> = (0..10).map(|k| (k, k)).collect();
        map.extend((5..15).map(|k| (k, k + 100)));
        assert_eq!(map.len(), 15);
        assert_eq!(map[&4], 4);
        assert_eq!(map[&5], 105);

        let extra = [(20u32, 20u32)];
        map.extend(extra.iter().map(|(k, v)| (k, v)));
        assert_eq!(map[&20], 20);
    }

    #[test]
    fn test_default_and_take() {
        let mut map: HashMap<u32, u32, SipHashBuilder> = HashMap::default();
        map.insert(1, 1);

        let taken = core::mem::take(&mut map);
        assert_eq!(taken.len(), 1);
        assert!(map.is_empty());
        map.insert(2, 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_string_keys() {
        let mut map = sip_map();
        map.insert("apple".to_string(), 1);
        map.insert("banana".to_string(), 2);
        map.insert("cherry".to_string(), 3);

        assert_eq!(map.get("apple"), Some(&1));
        assert_eq!(map.get("banana"), Some(&2));
        assert_eq!(map.get("cherry"), Some(&3));
        assert_eq!(map.get("date"), None);
    }

    #[test]
    fn test_complex_values() {
        #[derive(Debug, Clone, PartialEq)]
        struct ComplexValue {
            id: u32,
            name: String,
            data: Vec<i32>,
        }

        let mut map = sip_map();
        let value = ComplexValue {
            id: 1,
            name: "test".to_string(),
            data: vec![1, 2, 3],
        };

        map.insert(1, value.clone());
        assert_eq!(map.get(&1), Some(&value));

        if let Some(v) = map.get_mut(&1) {
            v.data.push(4);
        }
        assert_eq!(map.get(&1).map(|v| v.data.len()), Some(4));
        assert_eq!(map.get(&1).map(|v| v.id), Some(1));
        assert_eq!(map.get(&1).map(|v| v.name.as_str()), Some("test"));
    }

    #[test]
    fn three_keys_from_small_capacity() {
        let mut map = HashMap::<u32, &str, _>::try_with_config(
            4,
            DEFAULT_LOAD_FACTOR,
            SipHashBuilder::default(),
            Global,
        )
        .unwrap();
        map.insert(1, "a");
        map.insert(2, "b");
        map.insert(3, "c");

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&2), Some(&"b"));

        let mut pairs: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort();
        assert_eq!(pairs, [(1, "a"), (2, "b"), (3, "c")]);

        // Same state, same order.
        let first: Vec<_> = map.iter().collect();
        let second: Vec<_> = map.iter().collect();
        assert_eq!(first, second);
    }

    const DEFAULT_LOAD_FACTOR: f32 = 0.875;

    #[test]
    fn sequential_keys_grow_through_powers_of_two() {
        let mut map = HashMap::<u64, u64, _>::try_with_config(
            4,
            DEFAULT_LOAD_FACTOR,
            SipHashBuilder::default(),
            Global,
        )
        .unwrap();

        let mut seen = vec![map.bucket_count()];
        for k in 0..1000u64 {
            map.insert(k, k);
            if *seen.last().unwrap() != map.bucket_count() {
                seen.push(map.bucket_count());
            }
            assert!(map.len() as f32 <= map.bucket_count() as f32 * DEFAULT_LOAD_FACTOR);
        }

        assert_eq!(map.len(), 1000);
        assert!(map.bucket_count() as f32 >= 1000.0 / DEFAULT_LOAD_FACTOR);
        assert!(seen.windows(2).all(|w| w[1] == w[0] * 2));
        assert!((0..1000).all(|k| map.get(&k) == Some(&k)));
        map.table.assert_invariants(make_hasher(&map.hash_builder));
    }

    #[test]
    fn reinsert_after_erase() {
        let mut map = sip_map();
        map.insert("k", 1);
        assert_eq!(map.remove("k"), Some(1));
        map.insert("k", 2);

        assert_eq!(map.get("k"), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn colliding_keys_share_one_chain() {
        let mut map: HashMap<u32, &str, ConstantHasher> = HashMap::new();
        map.insert(10, "first");
        map.insert(20, "second");

        assert_eq!(map.get(&10), Some(&"first"));
        assert_eq!(map.get(&20), Some(&"second"));
        assert_eq!(map.main_slot_count(), 1);
        assert_eq!(map.bucket_size(0), 2);

        assert_eq!(map.remove(&10), Some("first"));
        // The survivor now heads the chain at the shared home slot.
        assert_eq!(map.bucket_size(0), 1);
        assert_eq!(map.main_slot_count(), 1);
        assert_eq!(map.get(&20), Some(&"second"));
    }

    #[test]
    fn test_collision_handling() {
        let mut map: HashMap<u32, u32, ConstantHasher> = HashMap::new();
        for k in 0..50 {
            map.insert(k, k * k);
        }

        assert_eq!(map.chain_histogram().len(), 50);
        for k in (0..50).step_by(3) {
            assert_eq!(map.remove(&k), Some(k * k));
        }
        for k in 0..50 {
            assert_eq!(map.get(&k).is_some(), k % 3 != 0);
        }
        map.table.assert_invariants(make_hasher(&map.hash_builder));
    }

    #[test]
    fn test_debug_stats() {
        let mut map = sip_map();
        for k in 0..500u32 {
            map.insert(k, k);
        }

        let stats = map.debug_stats();
        assert_eq!(stats.populated, 500);
        assert_eq!(stats.buckets, map.bucket_count());
        assert_eq!(stats.main_slots, map.main_slot_count());
        assert!(stats.average_chain >= 1.0);
        assert_eq!(map.chain_histogram().iter().sum::<usize>(), stats.main_slots);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn random_operations_match_btreemap() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut map: HashMap<u32, u32, SipHashBuilder> = HashMap::new();
        let mut oracle = BTreeMap::new();

        for step in 0..20_000 {
            let key = rng.random_range(0..2_000u32);
            match rng.random_range(0..6) {
                0 | 1 => {
                    let value = rng.random::<u32>();
                    assert_eq!(map.insert(key, value), oracle.insert(key, value));
                }
                2 => assert_eq!(map.remove(&key), oracle.remove(&key)),
                3 => {
                    let (value, inserted) = map.emplace(key, step);
                    assert_eq!(inserted, !oracle.contains_key(&key));
                    assert_eq!(*value, *oracle.entry(key).or_insert(step));
                }
                4 => {
                    let value = map.entry(key).or_insert(0);
                    *value = value.wrapping_add(1);
                    let expected = oracle.entry(key).or_insert(0);
                    *expected = expected.wrapping_add(1);
                }
                _ => assert_eq!(map.get(&key), oracle.get(&key)),
            }
        }

        assert_eq!(map.len(), oracle.len());
        map.table.assert_invariants(make_hasher(&map.hash_builder));
        for (k, v) in &oracle {
            assert_eq!(map.get(k), Some(v));
        }
    }
}
