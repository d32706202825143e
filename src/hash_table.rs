use alloc::alloc::handle_alloc_error;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::slice;

use log::debug;
use log::warn;

use crate::allocator::Allocator;
use crate::allocator::Global;
use crate::bitmask;
use crate::bitmask::OccupiedScan;
use crate::error::Error;
use crate::hash::fold;

cfg_if::cfg_if! {
    if #[cfg(feature = "density-ninety-seven")] {
        /// Maximum load factor used when none is given at construction.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.97;
    } else if #[cfg(feature = "density-ninety-two")] {
        /// Maximum load factor used when none is given at construction.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.92;
    } else {
        /// Maximum load factor used when none is given at construction.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.875;
    }
}

/// Index of a slot within the slot array.
type SlotIndex = u32;

const MIN_BUCKETS: usize = 8;
const MAX_BUCKETS: usize = 1 << 31;

/// Fixed-point scale of the stored load factor.
const LOAD_FACTOR_SHIFT: u32 = 27;

/// Maximum load factor, kept as `2^27 / max_load_factor` so the growth
/// threshold is an integer division.
#[derive(Debug, Clone, Copy)]
struct LoadFactor {
    value: f32,
    inverse: u64,
}

impl LoadFactor {
    fn new(value: f32) -> Result<Self, Error> {
        if !(value > 0.2 && value < 0.9999) {
            debug!("rejected max load factor {value}");
            return Err(Error::InvalidLoadFactor(value));
        }

        let exact = (1u64 << LOAD_FACTOR_SHIFT) as f64 / value as f64;
        // Rounded up, so the threshold never exceeds `buckets * value`.
        let mut inverse = exact as u64;
        if (inverse as f64) < exact {
            inverse += 1;
        }
        Ok(Self { value, inverse })
    }

    /// Number of entries a table with `buckets` slots accepts before growing.
    /// Always leaves at least one slot empty.
    #[inline]
    fn max_filled(self, buckets: usize) -> usize {
        let limit = ((buckets as u64) << LOAD_FACTOR_SHIFT) / self.inverse;
        (limit as usize).min(buckets - 1)
    }

    /// Smallest power-of-two bucket count that holds `entries`.
    fn buckets_for(self, entries: usize) -> Result<usize, Error> {
        let mut buckets = MIN_BUCKETS;
        while self.max_filled(buckets) < entries {
            if buckets >= MAX_BUCKETS {
                return Err(Error::CapacityOverflow);
            }
            buckets *= 2;
        }
        Ok(buckets)
    }
}

/// One cell of the slot array.
///
/// `link` is always initialized. For an occupied slot it names the next slot
/// of its chain, or the slot itself at the chain's tail. For an empty slot it
/// is stale and never followed.
struct Slot<K, V> {
    link: SlotIndex,
    entry: MaybeUninit<(K, V)>,
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    bitmask_offset: usize,
}

impl DataLayout {
    fn new<K, V>(buckets: usize) -> Result<Self, Error> {
        let slots = Layout::array::<Slot<K, V>>(buckets).map_err(|_| Error::CapacityOverflow)?;
        let words = Layout::array::<u64>(bitmask::word_count(buckets))
            .map_err(|_| Error::CapacityOverflow)?;
        let (layout, bitmask_offset) = slots.extend(words).map_err(|_| Error::CapacityOverflow)?;

        Ok(DataLayout {
            layout,
            bitmask_offset,
        })
    }
}

#[cold]
#[inline(never)]
fn infallible(error: Error) -> ! {
    match error {
        Error::OutOfMemory { layout } => handle_alloc_error(layout),
        other => panic!("{other}"),
    }
}

/// Where a missing key will be placed.
#[derive(Debug, Clone, Copy)]
enum Vacancy {
    /// The key's home slot is empty.
    Home(usize),
    /// The home slot holds a guest from the chain rooted at `main`; the guest
    /// moves out and the key takes its home slot.
    Evict { home: usize, main: usize },
    /// The home slot starts the key's own chain; a free slot is linked after
    /// `tail`.
    Append { tail: usize },
}

enum Probe {
    Found(usize),
    Vacant(Vacancy),
}

/// How a matched entry is unlinked from its chain when removed by key.
pub(crate) trait ErasePolicy {
    /// Removes the first entry of the chain starting at the occupied slot
    /// `home` whose key satisfies `eq`.
    fn take<K, V, A: Allocator>(
        table: &mut HashTable<K, V, A>,
        home: usize,
        eq: impl Fn(&K) -> bool,
    ) -> Option<(K, V)>;
}

/// Closes the gap left by the removed entry by pulling its successor back,
/// keeping the order of the rest of the chain.
pub(crate) struct ShiftBack;

/// Moves the chain's tail entry into the removed entry's slot, so only the
/// tail slot is vacated.
pub(crate) struct SwapTail;

impl ErasePolicy for ShiftBack {
    fn take<K, V, A: Allocator>(
        table: &mut HashTable<K, V, A>,
        home: usize,
        eq: impl Fn(&K) -> bool,
    ) -> Option<(K, V)> {
        let mut prev = None;
        let mut current = home;
        // SAFETY: `home` is occupied and `successor` only yields occupied slots.
        while !eq(unsafe { table.key_at(current) }) {
            prev = Some(current);
            current = table.successor(current)?;
        }

        // SAFETY: `current` is occupied, and `prev` (if any) links to it.
        unsafe {
            Some(match prev {
                None => table.pull_successor(current).0,
                Some(prev) => table.unlink_after(prev, current),
            })
        }
    }
}

impl ErasePolicy for SwapTail {
    fn take<K, V, A: Allocator>(
        table: &mut HashTable<K, V, A>,
        home: usize,
        eq: impl Fn(&K) -> bool,
    ) -> Option<(K, V)> {
        let mut prev = None;
        let mut found = home;
        // SAFETY: `home` is occupied and `successor` only yields occupied slots.
        while !eq(unsafe { table.key_at(found) }) {
            prev = Some(found);
            found = table.successor(found)?;
        }

        let mut tail_prev = prev;
        let mut tail = found;
        while let Some(next) = table.successor(tail) {
            tail_prev = Some(tail);
            tail = next;
        }

        // SAFETY: `found` and `tail` are occupied members of the walked chain,
        // and each `prev` links to the slot after it.
        unsafe {
            match tail_prev {
                Some(tail_prev) if tail != found => {
                    let removed = table.vacate(found);
                    table.relocate(tail, found);
                    table.set_link(tail_prev, tail_prev);
                    Some(removed)
                }
                Some(prev) => {
                    table.set_link(prev, prev);
                    Some(table.vacate(found))
                }
                None => Some(table.vacate(found)),
            }
        }
    }
}

/// Debug statistics for chain analysis.
///
/// Available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries in the table
    pub populated: usize,
    /// Entries accepted before the next growth
    pub capacity: usize,
    /// Number of slots
    pub buckets: usize,
    /// Occupied slots that are their entry's home slot
    pub main_slots: usize,
    /// Length of the longest chain
    pub longest_chain: usize,
    /// Load factor (populated / buckets)
    pub load_factor: f64,
    /// Average chain length (populated / main_slots)
    pub average_chain: f64,
    /// Total memory in bytes used by the table
    pub total_bytes: usize,
    /// Bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Coalesced Table Statistics ===");
        println!(
            "Population: {}/{} buckets ({:.2}% load factor, capacity {})",
            self.populated,
            self.buckets,
            self.load_factor * 100.0,
            self.capacity
        );
        println!(
            "Chains: {} ({:.3} entries each, longest {})",
            self.main_slots, self.average_chain, self.longest_chain
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes in empty slots ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// A hash table using coalesced hashing over a single slot array.
///
/// Every key has a *home* slot, `hash & (buckets - 1)`. Keys sharing a home
/// slot form a chain threaded through the array by per-slot links, and the
/// first member of a chain always sits in the home slot itself. When a new key
/// finds its home slot borrowed by a member of some other chain, that guest is
/// moved elsewhere first. An occupancy bitmask tracks which slots are live; it
/// drives the free-slot search and iteration.
///
/// The table does not store hashes. Operations that can restructure chains
/// take a `hasher` closure recomputing a key's hash, which must agree with the
/// `hash` passed for that key everywhere else.
///
/// ## Example
///
/// ```rust
/// # use core::hash::BuildHasher;
/// # use coal_hash::hash_table::Entry;
/// # use coal_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Default)]
/// # struct Sip;
/// # impl BuildHasher for Sip {
/// #     type Hasher = SipHasher;
/// #     fn build_hasher(&self) -> SipHasher {
/// #         SipHasher::new()
/// #     }
/// # }
/// let state = Sip;
/// let mut table: HashTable<u64, &str> = HashTable::with_capacity(100);
/// let hash = state.hash_one(123u64);
///
/// match table.entry(hash, |&k| k == 123, |k| state.hash_one(k)) {
///     Entry::Vacant(entry) => {
///         entry.insert(123, "Alice");
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
/// assert_eq!(table.find(hash, |&k| k == 123), Some((&123, &"Alice")));
/// ```
pub struct HashTable<K, V, A: Allocator = Global> {
    layout: DataLayout,
    ptr: NonNull<u8>,

    mask: usize,
    len: usize,
    max_filled: usize,
    load_factor: LoadFactor,
    probe_cursor: usize,

    allocator: A,
    _phantom: PhantomData<(K, V)>,
}

// SAFETY: The table owns its entries; sending it sends them.
unsafe impl<K: Send, V: Send, A: Allocator + Send> Send for HashTable<K, V, A> {}
// SAFETY: Shared access only hands out shared references to entries.
unsafe impl<K: Sync, V: Sync, A: Allocator + Sync> Sync for HashTable<K, V, A> {}

impl<K, V, A: Allocator> Debug for HashTable<K, V, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;

        let links = self
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                if self.is_vacant(index) {
                    String::from(".")
                } else if slot.link as usize == index {
                    format!("{index}")
                } else {
                    format!("{index}->{}", slot.link)
                }
            })
            .collect::<Vec<_>>();

        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("buckets", &self.buckets())
            .field("capacity", &self.max_filled)
            .field("max_load_factor", &self.load_factor.value)
            .field("links", &links)
            .finish()
    }
}

impl<K, V, A> Clone for HashTable<K, V, A>
where
    K: Clone,
    V: Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        let buckets = self.buckets();
        let (layout, ptr) = match Self::allocate(&self.allocator, buckets) {
            Ok(parts) => parts,
            Err(error) => infallible(error),
        };

        let mut table = Self {
            layout,
            ptr,
            mask: self.mask,
            len: 0,
            max_filled: self.max_filled,
            load_factor: self.load_factor,
            probe_cursor: self.probe_cursor,
            allocator: self.allocator.clone(),
            _phantom: PhantomData,
        };

        // Same bucket count, so every entry keeps its slot and link. `len` and
        // the bitmask advance together, so a panicking clone drops exactly the
        // entries written so far.
        let src = self.slots();
        let mut scan = OccupiedScan::new(self.words(), buckets);
        while let Some(index) = scan.next(self.words()) {
            // SAFETY: `index` is occupied in `self`.
            let (key, value) = unsafe { src[index].entry.assume_init_ref() };
            let entry = (key.clone(), value.clone());

            let (slots, words) = table.parts_mut();
            slots[index].link = src[index].link;
            slots[index].entry.write(entry);
            bitmask::set_occupied(words, index);
            table.len += 1;
        }

        debug_assert_eq!(table.len, self.len);
        table
    }
}

impl<K, V, A: Allocator> Drop for HashTable<K, V, A> {
    fn drop(&mut self) {
        if mem::needs_drop::<(K, V)>() && self.len > 0 {
            let buckets = self.buckets();
            let mut scan = OccupiedScan::new(self.words(), buckets);
            while let Some(index) = scan.next(self.words()) {
                // SAFETY: Occupied slots hold initialized entries, each dropped
                // once.
                unsafe { self.slots_mut()[index].entry.assume_init_drop() };
            }
        }

        // SAFETY: `ptr` was allocated by `allocator` with this layout.
        unsafe { self.allocator.deallocate(self.ptr, self.layout.layout) };
    }
}

impl<K, V> HashTable<K, V, Global> {
    /// Creates an empty table with the minimum number of buckets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let table: HashTable<u32, String> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 8);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity_in(0, Global)
    }

    /// Creates a table that holds at least `capacity` entries without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let table: HashTable<u32, String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.bucket_count().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<K, V> Default for HashTable<K, V, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, A: Allocator> HashTable<K, V, A> {
    /// Removal by key relocates the chain's tail instead of shifting entries
    /// back when moving entries around costs nothing extra to drop.
    const SWAP_TAIL: bool = !mem::needs_drop::<K>() && !mem::needs_drop::<V>();

    /// Creates an empty table backed by `allocator`.
    pub fn new_in(allocator: A) -> Self {
        Self::with_capacity_in(0, allocator)
    }

    /// Creates a table backed by `allocator` that holds at least `capacity`
    /// entries without growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if the allocator fails.
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Self {
        match Self::try_with_config(capacity, DEFAULT_MAX_LOAD_FACTOR, allocator) {
            Ok(table) => table,
            Err(error) => infallible(error),
        }
    }

    /// Creates a table with every knob given explicitly.
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
    /// # use coal_hash::Error;
    /// # use coal_hash::Global;
    /// # use coal_hash::hash_table::HashTable;
    /// let table = HashTable::<u64, u64>::try_with_config(1000, 0.5, Global).unwrap();
    /// assert!(table.capacity() >= 1000);
    /// assert_eq!(table.max_load_factor(), 0.5);
    ///
    /// let err = HashTable::<u64, u64>::try_with_config(10, 1.5, Global).unwrap_err();
    /// assert_eq!(err, Error::InvalidLoadFactor(1.5));
    /// ```
    pub fn try_with_config(
        capacity: usize,
        max_load_factor: f32,
        allocator: A,
    ) -> Result<Self, Error> {
        let load_factor = LoadFactor::new(max_load_factor)?;
        let buckets = load_factor.buckets_for(capacity)?;
        let (layout, ptr) = Self::allocate(&allocator, buckets)?;

        Ok(Self {
            layout,
            ptr,
            mask: buckets - 1,
            len: 0,
            max_filled: load_factor.max_filled(buckets),
            load_factor,
            probe_cursor: 0,
            allocator,
            _phantom: PhantomData,
        })
    }

    fn allocate(allocator: &A, buckets: usize) -> Result<(DataLayout, NonNull<u8>), Error> {
        debug_assert!(buckets.is_power_of_two() && buckets >= MIN_BUCKETS);
        let layout = DataLayout::new::<K, V>(buckets)?;
        let Some(ptr) = allocator.allocate(layout.layout) else {
            warn!(
                "failed to allocate {} buckets ({} bytes)",
                buckets,
                layout.layout.size()
            );
            return Err(Error::OutOfMemory {
                layout: layout.layout,
            });
        };

        let live = bitmask::live_bits(buckets);
        // SAFETY: The allocation is `layout.layout` bytes: `buckets` slots
        // followed by the bitmask words at `bitmask_offset`. Links and words
        // are written through raw pointers before any reference is formed.
        unsafe {
            let slots = ptr.cast::<Slot<K, V>>().as_ptr();
            for index in 0..buckets {
                (&raw mut (*slots.add(index)).link).write(index as SlotIndex);
            }

            let words = ptr.add(layout.bitmask_offset).cast::<u64>().as_ptr();
            for word in 0..bitmask::word_count(buckets) {
                words.add(word).write(live);
            }
        }

        Ok((layout, ptr))
    }

    #[inline(always)]
    fn buckets(&self) -> usize {
        self.mask + 1
    }

    #[inline(always)]
    fn slots(&self) -> &[Slot<K, V>] {
        // SAFETY: The allocation starts with `buckets` slots whose links are
        // always initialized; entries are `MaybeUninit`.
        unsafe { slice::from_raw_parts(self.ptr.cast::<Slot<K, V>>().as_ptr(), self.buckets()) }
    }

    #[inline(always)]
    fn slots_mut(&mut self) -> &mut [Slot<K, V>] {
        // SAFETY: As in `slots`, with exclusive access through `&mut self`.
        unsafe {
            slice::from_raw_parts_mut(self.ptr.cast::<Slot<K, V>>().as_ptr(), self.buckets())
        }
    }

    #[inline(always)]
    fn words(&self) -> &[u64] {
        // SAFETY: The bitmask words live at `bitmask_offset` and are
        // initialized on allocation.
        unsafe {
            slice::from_raw_parts(
                self.ptr.add(self.layout.bitmask_offset).cast::<u64>().as_ptr(),
                bitmask::word_count(self.buckets()),
            )
        }
    }

    #[inline(always)]
    fn words_mut(&mut self) -> &mut [u64] {
        // SAFETY: As in `words`, with exclusive access through `&mut self`.
        unsafe {
            slice::from_raw_parts_mut(
                self.ptr.add(self.layout.bitmask_offset).cast::<u64>().as_ptr(),
                bitmask::word_count(self.buckets()),
            )
        }
    }

    /// Slots and bitmask at once; the two regions do not overlap.
    #[inline(always)]
    fn parts_mut(&mut self) -> (&mut [Slot<K, V>], &mut [u64]) {
        let buckets = self.buckets();
        // SAFETY: See `slots` and `words`. The slot array ends at or before
        // `bitmask_offset`, so the slices are disjoint.
        unsafe {
            (
                slice::from_raw_parts_mut(self.ptr.cast::<Slot<K, V>>().as_ptr(), buckets),
                slice::from_raw_parts_mut(
                    self.ptr.add(self.layout.bitmask_offset).cast::<u64>().as_ptr(),
                    bitmask::word_count(buckets),
                ),
            )
        }
    }

    #[inline(always)]
    fn home(&self, hash: u64) -> usize {
        fold(hash) & self.mask
    }

    #[inline(always)]
    fn is_vacant(&self, index: usize) -> bool {
        bitmask::is_empty(self.words(), index)
    }

    /// The next slot of `index`'s chain, if any.
    ///
    /// A link to an empty slot ends the chain as well. Correct use never
    /// produces one, but a `Hash`/`Eq` pair that disagrees with itself can, and
    /// it must not lead to reading an empty slot.
    #[inline(always)]
    fn successor(&self, index: usize) -> Option<usize> {
        let next = self.slots()[index].link as usize;
        (next != index && !self.is_vacant(next)).then_some(next)
    }

    #[inline(always)]
    fn set_link(&mut self, index: usize, to: usize) {
        self.slots_mut()[index].link = to as SlotIndex;
    }

    /// # Safety
    /// `index` must be occupied.
    #[inline(always)]
    unsafe fn key_at(&self, index: usize) -> &K {
        // SAFETY: Caller guarantees the slot is occupied.
        unsafe { &self.slots()[index].entry.assume_init_ref().0 }
    }

    /// # Safety
    /// `index` must be occupied.
    #[inline(always)]
    unsafe fn entry_at(&self, index: usize) -> (&K, &V) {
        // SAFETY: Caller guarantees the slot is occupied.
        let (key, value) = unsafe { self.slots()[index].entry.assume_init_ref() };
        (key, value)
    }

    /// # Safety
    /// `index` must be occupied.
    #[inline(always)]
    unsafe fn entry_at_mut(&mut self, index: usize) -> (&K, &mut V) {
        // SAFETY: Caller guarantees the slot is occupied.
        let (key, value) = unsafe { self.slots_mut()[index].entry.assume_init_mut() };
        (key, value)
    }

    /// Writes `entry` into the empty slot `index` as a chain tail.
    fn occupy(&mut self, index: usize, entry: (K, V)) -> (&K, &mut V) {
        self.len += 1;
        let (slots, words) = self.parts_mut();
        let slot = &mut slots[index];
        slot.link = index as SlotIndex;
        let (key, value) = slot.entry.write(entry);
        bitmask::set_occupied(words, index);
        (key, value)
    }

    /// Moves the entry out of `index` and marks the slot empty. Links are the
    /// caller's business.
    ///
    /// # Safety
    /// `index` must be occupied.
    unsafe fn vacate(&mut self, index: usize) -> (K, V) {
        self.len -= 1;
        let (slots, words) = self.parts_mut();
        bitmask::set_empty(words, index);
        // SAFETY: Caller guarantees the slot was occupied; the bit is now
        // clear, so the entry is read exactly once.
        unsafe { slots[index].entry.assume_init_read() }
    }

    /// Moves the entry at `from` into the empty slot `to`, leaving `from`
    /// empty. `len` is unchanged and links are the caller's business.
    ///
    /// # Safety
    /// `from` must be occupied and `to` empty.
    unsafe fn relocate(&mut self, from: usize, to: usize) {
        let (slots, words) = self.parts_mut();
        // SAFETY: Caller guarantees `from` holds an entry and `to` does not.
        let entry = unsafe { slots[from].entry.assume_init_read() };
        slots[to].entry.write(entry);
        bitmask::set_empty(words, from);
        bitmask::set_occupied(words, to);
    }

    #[inline]
    fn find_empty(&mut self, from: usize) -> usize {
        let mut cursor = self.probe_cursor;
        let index = bitmask::find_empty(self.words(), from, &mut cursor);
        self.probe_cursor = cursor;
        index
    }

    fn tail(&self, index: usize) -> usize {
        let mut tail = index;
        while let Some(next) = self.successor(tail) {
            tail = next;
        }
        tail
    }

    /// The slot linking to `index` in the chain rooted at `main`, or `None` if
    /// `index` starts its chain.
    fn predecessor(&self, main: usize, index: usize) -> Option<usize> {
        if main == index || self.is_vacant(main) {
            return None;
        }

        let mut current = main;
        loop {
            let next = self.successor(current)?;
            if next == index {
                return Some(current);
            }
            current = next;
        }
    }

    fn find_index(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<usize> {
        let mut current = self.home(hash);
        if self.is_vacant(current) {
            return None;
        }

        loop {
            // SAFETY: `current` is the occupied home slot or a successor.
            if eq(unsafe { self.key_at(current) }) {
                return Some(current);
            }
            current = self.successor(current)?;
        }
    }

    fn probe(&self, hash: u64, eq: impl Fn(&K) -> bool, hasher: impl Fn(&K) -> u64) -> Probe {
        let home = self.home(hash);
        if self.is_vacant(home) {
            return Probe::Vacant(Vacancy::Home(home));
        }

        // SAFETY: `home` is occupied.
        let occupant = unsafe { self.key_at(home) };
        if eq(occupant) {
            return Probe::Found(home);
        }

        let main = self.home(hasher(occupant));
        if main != home {
            return Probe::Vacant(Vacancy::Evict { home, main });
        }

        let mut current = home;
        loop {
            match self.successor(current) {
                None => return Probe::Vacant(Vacancy::Append { tail: current }),
                Some(next) => current = next,
            }
            // SAFETY: `successor` only yields occupied slots.
            if eq(unsafe { self.key_at(current) }) {
                return Probe::Found(current);
            }
        }
    }

    /// Makes the slot picked by `vacancy` empty and reachable from its chain,
    /// and returns it. Must be followed by `occupy`.
    fn claim(&mut self, vacancy: Vacancy) -> usize {
        match vacancy {
            Vacancy::Home(home) => home,
            Vacancy::Evict { home, main } => match self.predecessor(main, home) {
                Some(prev) => {
                    self.evict(home, prev);
                    home
                }
                // The guest is not reachable from its own home; chain behind it.
                None => self.append(self.tail(home)),
            },
            Vacancy::Append { tail } => self.append(tail),
        }
    }

    /// Like `claim`, for a key known to be absent.
    fn claim_unique(&mut self, hash: u64, hasher: impl Fn(&K) -> u64) -> usize {
        let home = self.home(hash);
        if self.is_vacant(home) {
            return home;
        }

        // SAFETY: `home` is occupied.
        let main = self.home(hasher(unsafe { self.key_at(home) }));
        let vacancy = if main != home {
            Vacancy::Evict { home, main }
        } else {
            Vacancy::Append {
                tail: self.tail(home),
            }
        };
        self.claim(vacancy)
    }

    fn append(&mut self, tail: usize) -> usize {
        let new = self.find_empty(tail);
        self.set_link(tail, new);
        new
    }

    /// Moves the guest at `bucket` to a free slot, splicing it into its chain
    /// in place, and leaves `bucket` empty.
    fn evict(&mut self, bucket: usize, prev: usize) {
        let next = self.successor(bucket);
        let new = self.find_empty(next.unwrap_or(bucket));

        // SAFETY: `bucket` is occupied and `new` was just found empty.
        unsafe { self.relocate(bucket, new) };
        self.set_link(new, next.unwrap_or(new));
        self.set_link(prev, new);
    }

    /// Removes the first entry of a chain, pulling its successor (if any) back
    /// into the slot. Returns the entry and the slot left empty.
    ///
    /// # Safety
    /// `head` must be occupied.
    unsafe fn pull_successor(&mut self, head: usize) -> ((K, V), usize) {
        // SAFETY: Caller guarantees `head` is occupied.
        let removed = unsafe { self.vacate(head) };
        let Some(next) = self.successor(head) else {
            return (removed, head);
        };

        let after = self.successor(next).unwrap_or(head);
        // SAFETY: `next` is occupied and `head` was just emptied.
        unsafe { self.relocate(next, head) };
        self.set_link(head, after);
        (removed, next)
    }

    /// Removes the entry at `index`, which follows `prev` in its chain.
    ///
    /// # Safety
    /// `index` must be occupied.
    unsafe fn unlink_after(&mut self, prev: usize, index: usize) -> (K, V) {
        let next = self.successor(index).unwrap_or(prev);
        self.set_link(prev, next);
        // SAFETY: Caller guarantees `index` is occupied.
        unsafe { self.vacate(index) }
    }

    /// Removes the entry at `index` whose chain is rooted at `main`. Returns
    /// the entry and the slot that was left empty, which differs from `index`
    /// when a successor moved into it.
    ///
    /// # Safety
    /// `index` must be occupied.
    unsafe fn erase_at(&mut self, index: usize, main: usize) -> ((K, V), usize) {
        // SAFETY: Caller guarantees `index` is occupied.
        unsafe {
            match self.predecessor(main, index) {
                None => self.pull_successor(index),
                Some(prev) => (self.unlink_after(prev, index), index),
            }
        }
    }

    /// Returns the entry matching `eq`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, &str> = HashTable::new();
    /// table.insert_unique(42, 7, "seven", |&k| k);
    ///
    /// assert_eq!(table.find(42, |&k| k == 7), Some((&7, &"seven")));
    /// assert_eq!(table.find(42, |&k| k == 8), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &V)> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns occupied slots.
        Some(unsafe { self.entry_at(index) })
    }

    /// Returns the entry matching `eq` with a mutable value, if any.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &mut V)> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns occupied slots.
        Some(unsafe { self.entry_at_mut(index) })
    }

    /// Looks up a key, growing first if a missing key would not fit.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if growing fails to allocate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::Entry;
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, u32> = HashTable::new();
    /// for word in [3, 1, 3, 3] {
    ///     match table.entry(word, |&k| k == word, |&k| k) {
    ///         Entry::Occupied(mut entry) => *entry.get_mut() += 1,
    ///         Entry::Vacant(entry) => {
    ///             entry.insert(word, 1);
    ///         }
    ///     }
    /// }
    /// assert_eq!(table.find(3, |&k| k == 3), Some((&3, &3)));
    /// assert_eq!(table.find(1, |&k| k == 1), Some((&1, &1)));
    /// ```
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&K) -> bool,
        hasher: impl Fn(&K) -> u64,
    ) -> Entry<'_, K, V, A> {
        match self.try_entry(hash, eq, hasher) {
            Ok(entry) => entry,
            Err(error) => infallible(error),
        }
    }

    /// Fallible [`entry`](HashTable::entry). On error the table is unchanged.
    pub fn try_entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&K) -> bool,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<Entry<'_, K, V, A>, Error> {
        if self.len >= self.max_filled {
            if let Some(index) = self.find_index(hash, &eq) {
                return Ok(Entry::Occupied(OccupiedEntry {
                    home: self.home(hash),
                    index,
                    table: self,
                }));
            }
            self.grow(&hasher)?;
        }

        let home = self.home(hash);
        Ok(match self.probe(hash, eq, hasher) {
            Probe::Found(index) => Entry::Occupied(OccupiedEntry {
                table: self,
                index,
                home,
            }),
            Probe::Vacant(vacancy) => Entry::Vacant(VacantEntry {
                table: self,
                vacancy,
            }),
        })
    }

    /// Inserts an entry whose key is known to be absent, skipping the key
    /// comparisons.
    ///
    /// Inserting a key that is already present leaves both copies in the
    /// table; lookups then find one of them.
    pub fn insert_unique(
        &mut self,
        hash: u64,
        key: K,
        value: V,
        hasher: impl Fn(&K) -> u64,
    ) -> (&K, &mut V) {
        if self.len >= self.max_filled
            && let Err(error) = self.grow(&hasher)
        {
            infallible(error);
        }

        let index = self.claim_unique(hash, hasher);
        self.occupy(index, (key, value))
    }

    /// Removes and returns the entry matching `eq`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, char> = HashTable::new();
    /// table.insert_unique(5, 5, 'a', |&k| k);
    ///
    /// assert_eq!(table.remove(5, |&k| k == 5), Some((5, 'a')));
    /// assert_eq!(table.remove(5, |&k| k == 5), None);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        if Self::SWAP_TAIL {
            self.remove_with::<SwapTail>(hash, eq)
        } else {
            self.remove_with::<ShiftBack>(hash, eq)
        }
    }

    fn remove_with<P: ErasePolicy>(
        &mut self,
        hash: u64,
        eq: impl Fn(&K) -> bool,
    ) -> Option<(K, V)> {
        let home = self.home(hash);
        if self.is_vacant(home) {
            return None;
        }
        P::take(self, home, eq)
    }

    /// Keeps only the entries for which `keep` returns `true`, visiting each
    /// entry exactly once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, u64> = HashTable::new();
    /// for k in 0..100 {
    ///     table.insert_unique(k % 8, k, k * 10, |&k| k % 8);
    /// }
    ///
    /// table.retain(|&k, _| k % 3 == 0, |&k| k % 8);
    /// assert_eq!(table.len(), 34);
    /// assert!(table.iter().all(|(k, _)| k % 3 == 0));
    /// ```
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool, hasher: impl Fn(&K) -> u64) {
        let buckets = self.buckets();
        let mut index = 0;
        while index < buckets {
            if index % bitmask::WORD_BITS == 0
                && self.words()[index / bitmask::WORD_BITS] == bitmask::live_bits(buckets)
            {
                index += bitmask::WORD_BITS;
                continue;
            }
            if self.is_vacant(index) {
                index += 1;
                continue;
            }

            // SAFETY: `index` is occupied.
            let (key, value) = unsafe { self.entry_at_mut(index) };
            if keep(key, value) {
                index += 1;
                continue;
            }

            let hash = hasher(key);
            let main = self.home(hash);
            // SAFETY: `index` is occupied.
            let (removed, vacated) = unsafe { self.erase_at(index, main) };
            drop(removed);
            // A successor from further on now sits at `index`; look again.
            if vacated <= index {
                index += 1;
            }
        }
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.probe_cursor = 0;
        let buckets = self.buckets();
        if !mem::needs_drop::<(K, V)>() {
            bitmask::fill_empty(self.words_mut(), buckets);
            self.len = 0;
            return;
        }

        let live = bitmask::live_bits(buckets);
        for word in 0..bitmask::word_count(buckets) {
            let mut bits = !self.words()[word] & live;
            if bits == 0 {
                continue;
            }

            self.words_mut()[word] = live;
            self.len -= bits.count_ones() as usize;
            while bits != 0 {
                let index = word * bitmask::WORD_BITS + bits.trailing_zeros() as usize;
                bits &= bits - 1;
                // SAFETY: The slot was occupied and its bit is already clear.
                unsafe { self.slots_mut()[index].entry.assume_init_drop() };
            }
        }
    }

    /// Makes room for at least `additional` more entries without growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if the allocator fails.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&K) -> u64) {
        if let Err(error) = self.try_reserve(additional, hasher) {
            infallible(error);
        }
    }

    /// Fallible [`reserve`](HashTable::reserve). On error the table is
    /// unchanged.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<(), Error> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if needed <= self.max_filled {
            return Ok(());
        }

        let buckets = self.load_factor.buckets_for(needed)?;
        self.resize(buckets, &hasher)
    }

    /// Rebuilds the table with at least `buckets` buckets, or more if the
    /// current entries need them. Always rebuilds, even at the same size.
    pub fn rehash(&mut self, buckets: usize, hasher: impl Fn(&K) -> u64) {
        if let Err(error) = self.try_rehash(buckets, hasher) {
            infallible(error);
        }
    }

    /// Fallible [`rehash`](HashTable::rehash). On error the table is
    /// unchanged.
    pub fn try_rehash(&mut self, buckets: usize, hasher: impl Fn(&K) -> u64) -> Result<(), Error> {
        if buckets > MAX_BUCKETS {
            return Err(Error::CapacityOverflow);
        }
        let buckets = buckets
            .next_power_of_two()
            .max(self.load_factor.buckets_for(self.len)?);
        self.resize(buckets, &hasher)
    }

    /// Rebuilds the table with the fewest buckets that hold its entries. Does
    /// nothing if it already has that many.
    pub fn shrink_to_fit(&mut self, hasher: impl Fn(&K) -> u64) {
        if let Err(error) = self.try_shrink_to_fit(hasher) {
            infallible(error);
        }
    }

    /// Fallible [`shrink_to_fit`](HashTable::shrink_to_fit). On error the
    /// table is unchanged.
    pub fn try_shrink_to_fit(&mut self, hasher: impl Fn(&K) -> u64) -> Result<(), Error> {
        let buckets = self.load_factor.buckets_for(self.len)?;
        if buckets == self.buckets() {
            return Ok(());
        }
        self.resize(buckets, &hasher)
    }

    /// Changes the maximum load factor, growing the table if its entries no
    /// longer fit under the new one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidLoadFactor`] if `max_load_factor` is outside
    /// `(0.2, 0.9999)`, or the error of the growth it triggers. In both cases
    /// the table is unchanged.
    pub fn set_max_load_factor(
        &mut self,
        max_load_factor: f32,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<(), Error> {
        let load_factor = LoadFactor::new(max_load_factor)?;
        let buckets = load_factor.buckets_for(self.len)?;
        let previous = mem::replace(&mut self.load_factor, load_factor);

        if buckets > self.buckets() {
            if let Err(error) = self.resize(buckets, &hasher) {
                self.load_factor = previous;
                return Err(error);
            }
        } else {
            self.max_filled = load_factor.max_filled(self.buckets());
        }
        Ok(())
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self, hasher: impl Fn(&K) -> u64) -> Result<(), Error> {
        let buckets = self.buckets();
        if buckets >= MAX_BUCKETS {
            return Err(Error::CapacityOverflow);
        }
        self.resize(buckets * 2, hasher)
    }

    /// Moves every entry into a fresh allocation of `buckets` slots.
    ///
    /// The new buffer is allocated before anything moves, so an allocation
    /// failure leaves the table untouched. If `hasher` panics midway, the
    /// entries not yet moved are leaked along with the old buffer.
    fn resize(&mut self, buckets: usize, hasher: impl Fn(&K) -> u64) -> Result<(), Error> {
        debug_assert!(self.load_factor.max_filled(buckets) >= self.len);
        let (layout, ptr) = Self::allocate(&self.allocator, buckets)?;

        debug!(
            "rebuilding table: {} -> {} buckets, {} entries",
            self.buckets(),
            buckets,
            self.len
        );

        let old_buckets = self.buckets();
        let old_layout = mem::replace(&mut self.layout, layout);
        let old_ptr = mem::replace(&mut self.ptr, ptr);
        self.mask = buckets - 1;
        self.len = 0;
        self.max_filled = self.load_factor.max_filled(buckets);
        self.probe_cursor = 0;

        // SAFETY: The old buffer is no longer reachable from `self`; its
        // occupied entries are read out exactly once and the buffer is freed
        // without dropping anything.
        unsafe {
            let old_slots = slice::from_raw_parts(old_ptr.cast::<Slot<K, V>>().as_ptr(), old_buckets);
            let old_words = slice::from_raw_parts(
                old_ptr.add(old_layout.bitmask_offset).cast::<u64>().as_ptr(),
                bitmask::word_count(old_buckets),
            );

            let mut scan = OccupiedScan::new(old_words, old_buckets);
            while let Some(index) = scan.next(old_words) {
                let entry = old_slots[index].entry.assume_init_read();
                let target = self.claim_unique(hasher(&entry.0), &hasher);
                self.occupy(target, entry);
            }

            self.allocator.deallocate(old_ptr, old_layout.layout);
        }

        Ok(())
    }

    /// Returns an iterator over the entries in slot order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, u64> = HashTable::new();
    /// for k in 0..4 {
    ///     table.insert_unique(k, k, k * k, |&k| k);
    /// }
    ///
    /// let mut squares: Vec<u64> = table.iter().map(|(_, v)| *v).collect();
    /// squares.sort();
    /// assert_eq!(squares, [0, 1, 4, 9]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        let words = self.words();
        Iter {
            slots: self.slots(),
            words,
            scan: OccupiedScan::new(words, self.buckets()),
            remaining: self.len,
        }
    }

    /// Returns an iterator over the entries with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let buckets = self.buckets();
        let remaining = self.len;
        let (slots, words) = self.parts_mut();
        let words: &[u64] = words;
        IterMut {
            slots: NonNull::from(slots).cast(),
            words,
            scan: OccupiedScan::new(words, buckets),
            remaining,
            _phantom: PhantomData,
        }
    }

    /// Removes every entry and yields it. The table is empty as soon as this
    /// returns, whether or not the iterator is consumed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, String> = HashTable::new();
    /// table.insert_unique(1, 1, "a".to_string(), |&k| k);
    /// table.insert_unique(2, 2, "b".to_string(), |&k| k);
    ///
    /// let drained: Vec<(u64, String)> = table.drain().collect();
    /// assert_eq!(drained.len(), 2);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, A> {
        let buckets = self.buckets();
        let words: Vec<u64> = self.words().to_vec();
        let remaining = mem::replace(&mut self.len, 0);
        self.probe_cursor = 0;
        bitmask::fill_empty(self.words_mut(), buckets);

        Drain {
            scan: OccupiedScan::new(&words, buckets),
            words,
            remaining,
            table: self,
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of entries the table accepts before growing.
    pub fn capacity(&self) -> usize {
        self.max_filled
    }

    /// Returns the number of slots; always a power of two.
    pub fn bucket_count(&self) -> usize {
        self.buckets()
    }

    /// Returns the largest bucket count the table can grow to.
    pub fn max_bucket_count(&self) -> usize {
        MAX_BUCKETS
    }

    /// Returns the most entries the table can hold at the current maximum
    /// load factor.
    pub fn max_capacity(&self) -> usize {
        self.load_factor.max_filled(MAX_BUCKETS)
    }

    /// Returns `len / bucket_count`.
    pub fn load_factor(&self) -> f32 {
        self.len as f32 / self.buckets() as f32
    }

    /// Returns the configured maximum load factor.
    pub fn max_load_factor(&self) -> f32 {
        self.load_factor.value
    }

    /// Returns the allocator backing the table.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Counts occupied slots that are the home slot of their entry, which is
    /// the number of chains.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn main_slot_count(&self, hasher: impl Fn(&K) -> u64) -> usize {
        self.iter_indexes()
            // SAFETY: `iter_indexes` yields occupied slots.
            .filter(|&index| self.home(hasher(unsafe { self.key_at(index) })) == index)
            .count()
    }

    /// Returns the length of the chain rooted at `bucket`: zero if the slot is
    /// empty or holds an entry from another chain.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn bucket_size(&self, bucket: usize, hasher: impl Fn(&K) -> u64) -> usize {
        let bucket = bucket & self.mask;
        if self.is_vacant(bucket) {
            return 0;
        }
        // SAFETY: `bucket` is occupied.
        if self.home(hasher(unsafe { self.key_at(bucket) })) != bucket {
            return 0;
        }

        let mut size = 1;
        let mut current = bucket;
        while let Some(next) = self.successor(current) {
            size += 1;
            current = next;
        }
        size
    }

    /// Computes a histogram of chain lengths: entry `n` counts the chains with
    /// `n + 1` entries.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn chain_histogram(&self, hasher: impl Fn(&K) -> u64) -> Vec<usize> {
        let mut hist = Vec::new();
        for index in self.iter_indexes() {
            let size = self.bucket_size(index, &hasher);
            if size == 0 {
                continue;
            }
            if hist.len() < size {
                hist.resize(size, 0);
            }
            hist[size - 1] += 1;
        }
        hist
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self, hasher: impl Fn(&K) -> u64) -> DebugStats {
        let hist = self.chain_histogram(&hasher);
        let main_slots: usize = hist.iter().sum();
        let buckets = self.buckets();

        DebugStats {
            populated: self.len,
            capacity: self.max_filled,
            buckets,
            main_slots,
            longest_chain: hist.len(),
            load_factor: self.len as f64 / buckets as f64,
            average_chain: if main_slots == 0 {
                0.0
            } else {
                self.len as f64 / main_slots as f64
            },
            total_bytes: self.layout.layout.size(),
            wasted_bytes: (buckets - self.len) * mem::size_of::<Slot<K, V>>(),
        }
    }

    /// Pretty-prints the chain-length histogram horizontally to stdout.
    ///
    /// Requires the `stats` and `std` features.
    #[cfg(all(any(test, feature = "stats"), feature = "std"))]
    pub fn print_chain_histogram(&self, hasher: impl Fn(&K) -> u64) {
        let hist = self.chain_histogram(hasher);
        let max = hist.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("chain histogram: empty");
            return;
        }

        let max_bar = 60usize;
        println!("chain histogram ({} entries):", self.len);
        for (i, &count) in hist.iter().enumerate() {
            let width = (count * max_bar).div_ceil(max);
            println!("{:>3} | {} ({})", i + 1, "#".repeat(width), count);
        }
    }

    #[cfg(any(test, feature = "stats"))]
    fn iter_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        let words = self.words();
        let mut scan = OccupiedScan::new(words, self.buckets());
        core::iter::from_fn(move || scan.next(words))
    }

    /// Checks every structural invariant, panicking on the first violation.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self, hasher: impl Fn(&K) -> u64) {
        let buckets = self.buckets();
        assert!(buckets.is_power_of_two() && buckets >= MIN_BUCKETS);
        assert_eq!(self.mask, buckets - 1);
        assert_eq!(bitmask::count_occupied(self.words(), buckets), self.len);
        assert!(self.len <= self.max_filled && self.max_filled < buckets);
        assert!(self.len as f64 <= buckets as f64 * self.load_factor.value as f64);
        assert_eq!(self.iter().count(), self.len);

        let mut incoming = alloc::vec![0usize; buckets];
        for index in self.iter_indexes() {
            let link = self.slots()[index].link as usize;
            assert!(!self.is_vacant(link), "slot {index} links to empty slot {link}");
            if link != index {
                incoming[link] += 1;
            }
        }

        for index in self.iter_indexes() {
            // SAFETY: `iter_indexes` yields occupied slots.
            let main = self.home(hasher(unsafe { self.key_at(index) }));
            assert!(!self.is_vacant(main), "chain of {index} has no root {main}");
            // SAFETY: `main` is occupied.
            let root = self.home(hasher(unsafe { self.key_at(main) }));
            assert_eq!(root, main, "home slot {main} holds a guest");
            assert_eq!(incoming[main], 0, "home slot {main} is linked from elsewhere");

            let mut current = main;
            let mut steps = 0;
            while current != index {
                let next = self.slots()[current].link as usize;
                assert_ne!(next, current, "slot {index} unreachable from {main}");
                current = next;
                steps += 1;
                assert!(steps <= self.len, "cycle in chain of {main}");
            }
        }

        assert!(incoming.iter().all(|&n| n <= 1));
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, K, V, A: Allocator = Global> {
    /// The key is not present in the table
    Vacant(VacantEntry<'a, K, V, A>),
    /// The key is present in the table
    Occupied(OccupiedEntry<'a, K, V, A>),
}

impl<'a, K, V, A: Allocator> Entry<'a, K, V, A> {
    /// Inserts the entry built by `default` if vacant, and returns the value.
    ///
    /// `default` must produce the key that was looked up.
    pub fn or_insert_with(self, default: impl FnOnce() -> (K, V)) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (key, value) = default();
                entry.insert(key, value).1
            }
        }
    }

    /// Applies `f` to the value if occupied. Vacant entries are returned
    /// unchanged.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }
}

/// A view into a vacant entry in the table.
///
/// The slot for the key is chosen during the lookup but nothing moves until
/// [`insert`](VacantEntry::insert) is called, so dropping this leaves the
/// table as it was.
pub struct VacantEntry<'a, K, V, A: Allocator = Global> {
    table: &'a mut HashTable<K, V, A>,
    vacancy: Vacancy,
}

impl<'a, K, V, A: Allocator> VacantEntry<'a, K, V, A> {
    /// Inserts the entry and returns references to it.
    ///
    /// `key` must be the key that was looked up.
    pub fn insert(self, key: K, value: V) -> (&'a K, &'a mut V) {
        let table = self.table;
        let index = table.claim(self.vacancy);
        table.occupy(index, (key, value))
    }
}

/// A view into an occupied entry in the table.
pub struct OccupiedEntry<'a, K, V, A: Allocator = Global> {
    table: &'a mut HashTable<K, V, A>,
    index: usize,
    home: usize,
}

impl<'a, K, V, A: Allocator> OccupiedEntry<'a, K, V, A> {
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        // SAFETY: The entry's slot is occupied while `self` borrows the table.
        unsafe { self.table.key_at(self.index) }
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: The entry's slot is occupied while `self` borrows the table.
        unsafe { self.table.entry_at(self.index).1 }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: The entry's slot is occupied while `self` borrows the table.
        unsafe { self.table.entry_at_mut(self.index).1 }
    }

    /// Converts the entry into a mutable reference to its value.
    pub fn into_mut(self) -> &'a mut V {
        let table = self.table;
        // SAFETY: The entry's slot is occupied.
        unsafe { table.entry_at_mut(self.index).1 }
    }

    /// Removes the entry from the table and returns it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use coal_hash::hash_table::Entry;
    /// # use coal_hash::hash_table::HashTable;
    /// let mut table: HashTable<u64, &str> = HashTable::new();
    /// table.insert_unique(9, 9, "nine", |&k| k);
    ///
    /// if let Entry::Occupied(entry) = table.entry(9, |&k| k == 9, |&k| k) {
    ///     assert_eq!(entry.remove(), (9, "nine"));
    /// }
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(self) -> (K, V) {
        // SAFETY: The entry's slot is occupied; `home` roots its chain.
        unsafe { self.table.erase_at(self.index, self.home).0 }
    }
}

/// An iterator over the entries of a [`HashTable`], in slot order.
///
/// This struct is created by [`HashTable::iter`].
pub struct Iter<'a, K, V> {
    slots: &'a [Slot<K, V>],
    words: &'a [u64],
    scan: OccupiedScan,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            words: self.words,
            scan: self.scan.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.scan.next(self.words)?;
        self.remaining -= 1;
        // SAFETY: The scan only yields occupied slots.
        let (key, value) = unsafe { self.slots[index].entry.assume_init_ref() };
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter_mut`].
pub struct IterMut<'a, K, V> {
    slots: NonNull<Slot<K, V>>,
    words: &'a [u64],
    scan: OccupiedScan,
    remaining: usize,
    _phantom: PhantomData<&'a mut (K, V)>,
}

// SAFETY: Behaves like `&'a mut [(K, V)]`.
unsafe impl<K: Send, V: Send> Send for IterMut<'_, K, V> {}
// SAFETY: Behaves like `&'a mut [(K, V)]`.
unsafe impl<K: Sync, V: Sync> Sync for IterMut<'_, K, V> {}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.scan.next(self.words)?;
        self.remaining -= 1;
        // SAFETY: The scan yields each occupied slot once, so the references
        // handed out never alias.
        let (key, value) = unsafe { (*self.slots.as_ptr().add(index)).entry.assume_init_mut() };
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::drain`]. Entries not consumed are
/// dropped with the iterator.
pub struct Drain<'a, K, V, A: Allocator = Global> {
    table: &'a mut HashTable<K, V, A>,
    words: Vec<u64>,
    scan: OccupiedScan,
    remaining: usize,
}

impl<K, V, A: Allocator> Drop for Drain<'_, K, V, A> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<K, V, A: Allocator> Iterator for Drain<'_, K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.scan.next(&self.words)?;
        self.remaining -= 1;
        // SAFETY: The snapshot marks the slots that were occupied when the
        // drain began; the table no longer claims them and each is read once.
        Some(unsafe { self.table.slots()[index].entry.assume_init_read() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Drain<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Drain<'_, K, V, A> {}

/// An owning iterator over the entries of a [`HashTable`].
pub struct IntoIter<K, V, A: Allocator = Global> {
    table: HashTable<K, V, A>,
    scan: OccupiedScan,
}

impl<K, V, A: Allocator> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.scan.next(self.table.words())?;
        // SAFETY: The scan only yields occupied slots; vacating clears the bit
        // so the table's drop skips it.
        Some(unsafe { self.table.vacate(index) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IntoIter<K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IntoIter<K, V, A> {}

impl<K, V, A: Allocator> IntoIterator for HashTable<K, V, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        let scan = OccupiedScan::new(self.words(), self.buckets());
        IntoIter { table: self, scan }
    }
}

impl<'a, K, V, A: Allocator> IntoIterator for &'a HashTable<K, V, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, A: Allocator> IntoIterator for &'a mut HashTable<K, V, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
