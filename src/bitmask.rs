//! Occupancy bitmask shared by the slot array.
//!
//! One bit per slot, stored in 64-bit words. A *set* bit marks an empty slot,
//! so the free-slot search can use `trailing_zeros` on the raw word and the
//! occupied-slot scan uses it on the inverted word. Bits past the last slot
//! (only present when there are fewer than 64 slots) are kept clear so the
//! free-slot search can never return them.

pub(crate) const WORD_BITS: usize = u64::BITS as usize;

/// Number of words needed to cover `buckets` slots.
#[inline(always)]
pub(crate) const fn word_count(buckets: usize) -> usize {
    buckets.div_ceil(WORD_BITS)
}

/// Mask of the bits in a word that correspond to real slots.
#[inline(always)]
pub(crate) const fn live_bits(buckets: usize) -> u64 {
    if buckets >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << buckets) - 1
    }
}

/// Marks every slot empty.
pub(crate) fn fill_empty(words: &mut [u64], buckets: usize) {
    let live = live_bits(buckets);
    for word in words.iter_mut() {
        *word = live;
    }
}

#[inline(always)]
pub(crate) fn is_empty(words: &[u64], index: usize) -> bool {
    (words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 != 0
}

#[inline(always)]
pub(crate) fn set_occupied(words: &mut [u64], index: usize) {
    debug_assert!(is_empty(words, index));
    words[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
}

#[inline(always)]
pub(crate) fn set_empty(words: &mut [u64], index: usize) {
    debug_assert!(!is_empty(words, index));
    words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
}

/// Number of occupied slots.
#[cfg(test)]
pub(crate) fn count_occupied(words: &[u64], buckets: usize) -> usize {
    let live = live_bits(buckets);
    words
        .iter()
        .map(|word| (!word & live).count_ones() as usize)
        .sum()
}

/// Returns the index of an empty slot, searching near `from` first.
///
/// The word holding `from` is tried at and above `from`; then the word two
/// ahead of it, which is still likely to share cache lines with the chain
/// being extended. Failing both, the scan resumes from `cursor` (a word index
/// persisted by the caller) and moves it forward word by word, also peeking at
/// the word half a table away, so repeated searches in a crowded table pick up
/// where the last one stopped instead of rescanning from scratch.
///
/// The table must contain at least one empty slot, otherwise this never
/// returns. `words.len()` must be a power of two and `cursor` below it.
#[inline]
pub(crate) fn find_empty(words: &[u64], from: usize, cursor: &mut usize) -> usize {
    let word = from / WORD_BITS;
    let bits = words[word] >> (from % WORD_BITS);
    if bits != 0 {
        return from + bits.trailing_zeros() as usize;
    }

    let word_mask = words.len() - 1;
    let ahead = (word + 2) & word_mask;
    if words[ahead] != 0 {
        return ahead * WORD_BITS + words[ahead].trailing_zeros() as usize;
    }

    find_empty_from_cursor(words, cursor)
}

#[cold]
#[inline(never)]
fn find_empty_from_cursor(words: &[u64], cursor: &mut usize) -> usize {
    let word_mask = words.len() - 1;
    let half = words.len() / 2;
    loop {
        let bits = words[*cursor];
        if bits != 0 {
            return *cursor * WORD_BITS + bits.trailing_zeros() as usize;
        }

        let opposite = (*cursor + half) & word_mask;
        let bits = words[opposite];
        if bits != 0 {
            *cursor = opposite;
            return opposite * WORD_BITS + bits.trailing_zeros() as usize;
        }

        *cursor = (*cursor + 1) & word_mask;
    }
}

/// Forward scanner over occupied slot indexes, in increasing order.
///
/// Holds only the position; the words are passed to each [`next`] call so the
/// scanner can be embedded in iterators that hold the bitmask by pointer.
///
/// [`next`]: OccupiedScan::next
#[derive(Clone, Debug)]
pub(crate) struct OccupiedScan {
    word: usize,
    bits: u64,
    live: u64,
}

impl OccupiedScan {
    pub(crate) fn new(words: &[u64], buckets: usize) -> Self {
        let live = live_bits(buckets);
        Self {
            word: 0,
            bits: words.first().map_or(0, |w| !w & live),
            live,
        }
    }

    /// Next occupied index, skipping fully empty words in one step each.
    #[inline]
    pub(crate) fn next(&mut self, words: &[u64]) -> Option<usize> {
        while self.bits == 0 {
            self.word += 1;
            if self.word >= words.len() {
                self.word = words.len();
                return None;
            }
            self.bits = !words[self.word] & self.live;
        }

        let index = self.word * WORD_BITS + self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(index)
    }
}
