use core::hash::BuildHasher;
use core::hash::Hasher;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used when none is specified.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Hasher builder used when none is specified.
        pub type DefaultHashBuilder = BuildIntHasher;
    }
}

/// Multiplier for the word-at-a-time accumulation in [`IntHasher`]; the
/// 64-bit golden ratio constant.
const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;

/// Avalanche mix for 64-bit integers (the splitmix64 finalizer).
///
/// Sequential integers differ only in their low bits, which is exactly the
/// part a power-of-two mask keeps. Running them through this mix spreads every
/// input bit over the whole word.
#[inline]
pub const fn hash64(key: u64) -> u64 {
    let mut x = key;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Light mixing applied by the bucket resolver to every incoming hash before
/// masking: folds the high half into the low half so hashers that only vary
/// their upper bits still spread over small tables.
#[inline(always)]
pub(crate) fn fold(hash: u64) -> usize {
    (hash ^ (hash >> 32)) as usize
}

/// Hasher tuned for integer keys.
///
/// Each integer write costs one rotate, xor and multiply; [`finish`] applies
/// [`hash64`] once. Byte slices are consumed eight bytes at a time, so string
/// keys work too, although a general purpose hasher distributes them better.
///
/// [`finish`]: Hasher::finish
#[derive(Debug, Clone, Copy, Default)]
pub struct IntHasher {
    state: u64,
}

impl IntHasher {
    #[inline(always)]
    fn add(&mut self, word: u64) {
        self.state = (self.state.rotate_left(5) ^ word).wrapping_mul(GOLDEN);
    }
}

impl Hasher for IntHasher {
    #[inline]
    fn finish(&self) -> u64 {
        hash64(self.state)
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks_exact(8);
        for chunk in &mut chunks {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            self.add(u64::from_le_bytes(word));
        }

        let rest = chunks.remainder();
        if !rest.is_empty() {
            let mut word = [0u8; 8];
            word[..rest.len()].copy_from_slice(rest);
            self.add(u64::from_le_bytes(word) ^ ((rest.len() as u64) << 56));
        }
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.add(i as u64);
    }

    #[inline]
    fn write_u16(&mut self, i: u16) {
        self.add(i as u64);
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.add(i as u64);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.add(i);
    }

    #[inline]
    fn write_u128(&mut self, i: u128) {
        self.add(i as u64);
        self.add((i >> 64) as u64);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.add(i as u64);
    }
}

/// Builds [`IntHasher`]s, optionally seeded.
///
/// # Examples
///
/// ```rust
/// use coal_hash::HashMap;
/// use coal_hash::hash::BuildIntHasher;
///
/// let mut map: HashMap<u64, &str, BuildIntHasher> = HashMap::default();
/// map.insert(7, "seven");
/// assert_eq!(map.get(&7), Some(&"seven"));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildIntHasher {
    seed: u64,
}

impl BuildIntHasher {
    /// Creates a builder whose hashers start from `seed`.
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

impl BuildHasher for BuildIntHasher {
    type Hasher = IntHasher;

    #[inline]
    fn build_hasher(&self) -> IntHasher {
        IntHasher { state: self.seed }
    }
}
