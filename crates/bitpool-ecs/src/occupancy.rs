//! Fixed-length occupancy bitmap used by [`ComponentPool`](crate::pool::ComponentPool).
//!
//! Bit `i` is set while slot `i` of the pool holds a live value. Searches for
//! a free slot walk the bitmap one 64-bit word at a time, so fully occupied
//! regions are skipped with a single comparison per 64 slots.

/// A bitmap of exactly `len` bits backed by `u64` words.
///
/// Bits past `len` in the last word are never set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyBitmap {
    words: Box<[u64]>,
    len: usize,
}

impl OccupancyBitmap {
    /// Creates a bitmap of `len` cleared bits.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
            len,
        }
    }

    /// Number of bits tracked.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitmap tracks zero bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets bit `index` to 1.
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] |= 1 << (index % 64);
    }

    /// Clears bit `index` to 0.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] &= !(1 << (index % 64));
    }

    /// Returns whether bit `index` is set. Out-of-range indices read as unset.
    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lowest unset bit at or after `start`, or `None` if every bit from
    /// `start` to the end is set.
    pub fn first_unset_from(&self, start: usize) -> Option<usize> {
        if start >= self.len {
            return None;
        }
        let mut word_idx = start / 64;
        // Bits below `start` in the first word are treated as occupied.
        let mut word = self.words[word_idx] | ((1u64 << (start % 64)) - 1);
        loop {
            if word != u64::MAX {
                let bit = word_idx * 64 + (!word).trailing_zeros() as usize;
                return (bit < self.len).then_some(bit);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Iterates over the indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let offset = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * 64 + offset)
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
