//! Growable bit vector used as the storage substrate for pointer-state graphs.
//!
//! Every edge relation of a [`Psg`][crate::psg::Psg] is a row of bits: bit `j`
//! of the `next` row of node `i` is set iff `i` points at `j`. Rows grow on
//! demand when a bit past the end is written, and binary operations treat the
//! shorter operand as zero-extended.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

/// A bit vector backed by a vector of u64 words.
///
/// The bit set tracks its *bit length* separately from the storage: the length
/// is the number of addressable bits and only grows when a bit at or past the
/// end is written. Bits at positions `>= len` are always zero in storage.
#[derive(Debug, Clone, Default, Eq)]
pub struct BitSet {
    /// Storage: each u64 holds 64 bits
    words: Vec<u64>,
    /// Number of addressable bits
    nbits: usize,
}

impl BitSet {
    /// Number of bits per word.
    const BITS_PER_WORD: usize = 64;

    /// Creates a new all-zero bit set of the given bit length.
    pub fn new(nbits: usize) -> Self {
        Self {
            words: vec![0; Self::words_for(nbits)],
            nbits,
        }
    }

    /// Creates an empty bit set of length zero.
    pub fn empty() -> Self {
        Self {
            words: Vec::new(),
            nbits: 0,
        }
    }

    #[inline]
    fn words_for(nbits: usize) -> usize {
        (nbits + Self::BITS_PER_WORD - 1) / Self::BITS_PER_WORD
    }

    /// Gets the word index and bit position for a given bit index.
    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        let word = index / Self::BITS_PER_WORD;
        let bit = index % Self::BITS_PER_WORD;
        (word, bit)
    }

    /// Returns the bit length.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.nbits
    }

    /// Grows the bit length to at least `nbits`. Never shrinks.
    pub fn grow(&mut self, nbits: usize) {
        if nbits > self.nbits {
            self.nbits = nbits;
            self.words.resize(Self::words_for(nbits), 0);
        }
    }

    /// Returns true if the bit at the given index is set.
    ///
    /// Reads past the end are defined as zero.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        if word_idx >= self.words.len() {
            return false;
        }
        let mask = 1u64 << bit_idx;
        (self.words[word_idx] & mask) != 0
    }

    /// Sets the bit at the given index. Returns true if the bit was not previously set.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        self.grow(index + 1);
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        let mask = 1u64 << bit_idx;
        let was_clear = (self.words[word_idx] & mask) == 0;
        self.words[word_idx] |= mask;
        was_clear
    }

    /// Clears the bit at the given index. Returns true if the bit was previously set.
    ///
    /// Like [`insert`][Self::insert], clearing past the end grows the bit set.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        self.grow(index + 1);
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        let mask = 1u64 << bit_idx;
        let was_set = (self.words[word_idx] & mask) != 0;
        self.words[word_idx] &= !mask;
        was_set
    }

    /// Clears all bits, keeping the bit length.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Returns true if any bit is set.
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        !self.any()
    }

    /// Population count.
    pub fn weight(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lowest set bit, including bit 0.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Lowest set bit, ignoring bit 0.
    pub fn first_excluding_zero(&self) -> Option<usize> {
        self.iter().find(|&i| i != 0)
    }

    /// Returns true if `self` and `other` share at least one set bit.
    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// Deletes bit `index`, shifting every higher bit down by one.
    ///
    /// The bit length shrinks by one when `index` was addressable.
    pub fn remove_index(&mut self, index: usize) {
        if index >= self.nbits {
            return;
        }
        let (word_idx, bit_idx) = Self::word_and_bit(index);

        // Within the first affected word: keep the low bits, shift the high ones.
        let word = self.words[word_idx];
        let low_mask = (1u64 << bit_idx) - 1;
        let high = if bit_idx == 63 { 0 } else { (word >> (bit_idx + 1)) << bit_idx };
        self.words[word_idx] = (word & low_mask) | high;

        // Every later word donates its lowest bit to the top of the previous one.
        for i in word_idx + 1..self.words.len() {
            let carry = self.words[i] & 1;
            self.words[i - 1] |= carry << (Self::BITS_PER_WORD - 1);
            self.words[i] >>= 1;
        }

        self.nbits -= 1;
        self.words.truncate(Self::words_for(self.nbits));
    }

    /// Extends the bit set by setting all bits from an iterator.
    pub fn extend(&mut self, iter: impl IntoIterator<Item = usize>) {
        for index in iter {
            self.insert(index);
        }
    }

    /// Returns an iterator over all set bit indices.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            bitset: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Zeroes the storage bits at positions `>= nbits`.
    fn mask_tail(&mut self) {
        let rem = self.nbits % Self::BITS_PER_WORD;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl PartialEq for BitSet {
    /// Bit sets are equal only if they have the same bit length and content.
    fn eq(&self, other: &Self) -> bool {
        self.nbits == other.nbits && self.words == other.words
    }
}

impl BitAnd for &BitSet {
    type Output = BitSet;

    fn bitand(self, rhs: Self) -> BitSet {
        let mut res = BitSet::new(self.nbits.max(rhs.nbits));
        for (i, (a, b)) in self.words.iter().zip(&rhs.words).enumerate() {
            res.words[i] = a & b;
        }
        res
    }
}

impl BitOr for &BitSet {
    type Output = BitSet;

    fn bitor(self, rhs: Self) -> BitSet {
        let mut res = BitSet::new(self.nbits.max(rhs.nbits));
        for (i, w) in res.words.iter_mut().enumerate() {
            *w = self.words.get(i).copied().unwrap_or(0) | rhs.words.get(i).copied().unwrap_or(0);
        }
        res
    }
}

impl BitAndAssign<&BitSet> for BitSet {
    fn bitand_assign(&mut self, rhs: &BitSet) {
        *self = &*self & rhs;
    }
}

impl BitOrAssign<&BitSet> for BitSet {
    fn bitor_assign(&mut self, rhs: &BitSet) {
        *self = &*self | rhs;
    }
}

impl Not for &BitSet {
    type Output = BitSet;

    /// Complement within the bit set's own length.
    fn not(self) -> BitSet {
        let mut res = BitSet {
            words: self.words.iter().map(|w| !w).collect(),
            nbits: self.nbits,
        };
        res.mask_tail();
        res
    }
}

impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.nbits {
            write!(f, "{}", if self.contains(i) { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// Error returned when parsing a bit string containing characters other than `0`/`1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBitSetError(pub char);

impl fmt::Display for ParseBitSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bit character {:?}", self.0)
    }
}

impl std::error::Error for ParseBitSetError {}

impl FromStr for BitSet {
    type Err = ParseBitSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bs = BitSet::new(s.chars().count());
        for (i, c) in s.chars().enumerate() {
            match c {
                '1' => {
                    bs.insert(i);
                }
                '0' => {}
                other => return Err(ParseBitSetError(other)),
            }
        }
        Ok(bs)
    }
}

/// Iterator over set bits in a BitSet.
pub struct BitSetIter<'a> {
    bitset: &'a BitSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit_idx = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1; // Clear lowest set bit
                return Some(self.word_idx * BitSet::BITS_PER_WORD + bit_idx);
            }

            self.word_idx += 1;
            if self.word_idx >= self.bitset.words.len() {
                return None;
            }
            self.current_word = self.bitset.words[self.word_idx];
        }
    }
}
