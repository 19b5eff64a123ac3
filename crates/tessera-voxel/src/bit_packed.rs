//! Fixed-width palette indices packed into `u64` words.
//!
//! A width of zero stores nothing: every element reads back as index 0,
//! which is how uniform chunks avoid allocating any index storage.

use serde::{Deserialize, Serialize};

/// Widths a [`PackedIndices`] may use. Each divides 64, so no element ever
/// straddles a word boundary.
pub const SUPPORTED_WIDTHS: [u8; 5] = [0, 2, 4, 8, 16];

/// Compact array of palette indices, each `width` bits wide.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackedIndices {
    words: Vec<u64>,
    width: u8,
    len: usize,
}

impl PackedIndices {
    /// Creates `len` zeroed indices of the given width.
    pub fn zeroed(width: u8, len: usize) -> Self {
        debug_assert!(
            SUPPORTED_WIDTHS.contains(&width),
            "unsupported index width {width}"
        );
        let words = if width == 0 {
            Vec::new()
        } else {
            vec![0u64; (len * usize::from(width)).div_ceil(64)]
        };
        Self { words, width, len }
    }

    /// Word position and bit shift of element `i`.
    #[inline]
    fn locate(&self, i: usize) -> (usize, u32) {
        let per_word = 64 / usize::from(self.width);
        (i / per_word, ((i % per_word) * usize::from(self.width)) as u32)
    }

    #[inline]
    fn mask(&self) -> u64 {
        (1u64 << self.width) - 1
    }

    /// Reads element `i`.
    pub fn get(&self, i: usize) -> u16 {
        debug_assert!(i < self.len, "index {i} out of bounds ({})", self.len);
        if self.width == 0 {
            return 0;
        }
        let (word, shift) = self.locate(i);
        ((self.words[word] >> shift) & self.mask()) as u16
    }

    /// Writes element `i`. Writes to a zero-width array are dropped.
    pub fn set(&mut self, i: usize, value: u16) {
        debug_assert!(i < self.len, "index {i} out of bounds ({})", self.len);
        if self.width == 0 {
            return;
        }
        debug_assert!(
            u64::from(value) <= self.mask(),
            "value {value} does not fit in {} bits",
            self.width
        );
        let (word, shift) = self.locate(i);
        let mask = self.mask();
        let slot = &mut self.words[word];
        *slot = (*slot & !(mask << shift)) | (u64::from(value) << shift);
    }

    /// Returns a copy re-encoded at `width`, which must hold every stored value.
    pub fn rewidth(&self, width: u8) -> Self {
        let mut out = Self::zeroed(width, self.len);
        if self.width != 0 && width != 0 {
            for i in 0..self.len {
                out.set(i, self.get(i));
            }
        }
        out
    }

    /// Bits per element.
    pub fn width(&self) -> u8 {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_width_allocates_nothing() {
        let mut arr = PackedIndices::zeroed(0, 4096);
        arr.set(17, 0);
        assert_eq!(arr.get(4095), 0);
        assert!(arr.words.is_empty());
    }

    #[test]
    fn test_every_width_holds_its_maximum() {
        for &width in &SUPPORTED_WIDTHS[1..] {
            let max = ((1u32 << width) - 1) as u16;
            let mut arr = PackedIndices::zeroed(width, 100);
            arr.set(0, max);
            arr.set(99, max);
            arr.set(50, 1);
            assert_eq!(arr.get(0), max, "width {width}");
            assert_eq!(arr.get(99), max, "width {width}");
            assert_eq!(arr.get(50), 1, "width {width}");
            assert_eq!(arr.get(49), 0, "width {width}");
        }
    }

    #[test]
    fn test_neighbours_are_not_clobbered() {
        let mut arr = PackedIndices::zeroed(4, 32);
        for i in 0..32 {
            arr.set(i, 0xF);
        }
        arr.set(15, 0x3);
        assert_eq!(arr.get(14), 0xF);
        assert_eq!(arr.get(15), 0x3);
        assert_eq!(arr.get(16), 0xF);
    }

    #[test]
    fn test_rewidth_preserves_values() {
        let mut arr = PackedIndices::zeroed(2, 300);
        for i in 0..300 {
            arr.set(i, (i % 4) as u16);
        }
        let wide = arr.rewidth(8);
        assert_eq!(wide.width(), 8);
        for i in 0..300 {
            assert_eq!(wide.get(i), (i % 4) as u16);
        }
    }
}
