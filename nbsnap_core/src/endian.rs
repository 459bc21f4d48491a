use serde::{Deserialize, Serialize};

/// Byte order a snapshot file was (or will be) written in.
///
/// The format carries no endianness marker: the reader states the order it
/// expects and the codec swaps when that differs from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Whatever the host uses. Never swaps.
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    /// True when words in this order must be swapped to reach host order.
    pub fn needs_swap(self) -> bool {
        match self {
            ByteOrder::Native => false,
            ByteOrder::Little => cfg!(target_endian = "big"),
            ByteOrder::Big => cfg!(target_endian = "little"),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "native" | "n" => Some(ByteOrder::Native),
            "little" | "le" | "l" => Some(ByteOrder::Little),
            "big" | "be" | "b" => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Reverse the bytes of a single word in place.
///
/// Swaps `len / 2` pairs, so the middle byte of an odd-sized word stays put
/// and a 1-byte word is untouched.
#[inline]
pub fn swap_word(word: &mut [u8]) {
    let n = word.len();
    for i in 0..n / 2 {
        word.swap(i, n - i - 1);
    }
}

/// Swap every `size`-byte word of a packed array in place.
///
/// A trailing partial word (when `buf.len()` is not a multiple of `size`) is
/// left alone; callers validate lengths before reaching the codec.
pub fn swap_words(buf: &mut [u8], size: usize) {
    if size <= 1 {
        return;
    }
    for word in buf.chunks_exact_mut(size) {
        swap_word(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_swap_four_byte_word() {
        let mut w = [1u8, 2, 3, 4];
        swap_word(&mut w);
        assert_eq!(w, [4, 3, 2, 1]);
    }

    #[test]
    fn test_swap_odd_word_keeps_middle() {
        let mut w = [1u8, 2, 3, 4, 5];
        swap_word(&mut w);
        assert_eq!(w, [5, 4, 3, 2, 1]);

        let mut w = [9u8, 7, 8];
        swap_word(&mut w);
        assert_eq!(w, [8, 7, 9]);
    }

    #[test]
    fn test_single_byte_is_noop() {
        let mut buf = [1u8, 2, 3];
        swap_words(&mut buf, 1);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_swapped_f32_matches_foreign_bytes() {
        let v = 1234.5f32;
        let mut bytes = v.to_ne_bytes();
        swap_word(&mut bytes);
        let expected = if cfg!(target_endian = "little") {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_byte_order_flags() {
        assert!(!ByteOrder::Native.needs_swap());
        assert_ne!(ByteOrder::Little.needs_swap(), ByteOrder::Big.needs_swap());
        assert_eq!(ByteOrder::parse("be"), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::parse("sideways"), None);
    }

    proptest! {
        #[test]
        fn swap_is_self_inverse(
            size in prop::sample::select(vec![1usize, 4, 8]),
            words in 0usize..32,
            seed in any::<u64>(),
        ) {
            let mut rng = seed;
            let original: Vec<u8> = (0..size * words)
                .map(|_| {
                    rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    (rng >> 56) as u8
                })
                .collect();
            let mut buf = original.clone();
            swap_words(&mut buf, size);
            swap_words(&mut buf, size);
            prop_assert_eq!(buf, original);
        }

        #[test]
        fn swap_word_is_self_inverse(bytes in prop::collection::vec(any::<u8>(), 0..16)) {
            let mut w = bytes.clone();
            swap_word(&mut w);
            swap_word(&mut w);
            prop_assert_eq!(w, bytes);
        }
    }
}
