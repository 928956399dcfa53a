/// Turns one integer into a sequence of bounded choices.
///
/// The integer is read as a mixed-radix number whose digit bases are
/// decided by whoever consumes it: `get(n)` peels off the lowest base-`n`
/// digit. Whatever is left once a tree has been decoded is the remainder;
/// an index names a tree exactly when its remainder is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecisionSource {
    val: u64,
}

impl DecisionSource {
    pub fn new(val: u64) -> Self {
        Self { val }
    }

    /// Choose between `n` alternatives.
    pub fn get(&mut self, n: u64) -> u64 {
        assert!(n > 0, "cannot choose between zero alternatives");
        let result = self.val % n;
        self.val /= n;
        result
    }

    /// Split the remaining value into two independent streams.
    ///
    /// The even bits of the value become the returned stream and the odd bits
    /// stay behind. Both streams hold at most 32 bits.
    pub fn fork(&mut self) -> DecisionSource {
        let even = compact_even_bits(self.val);
        let odd = compact_even_bits(self.val >> 1);
        self.val = odd;
        DecisionSource { val: even }
    }

    /// The undecoded part of the index.
    pub fn remainder(&self) -> u64 {
        self.val
    }
}

/// Gather the even-position bits of `x` into the low 32 bits.
pub fn compact_even_bits(x: u64) -> u64 {
    let mut x = x & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_mixed_radix() {
        // 2 + 3 * (1 + 5 * 4)
        let mut src = DecisionSource::new(2 + 3 * (1 + 5 * 4));
        assert_eq!(src.get(3), 2);
        assert_eq!(src.get(5), 1);
        assert_eq!(src.get(7), 4);
        assert_eq!(src.remainder(), 0);
    }

    #[test]
    fn get_one_consumes_nothing() {
        let mut src = DecisionSource::new(42);
        assert_eq!(src.get(1), 0);
        assert_eq!(src.remainder(), 42);
    }

    #[test]
    #[should_panic]
    fn get_zero_panics() {
        DecisionSource::new(1).get(0);
    }

    #[test]
    fn fork_deinterleaves() {
        // bits: 1101 -> even positions (0, 2) = 1, 1 ; odd positions (1, 3) = 0, 1
        let mut src = DecisionSource::new(0b1101);
        let other = src.fork();
        assert_eq!(other.remainder(), 0b11);
        assert_eq!(src.remainder(), 0b10);
    }

    #[test]
    fn fork_keeps_all_bits() {
        let original = 0xDEAD_BEEF_0123_4567u64;
        let mut src = DecisionSource::new(original);
        let even = src.fork().remainder();
        let odd = src.remainder();
        let mut rebuilt = 0u64;
        for bit in 0..32 {
            rebuilt |= ((even >> bit) & 1) << (2 * bit);
            rebuilt |= ((odd >> bit) & 1) << (2 * bit + 1);
        }
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn same_calls_same_answers() {
        let run = |v| {
            let mut src = DecisionSource::new(v);
            let mut b = src.fork();
            (src.get(4), b.get(9), src.get(6), b.remainder(), src.remainder())
        };
        assert_eq!(run(987_654_321), run(987_654_321));
    }
}
