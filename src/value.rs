use std::{fmt, str::FromStr};

use rand::Rng;

/// A fixed-width integer stored as its raw bit pattern, masked to the width.
pub type Value = u64;

/// Bit width and signedness of the integers an operator works on.
///
/// All arithmetic wraps modulo `2^bits`. Signedness only matters for
/// comparisons, `min`, `max` and for printing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueType {
    bits: u32,
    signed: bool,
}

impl Default for ValueType {
    fn default() -> Self {
        Self::I32
    }
}

impl ValueType {
    pub const I32: ValueType = ValueType {
        bits: 32,
        signed: true,
    };

    pub fn int(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "unsupported bit width {}", bits);
        Self { bits, signed: true }
    }

    pub fn uint(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "unsupported bit width {}", bits);
        Self {
            bits,
            signed: false,
        }
    }

    pub fn bits(self) -> u32 {
        self.bits
    }

    pub fn is_signed(self) -> bool {
        self.signed
    }

    pub fn mask(self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    pub fn wrap(self, raw: u64) -> Value {
        raw & self.mask()
    }

    pub fn from_i64(self, v: i64) -> Value {
        self.wrap(v as u64)
    }

    /// The mathematical value of a bit pattern. Sign extension is done by
    /// shifting, so the minimum signed value decodes without negating a
    /// magnitude.
    pub fn to_i128(self, v: Value) -> i128 {
        let v = self.wrap(v);
        if self.signed {
            let shift = 64 - self.bits;
            (((v << shift) as i64) >> shift) as i128
        } else {
            v as i128
        }
    }

    pub fn min_value(self) -> Value {
        if self.signed {
            1u64 << (self.bits - 1)
        } else {
            0
        }
    }

    pub fn max_value(self) -> Value {
        if self.signed {
            self.mask() >> 1
        } else {
            self.mask()
        }
    }

    pub fn add(self, a: Value, b: Value) -> Value {
        self.wrap(a.wrapping_add(b))
    }

    pub fn sub(self, a: Value, b: Value) -> Value {
        self.wrap(a.wrapping_sub(b))
    }

    pub fn mul(self, a: Value, b: Value) -> Value {
        self.wrap(a.wrapping_mul(b))
    }

    pub fn lt(self, a: Value, b: Value) -> bool {
        self.to_i128(a) < self.to_i128(b)
    }

    pub fn min(self, a: Value, b: Value) -> Value {
        if self.lt(b, a) {
            b
        } else {
            a
        }
    }

    pub fn max(self, a: Value, b: Value) -> Value {
        if self.lt(a, b) {
            b
        } else {
            a
        }
    }

    /// Draw an input for the randomized screen.
    ///
    /// Samples stay within the low three quarters of the width and, for
    /// signed types, are centered on zero, so the screen rarely lands on the
    /// overflow edge.
    pub fn sample<R: Rng>(self, rng: &mut R) -> Value {
        let span = (self.bits * 3 / 4).max(1);
        let r = rng.gen_range(0, 1u64 << span);
        if self.signed {
            let half = (1i64 << (span - 1)) - 1;
            self.from_i64(r as i64 - half)
        } else {
            self.wrap(r)
        }
    }

    pub fn display(self, v: Value) -> String {
        self.to_i128(v).to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.signed { "i" } else { "u" };
        write!(f, "{}{}", prefix, self.bits)
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (signed, digits) = match s.chars().next() {
            Some('i') => (true, &s[1..]),
            Some('u') => (false, &s[1..]),
            _ => return Err(format!("Invalid type {}, expected e.g. i32 or u16.", s)),
        };
        let bits: u32 = digits
            .parse()
            .map_err(|_| format!("Invalid bit width in {}.", s))?;
        if !(1..=64).contains(&bits) {
            return Err(format!("Bit width of {} must be between 1 and 64.", s));
        }
        Ok(Self { bits, signed })
    }
}
