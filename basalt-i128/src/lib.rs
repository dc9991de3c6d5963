//! Signed 128-bit integer arithmetic over explicit two's-complement lanes.
//!
//! [`I128`] is the physical value type backing wide decimal columns: a
//! `(hi: i64, lo: u64)` lane pair matching the split-lane layout of
//! `Int128Block`. Addition, subtraction, negation and multiplication are
//! built from 64-bit carry/borrow primitives and wrap at 128 bits, the same
//! fixed-width semantics as the native integer types. Division truncates
//! toward zero.

use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

use basalt_error::basalt_panic;
use num_traits::{One, Zero};

/// A signed 128-bit integer as a two's-complement `(hi, lo)` 64-bit lane pair.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct I128 {
    hi: i64,
    lo: u64,
}

impl I128 {
    pub const ZERO: Self = Self { hi: 0, lo: 0 };
    pub const ONE: Self = Self { hi: 0, lo: 1 };
    pub const MINUS_ONE: Self = Self {
        hi: -1,
        lo: u64::MAX,
    };
    pub const MAX: Self = Self {
        hi: i64::MAX,
        lo: u64::MAX,
    };
    pub const MIN: Self = Self {
        hi: i64::MIN,
        lo: 0,
    };

    /// Assemble from raw lanes.
    #[inline]
    pub const fn from_parts(hi: i64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Sign-extend a 64-bit value.
    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        Self {
            hi: value >> 63,
            lo: value as u64,
        }
    }

    #[inline]
    pub const fn from_i128(value: i128) -> Self {
        Self {
            hi: (value >> 64) as i64,
            lo: value as u64,
        }
    }

    /// High (sign-carrying) lane.
    #[inline]
    pub const fn hi(self) -> i64 {
        self.hi
    }

    /// Low lane.
    #[inline]
    pub const fn lo(self) -> u64 {
        self.lo
    }

    #[inline]
    pub const fn as_i128(self) -> i128 {
        ((self.hi as i128) << 64) | (self.lo as i128 & 0xFFFF_FFFF_FFFF_FFFF)
    }

    /// Narrow to `i64` if the value fits, `None` otherwise.
    #[inline]
    pub const fn to_i64(self) -> Option<i64> {
        let truncated = self.lo as i64;
        // The value fits iff the high lane is a pure sign extension of lo.
        if self.hi == truncated >> 63 {
            Some(truncated)
        } else {
            None
        }
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.hi < 0
    }

    /// Wrapping addition: a 64-bit add of the low lanes with carry into the
    /// high lanes. Overflow past the sign bit wraps, two's-complement style.
    #[inline]
    pub const fn wrapping_add(self, rhs: Self) -> Self {
        let (lo, carry) = self.lo.overflowing_add(rhs.lo);
        let hi = self.hi.wrapping_add(rhs.hi).wrapping_add(carry as i64);
        Self { hi, lo }
    }

    /// Wrapping subtraction via borrow propagation.
    #[inline]
    pub const fn wrapping_sub(self, rhs: Self) -> Self {
        let (lo, borrow) = self.lo.overflowing_sub(rhs.lo);
        let hi = self.hi.wrapping_sub(rhs.hi).wrapping_sub(borrow as i64);
        Self { hi, lo }
    }

    /// Wrapping negation. Negating [`I128::MIN`] wraps back to itself, the
    /// same asymmetry every two's-complement width has.
    #[inline]
    pub const fn wrapping_neg(self) -> Self {
        Self {
            hi: !self.hi,
            lo: !self.lo,
        }
        .wrapping_add(Self::ONE)
    }

    /// Low 128 bits of the product. Bits above the 128th are discarded,
    /// consistent with fixed-width integer semantics.
    #[inline]
    pub const fn wrapping_mul(self, rhs: Self) -> Self {
        // Unsigned lane arithmetic produces the correct two's-complement
        // result modulo 2^128, so signs need no special handling.
        let low_product = (self.lo as u128) * (rhs.lo as u128);
        let lo = low_product as u64;
        let carry = (low_product >> 64) as u64;
        let hi = (self.lo as i64)
            .wrapping_mul(rhs.hi)
            .wrapping_add(self.hi.wrapping_mul(rhs.lo as i64))
            .wrapping_add(carry as i64);
        Self { hi, lo }
    }

    /// Addition that reports overflow instead of wrapping.
    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.as_i128().checked_add(rhs.as_i128()).map(Self::from_i128)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.as_i128().checked_sub(rhs.as_i128()).map(Self::from_i128)
    }

    #[inline]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.as_i128().checked_mul(rhs.as_i128()).map(Self::from_i128)
    }

    /// Magnitude as unsigned lanes. `MIN` maps to `2^127`, which an unsigned
    /// 128-bit value represents exactly.
    #[inline]
    const fn unsigned_abs(self) -> u128 {
        self.as_i128().unsigned_abs()
    }

    /// Truncating (round-toward-zero) quotient and remainder.
    ///
    /// Signs are normalized away, the magnitude division runs unsigned, and
    /// the signs are reapplied: the quotient is negative iff operand signs
    /// differ, the remainder takes the dividend's sign.
    ///
    /// ## Panics
    ///
    /// Panics on division by zero.
    pub fn quo_rem(self, rhs: Self) -> (Self, Self) {
        if rhs.is_zero() {
            basalt_panic!("i128 division by zero");
        }
        let quo_magnitude = self.unsigned_abs() / rhs.unsigned_abs();
        let rem_magnitude = self.unsigned_abs() % rhs.unsigned_abs();
        let quo = Self::from_i128(quo_magnitude as i128);
        let rem = Self::from_i128(rem_magnitude as i128);
        let quo = if self.is_negative() != rhs.is_negative() {
            quo.wrapping_neg()
        } else {
            quo
        };
        let rem = if self.is_negative() { rem.wrapping_neg() } else { rem };
        (quo, rem)
    }

    pub fn quo(self, rhs: Self) -> Self {
        self.quo_rem(rhs).0
    }

    pub fn rem(self, rhs: Self) -> Self {
        self.quo_rem(rhs).1
    }
}

impl Ord for I128 {
    /// Lane-wise comparison: the high lane carries the sign and compares
    /// signed; ties fall through to the unsigned low lane. No 128-bit
    /// subtraction is involved, so the comparison itself cannot overflow.
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.hi.cmp(&other.hi).then(self.lo.cmp(&other.lo))
    }
}

impl PartialOrd for I128 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::ops::Add for I128 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

impl std::ops::Sub for I128 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }
}

impl std::ops::Mul for I128 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }
}

impl std::ops::Div for I128 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.quo(rhs)
    }
}

impl std::ops::Rem for I128 {
    type Output = Self;

    fn rem(self, rhs: Self) -> Self {
        I128::rem(self, rhs)
    }
}

impl std::ops::Neg for I128 {
    type Output = Self;

    fn neg(self) -> Self {
        self.wrapping_neg()
    }
}

impl Zero for I128 {
    fn zero() -> Self {
        Self::ZERO
    }

    fn is_zero(&self) -> bool {
        I128::is_zero(*self)
    }
}

impl One for I128 {
    fn one() -> Self {
        Self::ONE
    }
}

impl From<i64> for I128 {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<i128> for I128 {
    fn from(value: i128) -> Self {
        Self::from_i128(value)
    }
}

impl Display for I128 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.as_i128(), f)
    }
}

impl Debug for I128 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.as_i128(), f)
    }
}

/// Largest power of ten representable in 128 bits is 10^38.
pub const MAX_TEN_POW: u32 = 38;

static TEN_POWERS: [I128; MAX_TEN_POW as usize + 1] = ten_powers();

const fn ten_powers() -> [I128; MAX_TEN_POW as usize + 1] {
    let mut table = [I128::ZERO; MAX_TEN_POW as usize + 1];
    let mut value: i128 = 1;
    let mut i = 0;
    while i < table.len() {
        table[i] = I128::from_i128(value);
        if i + 1 < table.len() {
            value *= 10;
        }
        i += 1;
    }
    table
}

/// `10^exp` as an [`I128`].
///
/// ## Panics
///
/// Panics if `exp > 38` (the largest power of ten that fits).
#[inline]
pub fn i128_ten_pow(exp: u32) -> I128 {
    if exp > MAX_TEN_POW {
        basalt_panic!(OutOfBounds: "10^{} does not fit in 128 bits", exp);
    }
    TEN_POWERS[exp as usize]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{I128, i128_ten_pow};

    #[rstest]
    #[case(0, 0)]
    #[case(1, -1)]
    #[case(i64::MAX as i128, i64::MIN as i128)]
    #[case(i128::MAX, 1)]
    #[case(i128::MIN, -1)]
    #[case(-77, 13)]
    fn add_matches_native(#[case] a: i128, #[case] b: i128) {
        let sum = I128::from_i128(a).wrapping_add(I128::from_i128(b));
        assert_eq!(sum.as_i128(), a.wrapping_add(b));
    }

    #[test]
    fn max_plus_one_wraps_to_min() {
        assert_eq!(I128::MAX.wrapping_add(I128::ONE), I128::MIN);
    }

    #[test]
    fn neg_min_wraps_to_min() {
        assert_eq!(I128::MIN.wrapping_neg(), I128::MIN);
    }

    #[rstest]
    #[case(0, 5)]
    #[case(123_456_789, -987)]
    #[case(i128::MAX, i128::MAX)]
    #[case(i128::MIN, 2)]
    #[case(-1, -1)]
    fn mul_truncates_like_native(#[case] a: i128, #[case] b: i128) {
        let product = I128::from_i128(a).wrapping_mul(I128::from_i128(b));
        assert_eq!(product.as_i128(), a.wrapping_mul(b));
    }

    #[rstest]
    #[case(7, 2, 3, 1)]
    #[case(-7, 2, -3, -1)]
    #[case(7, -2, -3, 1)]
    #[case(-7, -2, 3, -1)]
    #[case(i128::MIN, 10, i128::MIN / 10, i128::MIN % 10)]
    fn quo_rem_truncates_toward_zero(
        #[case] a: i128,
        #[case] b: i128,
        #[case] quo: i128,
        #[case] rem: i128,
    ) {
        let (q, r) = I128::from_i128(a).quo_rem(I128::from_i128(b));
        assert_eq!(q.as_i128(), quo);
        assert_eq!(r.as_i128(), rem);
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn divide_by_zero_panics() {
        let _ = I128::ONE.quo_rem(I128::ZERO);
    }

    #[test]
    fn ordering_crosses_sign_without_overflow() {
        assert!(I128::MIN < I128::MINUS_ONE);
        assert!(I128::MINUS_ONE < I128::ZERO);
        assert!(I128::ZERO < I128::MAX);
        assert!(I128::MIN < I128::MAX);
    }

    #[test]
    fn randomized_arithmetic_agrees_with_native() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..1000 {
            let a: i128 = rng.random();
            let b: i128 = rng.random();
            let (wa, wb) = (I128::from_i128(a), I128::from_i128(b));
            assert_eq!(wa.wrapping_add(wb).as_i128(), a.wrapping_add(b));
            assert_eq!(wa.wrapping_sub(wb).as_i128(), a.wrapping_sub(b));
            assert_eq!(wa.wrapping_mul(wb).as_i128(), a.wrapping_mul(b));
            assert_eq!(wa.cmp(&wb), a.cmp(&b));
            if b != 0 {
                let (q, r) = wa.quo_rem(wb);
                assert_eq!(q.as_i128(), a.wrapping_div(b));
                assert_eq!(r.as_i128(), a.wrapping_rem(b));
            }
        }
    }

    #[test]
    fn to_i64_rejects_wide_values() {
        assert_eq!(I128::from_i64(-42).to_i64(), Some(-42));
        assert_eq!(I128::from_i128(1i128 << 70).to_i64(), None);
        assert_eq!(I128::from_i64(i64::MIN).to_i64(), Some(i64::MIN));
    }

    #[test]
    fn ten_powers_table() {
        assert_eq!(i128_ten_pow(0), I128::ONE);
        assert_eq!(i128_ten_pow(5).as_i128(), 100_000);
        assert_eq!(i128_ten_pow(38).as_i128(), 10i128.pow(38));
    }
}
