// crates/bastion-core/src/math.rs
//
// Fixed-point arithmetic for pool accounting.
//
// Two scales are in use:
//   - ZOC (10^4) for configured fractions such as a pool's maximum loss.
//   - WAD (10^18) for drip factors and dilution (retained-fraction) values.
//
// All amounts are integers in the asset's smallest unit. Products are
// computed at 256-bit width so `a * b / d` never overflows when the
// final quotient fits in a u128.

/// Asset or claim-token amount in the smallest unit.
pub type Amount = u128;

/// One whole, for fractions configured by governance (loss caps).
pub const ZOC: u16 = 10_000;

/// One whole, for drip factors and dilution scaling.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Multiply two u128 into a 256-bit (hi, lo) pair.
fn full_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide a 256-bit (hi, lo) value by `d`. Returns `(quotient, remainder)`,
/// or `None` when `d` is zero or the quotient does not fit in a u128.
fn div_wide(hi: u128, lo: u128, d: u128) -> Option<(u128, u128)> {
    if d == 0 || hi >= d {
        return None;
    }
    if hi == 0 {
        return Some((lo / d, lo % d));
    }

    let mut rem = hi;
    let mut quot: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Some((quot, rem))
}

/// `floor(a * b / d)`.
pub fn mul_div_down(a: u128, b: u128, d: u128) -> Option<u128> {
    let (hi, lo) = full_mul(a, b);
    div_wide(hi, lo, d).map(|(q, _)| q)
}

/// `ceil(a * b / d)`.
pub fn mul_div_up(a: u128, b: u128, d: u128) -> Option<u128> {
    let (hi, lo) = full_mul(a, b);
    let (q, r) = div_wide(hi, lo, d)?;
    if r > 0 {
        q.checked_add(1)
    } else {
        Some(q)
    }
}

/// `floor(amount * fraction / ZOC)`.
pub fn mul_zoc_down(amount: Amount, fraction: u16) -> Amount {
    // Saturates only for a fraction above ZOC applied to a near-max amount.
    mul_div_down(amount, fraction as u128, ZOC as u128).unwrap_or(Amount::MAX)
}

/// `floor(amount * factor / WAD)` for `factor <= WAD`, never exceeds `amount`.
pub fn mul_wad_down(amount: Amount, factor: u128) -> Amount {
    mul_div_down(amount, factor.min(WAD), WAD).unwrap_or(amount)
}

/// `x^n` where `x` is WAD-scaled, by repeated squaring with floor rounding.
///
/// Intended for `x <= WAD` (decay factors), where intermediate values
/// stay below WAD^2 and nothing overflows.
pub fn wad_pow(x: u128, mut n: u64) -> u128 {
    let mut base = x.min(WAD);
    let mut acc = WAD;
    while n > 0 {
        if n & 1 == 1 {
            acc = mul_div_down(acc, base, WAD).unwrap_or(0);
        }
        n >>= 1;
        if n > 0 {
            base = mul_div_down(base, base, WAD).unwrap_or(0);
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_small_values() {
        assert_eq!(mul_div_down(10, 3, 4), Some(7));
        assert_eq!(mul_div_up(10, 3, 4), Some(8));
        assert_eq!(mul_div_up(10, 4, 4), Some(10));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div_down(1, 1, 0), None);
        assert_eq!(mul_div_up(1, 1, 0), None);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // u128::MAX * WAD overflows 128 bits but the quotient fits.
        assert_eq!(mul_div_down(u128::MAX, WAD, WAD), Some(u128::MAX));
        assert_eq!(mul_div_down(u128::MAX, 3, 4), Some(u128::MAX / 4 * 3 + 2));
    }

    #[test]
    fn test_mul_div_quotient_overflow() {
        assert_eq!(mul_div_down(u128::MAX, 2, 1), None);
    }

    #[test]
    fn test_mul_zoc_down() {
        assert_eq!(mul_zoc_down(1_000, 2_000), 200);
        assert_eq!(mul_zoc_down(1_000, ZOC), 1_000);
        assert_eq!(mul_zoc_down(999, 1), 0);
    }

    #[test]
    fn test_mul_wad_down_caps_factor() {
        assert_eq!(mul_wad_down(100, WAD / 2), 50);
        assert_eq!(mul_wad_down(100, WAD * 2), 100);
    }

    #[test]
    fn test_wad_pow() {
        assert_eq!(wad_pow(WAD / 2, 0), WAD);
        assert_eq!(wad_pow(WAD / 2, 1), WAD / 2);
        assert_eq!(wad_pow(WAD / 2, 3), WAD / 8);
        assert_eq!(wad_pow(WAD, 1_000_000), WAD);
        assert_eq!(wad_pow(0, 5), 0);
    }

    #[test]
    fn test_wad_pow_matches_repeated_multiplication() {
        let x = WAD - WAD / 1_000;
        let mut expected = WAD;
        for _ in 0..10 {
            expected = mul_div_down(expected, x, WAD).unwrap();
        }
        let got = wad_pow(x, 10);
        // Different multiplication order may differ by a few units of rounding.
        assert!(got.abs_diff(expected) <= 10);
    }
}
