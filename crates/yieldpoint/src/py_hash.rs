//! Deterministic Python-compatible hashing.
//!
//! Every hash in this crate is computed as CPython would with
//! `PYTHONHASHSEED=0`: SipHash-1-3 with a zeroed key for text, the `2^61 - 1`
//! Mersenne modulus for numbers and the xxHash-derived mixer for tuples.
//! Hashes are carried as `u64` holding the bit pattern of CPython's signed
//! `Py_hash_t`, so `-1` never appears (it is remapped to `-2`).
//!
//! Storage relies on `a == b` implying `hash(a) == hash(b)` across `bool`,
//! `int` and `float`, which the numeric helpers below guarantee.

/// Mersenne prime used for numeric hashing: `2^61 - 1`.
const MODULUS: u64 = (1 << 61) - 1;

/// Reinterprets a signed hash lane as the `u64` carried by storage.
#[inline]
fn to_lane(signed: i64) -> u64 {
    u64::from_ne_bytes(signed.to_ne_bytes())
}

/// Hashes UTF-8 string content.
///
/// The empty string hashes to `0`.
#[must_use]
pub(crate) fn hash_str(value: &str) -> u64 {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return 0;
    }
    let signed = i64::from_ne_bytes(siphash13_seed0(bytes).to_ne_bytes());
    to_lane(if signed == -1 { -2 } else { signed })
}

/// Hashes an integer the way `int.__hash__` does.
#[must_use]
pub(crate) fn hash_int(value: i64) -> u64 {
    to_lane(hash_int_signed(value))
}

fn hash_int_signed(value: i64) -> i64 {
    if value == 0 {
        return 0;
    }
    // i64::MIN has no positive counterpart, so reduce the magnitude as u64.
    let remainder = i64::try_from(value.unsigned_abs() % MODULUS).unwrap_or(0);
    let result = if value < 0 { -remainder } else { remainder };
    if result == -1 { -2 } else { result }
}

/// Hashes a float the way `float.__hash__` does.
///
/// Integral floats hash like the equal integer, so `hash(2.0) == hash(2)`.
/// Infinities hash to `±314159` and NaN hashes to `0`.
#[must_use]
pub(crate) fn hash_float(value: f64) -> u64 {
    to_lane(hash_float_signed(value))
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn hash_float_signed(value: f64) -> i64 {
    if value.is_infinite() {
        return if value > 0.0 { 314_159 } else { -314_159 };
    }
    if value.is_nan() {
        return 0;
    }
    let truncated = value.trunc();
    if value == truncated && truncated >= i64::MIN as f64 && truncated <= i64::MAX as f64 {
        return hash_int_signed(truncated as i64);
    }

    let (frac, exp) = frexp(value);
    let (mut m, sign) = if frac < 0.0 { (-frac, -1) } else { (frac, 1) };
    let mut e = exp;

    // Mantissa is consumed in 28-bit chunks.
    let mut x: u64 = 0;
    while m > 0.0 {
        x = ((x << 28) & MODULUS) | (x >> 33);
        m *= 268_435_456.0;
        e -= 28;
        let w = m as u64;
        m -= w as f64;
        x = x.wrapping_add(w);
        if x >= MODULUS {
            x -= MODULUS;
        }
    }

    e = e.rem_euclid(61);
    x = ((x << e as u32) & MODULUS) | (x >> (61 - e) as u32);

    let result = (sign * x as i64) % MODULUS as i64;
    if result == -1 { -2 } else { result }
}

/// Returns `(frac, exp)` with `value == frac * 2^exp` and `0.5 <= |frac| < 1.0`.
#[expect(clippy::cast_possible_truncation)]
fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }
    let bits = value.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    if exponent == 0 {
        // subnormal: scale into the normal range first
        let (frac, exp) = frexp(value * 18_446_744_073_709_551_616.0);
        return (frac, exp - 64);
    }
    let frac = f64::from_bits((bits & 0x800F_FFFF_FFFF_FFFF) | 0x3FE0_0000_0000_0000);
    (frac, exponent - 1022)
}

/// Mixes element hashes the way `tuple.__hash__` does.
#[must_use]
pub(crate) fn hash_tuple(lanes: impl ExactSizeIterator<Item = u64>) -> u64 {
    const XXPRIME_1: u64 = 11_400_714_785_074_694_791;
    const XXPRIME_2: u64 = 14_029_467_366_897_019_727;
    const XXPRIME_5: u64 = 2_870_177_450_012_600_261;
    const TUPLE_HASH_SUFFIX: u64 = 3_527_539;

    let len = lanes.len() as u64;
    let mut acc = XXPRIME_5;
    for lane in lanes {
        acc = acc.wrapping_add(lane.wrapping_mul(XXPRIME_2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(XXPRIME_1);
    }
    acc = acc.wrapping_add(len ^ (XXPRIME_5 ^ TUPLE_HASH_SUFFIX));
    if acc == u64::MAX { 1_546_275_796 } else { acc }
}

/// SipHash-1-3 with a zero key.
fn siphash13_seed0(bytes: &[u8]) -> u64 {
    let mut v0: u64 = 0x736f_6d65_7073_6575;
    let mut v1: u64 = 0x646f_7261_6e64_6f6d;
    let mut v2: u64 = 0x6c79_6765_6e65_7261;
    let mut v3: u64 = 0x7465_6462_7974_6573;

    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut block = [0_u8; 8];
        block.copy_from_slice(chunk);
        let message = u64::from_le_bytes(block);
        v3 ^= message;
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= message;
    }

    let mut tail = (bytes.len() as u64) << 56;
    for (index, byte) in chunks.remainder().iter().copied().enumerate() {
        tail |= u64::from(byte) << (index * 8);
    }

    v3 ^= tail;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    v0 ^= tail;
    v2 ^= 0xff;
    for _ in 0..3 {
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    }

    v0 ^ v1 ^ v2 ^ v3
}

fn sip_round(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);

    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;

    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;

    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}
