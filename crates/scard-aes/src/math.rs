//! GF(2⁸) arithmetic and array rotation helpers.

/// Reduction constant for the AES polynomial `x⁸ + x⁴ + x³ + x + 1`.
const IRREDUCIBLE_POLYNOMIAL: u8 = 0x1b;

/// Multiplies `x` and `y` in GF(2⁸) by peasant multiplication.
///
/// `y` is scanned LSB to MSB; `x` doubles each step and is reduced by
/// `0x1b` whenever the doubling overflows out of bit 7.
pub fn ff_mul(mut x: u8, mut y: u8) -> u8 {
    let mut product = 0u8;
    while y != 0 {
        if y & 0x01 != 0 {
            product ^= x;
        }
        if x & 0x80 != 0 {
            x = (x << 1) ^ IRREDUCIBLE_POLYNOMIAL;
        } else {
            x <<= 1;
        }
        y >>= 1;
    }
    product
}

/// Rotates `arr` right by `k` positions, in place.
///
/// Triple-reverse: reverse the last `k`, reverse the first `n − k`,
/// reverse the whole array. No allocation.
pub fn right_rotate(arr: &mut [u8], k: usize) {
    let n = arr.len();
    if n == 0 {
        return;
    }
    let k = k % n;
    arr[n - k..].reverse();
    arr[..n - k].reverse();
    arr.reverse();
}
