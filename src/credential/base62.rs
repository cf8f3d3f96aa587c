//! Base62 big-integer encoding.
//!
//! Byte strings are interpreted as unsigned big-endian integers. Digits are
//! `0-9`, then `a-z`, then `A-Z`, so digit values match the conventional
//! radix-62 text form used by the key issuer.

use num_bigint::BigUint;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode `bytes` as a base62 integer, without padding.
///
/// Leading zero bytes do not survive: `[0, 1]` and `[1]` both encode to `"1"`.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    BigUint::from_bytes_be(bytes)
        .to_radix_be(62)
        .into_iter()
        .map(|digit| char::from(ALPHABET[usize::from(digit)]))
        .collect()
}

/// Decode a base62 integer into its minimal big-endian byte form.
///
/// Returns `None` for an empty string or any character outside the alphabet.
/// Zero decodes to `[0]`.
#[must_use]
pub fn decode(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() {
        return None;
    }
    let digits = text
        .bytes()
        .map(digit_value)
        .collect::<Option<Vec<u8>>>()?;
    BigUint::from_radix_be(&digits, 62).map(|n| n.to_bytes_be())
}

/// Left-pad `text` with `'0'` up to `width` characters.
#[must_use]
pub fn pad(text: &str, width: usize) -> String {
    format!("{text:0>width$}")
}

fn digit_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'z' => Some(c - b'a' + 10),
        b'A'..=b'Z' => Some(c - b'A' + 36),
        _ => None,
    }
}
