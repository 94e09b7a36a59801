//! URL-safe Base64 encoding and decoding.
//!
//! This module provides dependency-free Base64 functions for the URL-safe
//! alphabet (`-` and `_` instead of `+` and `/`) without padding, matching the
//! encoding the referral token format uses for its payload, signature and
//! embedded certificate fields.

/// Encodes binary data to an unpadded URL-safe Base64 string.
///
/// # Arguments
///
/// * `data` - The bytes to encode
///
/// # Examples
///
/// ```rust
/// use lineage_agent::utils::base64_url_encode;
///
/// assert_eq!(base64_url_encode(b"Hello"), "SGVsbG8");
/// assert_eq!(base64_url_encode(&[0xFB, 0xFF]), "-_8");
/// ```
#[must_use]
pub fn base64_url_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);
    let mut i = 0;

    while i < data.len() {
        let b0 = data[i];
        let b1 = data.get(i + 1).copied().unwrap_or(0);
        let b2 = data.get(i + 2).copied().unwrap_or(0);

        let n = u32::from(b0) << 16 | u32::from(b1) << 8 | u32::from(b2);

        result.push(char::from(ALPHABET[(n >> 18 & 0x3F) as usize]));
        result.push(char::from(ALPHABET[(n >> 12 & 0x3F) as usize]));

        if i + 1 < data.len() {
            result.push(char::from(ALPHABET[(n >> 6 & 0x3F) as usize]));
        }

        if i + 2 < data.len() {
            result.push(char::from(ALPHABET[(n & 0x3F) as usize]));
        }

        i += 3;
    }

    result
}

/// Decodes a URL-safe Base64 string to binary data.
///
/// Padding is optional: both `SGVsbG8` and `SGVsbG8=` decode to `Hello`.
/// Returns `None` for characters outside the URL-safe alphabet or for
/// impossible lengths (a single leftover character cannot encode a byte).
///
/// # Arguments
///
/// * `s` - The Base64-encoded string to decode
#[must_use]
pub fn base64_url_decode(s: &str) -> Option<Vec<u8>> {
    const DECODE_TABLE: [i8; 128] = [
        -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
        -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 62,
        -1, -1, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, -1, -1, -1, -1, -1, -1, -1, 0, 1, 2, 3, 4,
        5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, -1, -1, -1,
        -1, 63, -1, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45,
        46, 47, 48, 49, 50, 51, -1, -1, -1, -1, -1,
    ];

    let s = s.trim_end_matches('=');
    if s.is_empty() {
        return Some(Vec::new());
    }
    if s.len() % 4 == 1 {
        return None;
    }

    let mut result = Vec::with_capacity(s.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for b in s.bytes() {
        if b >= 128 {
            return None;
        }
        let val = DECODE_TABLE[usize::from(b)];
        if val < 0 {
            return None;
        }
        // val is checked to be >= 0, so casting to u32 is safe
        #[allow(clippy::cast_sign_loss)]
        {
            acc = acc << 6 | val as u32;
        }
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            // Truncation to u8 is intentional - we're extracting individual bytes
            #[allow(clippy::cast_possible_truncation)]
            result.push((acc >> bits) as u8);
        }
    }

    Some(result)
}
