//! Referral token fingerprint extraction.
//!
//! During the handshake the host hands the backend a referral token: three
//! dot-separated segments (`header.payload.signature`) where the payload is
//! URL-safe base64 over a pipe-delimited field list. Field 0 is an integer
//! schema version; the layout produced by the proxy is
//! `version|playerId|targetServerId|issuedAtMillis|expiresAtMillis|...` with
//! the certificate (or opaque fingerprint) field at a version-dependent index.
//!
//! Extraction is strictly best effort. Header and signature are never
//! validated here (the host does that elsewhere in its own flow), and every
//! malformation - wrong segment count, bad base64, short field list,
//! unparsable version, absent field - collapses to "no fingerprint" rather
//! than an error. Each failure branch is an explicit early return so the
//! failure modes stay auditable; nothing is logged.

use sha2::{Digest, Sha256};
use x509_cert::{
    der::{Decode, Encode},
    Certificate,
};

use crate::utils::{base64_url_decode, base64_url_encode};

/// Minimum number of payload fields for a token to be considered well formed.
const MIN_PAYLOAD_FIELDS: usize = 5;

/// Extracts the proxy certificate fingerprint from referral token bytes.
///
/// Returns the fingerprint carried by the token's payload, or `None` when the
/// buffer does not hold a well-formed token. When the selected field holds a
/// base64-encoded DER certificate the fingerprint is the unpadded URL-safe
/// base64 of the SHA-256 digest over the certificate's canonical encoding;
/// otherwise the field's raw string is passed through verbatim.
///
/// The version-dependent field index:
///
/// | version | field index |
/// |---------|-------------|
/// | >= 3    | 7           |
/// | == 2    | 6           |
/// | <= 1    | 5           |
///
/// # Arguments
///
/// * `referral_data` - The raw referral data bytes held by the handshake
///   handler, expected to be ASCII token text
///
/// # Examples
///
/// ```rust
/// use lineage_agent::token::extract_proxy_fingerprint;
/// use lineage_agent::utils::base64_url_encode;
///
/// let payload = base64_url_encode(b"1|player|server|0|60000|abc123");
/// let token = format!("v1.{payload}.sig");
///
/// assert_eq!(
///     extract_proxy_fingerprint(token.as_bytes()).as_deref(),
///     Some("abc123")
/// );
/// assert_eq!(extract_proxy_fingerprint(b""), None);
/// ```
#[must_use]
pub fn extract_proxy_fingerprint(referral_data: &[u8]) -> Option<String> {
    if referral_data.is_empty() {
        return None;
    }

    let token = std::str::from_utf8(referral_data).ok()?.trim();
    if token.is_empty() {
        return None;
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let payload_bytes = base64_url_decode(segments[1])?;
    let payload = String::from_utf8(payload_bytes).ok()?;

    // Empty trailing fields are significant, which `split` preserves
    let fields: Vec<&str> = payload.split('|').collect();
    if fields.len() < MIN_PAYLOAD_FIELDS {
        return None;
    }

    let version: i32 = fields[0].parse().ok()?;
    let index = if version >= 3 {
        7
    } else if version == 2 {
        6
    } else {
        5
    };

    let value = match fields.get(index) {
        Some(value) if !value.is_empty() => *value,
        _ => return None,
    };

    match try_certificate_fingerprint(value) {
        Some(fingerprint) => Some(fingerprint),
        None => Some(value.to_string()),
    }
}

/// Interprets a payload field as a base64-encoded DER certificate and digests
/// its canonical encoding.
///
/// Any failure - bad base64, unparsable certificate, re-encoding failure -
/// yields `None` so the caller can fall back to the raw field string. This
/// fallback is intentional graceful degradation, not an error.
fn try_certificate_fingerprint(cert_b64: &str) -> Option<String> {
    let cert_bytes = base64_url_decode(cert_b64)?;
    let certificate = Certificate::from_der(&cert_bytes).ok()?;
    let canonical = certificate.to_der().ok()?;
    let digest = Sha256::digest(&canonical);
    Some(base64_url_encode(&digest))
}
