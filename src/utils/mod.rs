//! Small shared utilities.
//!
//! Contains the URL-safe base64 codec used by the referral token format and the
//! little-endian read helpers used by the module image and method body parsers.

mod base64;
pub(crate) mod io;

pub use base64::{base64_url_decode, base64_url_encode};
