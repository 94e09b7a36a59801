#![doc(html_no_source)]
#![deny(missing_docs)]

//! # lineage-agent
//!
//! Load-time behavior overrides for the Lineage proxy handshake.
//!
//! When a game server runs behind the Lineage proxy, the certificate the
//! client sees belongs to the proxy, not to the server. Three methods in the
//! server's authentication path must change for the handshake to survive
//! that substitution, and this crate rewrites their compiled bodies as the
//! host loads each module:
//!
//! - `CertificateUtil.validateCertificateBinding` is forced to return `true`
//! - `ServerAuthManager.getServerCertificateFingerprint` prefers the proxy
//!   fingerprint published in the process property store
//! - `HandshakeHandler.exchangeServerAuthGrant` extracts the proxy's
//!   certificate fingerprint from the referral token it received and
//!   publishes it for the fingerprint getter to find
//!
//! ## Quick Start
//!
//! Feed every loading module through [`patch::interceptor::on_module_load`]:
//!
//! ```rust,no_run
//! use lineage_agent::patch::interceptor::on_module_load;
//!
//! # let module_id = "com/example/Module";
//! # let image: Vec<u8> = Vec::new();
//! match on_module_load(module_id, &image)? {
//!     Some(patched) => { /* hand the patched image to the host */ }
//!     None => { /* load the original image unchanged */ }
//! }
//! # Ok::<(), lineage_agent::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`patch`] - The load hook and the three method body rewrites
//! - [`token`] - Referral token parsing and fingerprint extraction
//! - [`properties`] - The process-wide property store patched code talks through
//! - [`image`] - Module image and method body codecs
//! - [`assembly`] - The instruction set, decoder and fluent encoder
//! - [`emulation`] - A reference evaluator for validating rewritten bodies
//! - [`Error`] and [`Result`] - Comprehensive error handling

#[macro_use]
pub(crate) mod error;

pub mod assembly;
pub mod emulation;
pub mod image;
pub mod patch;
pub mod properties;
pub mod token;
pub mod utils;

pub use crate::error::Error;

/// Universal `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
