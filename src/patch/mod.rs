//! Targeted method body rewrites applied at module load time.
//!
//! Three methods in the host's authentication path are rewritten, each by its
//! own [`MethodPatch`]:
//!
//! - `CertificateUtil.validateCertificateBinding` always returns `true`
//!   ([`validation::ForceBindingValidation`])
//! - `ServerAuthManager.getServerCertificateFingerprint` prefers the proxy
//!   fingerprint property when one is set
//!   ([`fingerprint::FingerprintOverride`])
//! - `HandshakeHandler.exchangeServerAuthGrant` extracts a fingerprint from
//!   the referral data and publishes it as the proxy fingerprint property
//!   ([`handshake::GrantFingerprintCapture`])
//!
//! Patches work on decoded bodies and splice prologues rather than editing in
//! place; branch displacements are end-relative, so the original code keeps
//! working unmodified behind the splice. The load hook itself lives in
//! [`interceptor`].

pub mod fingerprint;
pub mod handshake;
pub mod interceptor;
pub mod validation;

use crate::{image::MethodBody, Result};

/// Module path of the certificate binding helper.
pub const CERTIFICATE_UTIL_MODULE: &str =
    "com/hypixel/hytale/server/core/auth/CertificateUtil";

/// Module path of the server auth manager.
pub const SERVER_AUTH_MANAGER_MODULE: &str =
    "com/hypixel/hytale/server/core/auth/ServerAuthManager";

/// Module path of the login handshake handler.
pub const HANDSHAKE_HANDLER_MODULE: &str =
    "com/hypixel/hytale/server/core/io/handlers/login/HandshakeHandler";

/// Method rewritten to always report a valid certificate binding.
pub const VALIDATE_CERTIFICATE_BINDING: &str = "validateCertificateBinding";

/// Method rewritten to prefer the proxy fingerprint property.
pub const GET_SERVER_CERTIFICATE_FINGERPRINT: &str = "getServerCertificateFingerprint";

/// Method rewritten to capture the referral fingerprint.
pub const EXCHANGE_SERVER_AUTH_GRANT: &str = "exchangeServerAuthGrant";

/// Instance field of the handshake handler holding the raw referral data.
pub const REFERRAL_DATA_FIELD: &str = "referralData";

/// One self-contained method body rewrite.
///
/// Implementations are stateless; [`MethodPatch::apply`] consumes the decoded
/// original body and produces the rewritten one without touching shared
/// state.
pub trait MethodPatch: Send + Sync {
    /// Stable identifier, used in log output.
    fn name(&self) -> &'static str;

    /// One-line description of the behavior change.
    fn description(&self) -> &'static str;

    /// Produces the rewritten body.
    ///
    /// # Errors
    ///
    /// Fails when the replacement code cannot be assembled or spliced, e.g.
    /// when shifted exception handler offsets leave the 16-bit range.
    fn apply(&self, body: &MethodBody) -> Result<MethodBody>;
}

/// Maps a module path to the method it targets and the patch to apply.
///
/// Each targeted module has exactly one method of interest. Unknown module
/// paths return `None` and pass through the load hook untouched.
#[must_use]
pub fn patch_for_module(module_id: &str) -> Option<(&'static str, &'static dyn MethodPatch)> {
    static FORCE_BINDING: validation::ForceBindingValidation =
        validation::ForceBindingValidation;
    static FINGERPRINT_OVERRIDE: fingerprint::FingerprintOverride =
        fingerprint::FingerprintOverride;
    static GRANT_CAPTURE: handshake::GrantFingerprintCapture =
        handshake::GrantFingerprintCapture;

    match module_id {
        CERTIFICATE_UTIL_MODULE => Some((VALIDATE_CERTIFICATE_BINDING, &FORCE_BINDING)),
        SERVER_AUTH_MANAGER_MODULE => {
            Some((GET_SERVER_CERTIFICATE_FINGERPRINT, &FINGERPRINT_OVERRIDE))
        }
        HANDSHAKE_HANDLER_MODULE => Some((EXCHANGE_SERVER_AUTH_GRANT, &GRANT_CAPTURE)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_targets() {
        let (method, patch) = patch_for_module(CERTIFICATE_UTIL_MODULE).unwrap();
        assert_eq!(method, VALIDATE_CERTIFICATE_BINDING);
        assert_eq!(patch.name(), "force-binding-validation");

        let (method, patch) = patch_for_module(SERVER_AUTH_MANAGER_MODULE).unwrap();
        assert_eq!(method, GET_SERVER_CERTIFICATE_FINGERPRINT);
        assert_eq!(patch.name(), "fingerprint-override");

        let (method, patch) = patch_for_module(HANDSHAKE_HANDLER_MODULE).unwrap();
        assert_eq!(method, EXCHANGE_SERVER_AUTH_GRANT);
        assert_eq!(patch.name(), "grant-fingerprint-capture");
    }

    #[test]
    fn test_unknown_module_has_no_patch() {
        assert!(patch_for_module("com/hypixel/hytale/server/core/world/Chunk").is_none());
        assert!(patch_for_module("").is_none());
    }
}
