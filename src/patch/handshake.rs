//! Captures the proxy fingerprint during the auth grant exchange.

use crate::{
    assembly::{InstructionEncoder, Intrinsic},
    image::MethodBody,
    patch::{MethodPatch, REFERRAL_DATA_FIELD},
    properties::PROXY_FINGERPRINT_KEY,
    Result,
};

/// Splices fingerprint capture ahead of `exchangeServerAuthGrant`.
///
/// The prologue loads the handler's `referralData` field, runs the referral
/// token extractor over it and, when a fingerprint comes back, stores it
/// under the proxy fingerprint property. Extraction failure leaves the
/// property untouched. Either way the original exchange logic then runs
/// unchanged.
pub struct GrantFingerprintCapture;

impl MethodPatch for GrantFingerprintCapture {
    fn name(&self) -> &'static str {
        "grant-fingerprint-capture"
    }

    fn description(&self) -> &'static str {
        "auth grant exchange publishes the referral fingerprint"
    }

    fn apply(&self, body: &MethodBody) -> Result<MethodBody> {
        let mut asm = InstructionEncoder::new();
        asm.ldarg_0()?
            .ldfld(REFERRAL_DATA_FIELD)?
            .call(Intrinsic::ExtractFingerprint)?
            .dup()?
            .brnull("skip")?
            .ldstr(PROXY_FINGERPRINT_KEY)?
            .swap()?
            .call(Intrinsic::SetProperty)?
            .br("done")?
            .label("skip")?
            .pop()?
            .label("done")?;
        let (prologue, prologue_stack) = asm.finish()?;

        body.splice_prologue(&prologue, prologue_stack)
    }
}
