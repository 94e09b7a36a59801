//! Forces certificate binding validation to succeed.

use crate::{
    assembly::InstructionEncoder,
    image::MethodBody,
    patch::MethodPatch,
    Result,
};

/// Splices `return true` ahead of `validateCertificateBinding`.
///
/// The original validation logic stays in the body but becomes unreachable;
/// every caller sees a successful binding check regardless of the certificate
/// presented.
pub struct ForceBindingValidation;

impl MethodPatch for ForceBindingValidation {
    fn name(&self) -> &'static str {
        "force-binding-validation"
    }

    fn description(&self) -> &'static str {
        "certificate binding validation always returns true"
    }

    fn apply(&self, body: &MethodBody) -> Result<MethodBody> {
        let mut asm = InstructionEncoder::new();
        asm.ldc_i4_1()?.ret()?;
        let (prologue, prologue_stack) = asm.finish()?;

        body.splice_prologue(&prologue, prologue_stack)
    }
}
