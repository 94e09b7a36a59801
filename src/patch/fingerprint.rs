//! Routes fingerprint reads through the proxy override property.

use crate::{
    assembly::{InstructionEncoder, Intrinsic},
    image::MethodBody,
    patch::MethodPatch,
    properties::PROXY_FINGERPRINT_KEY,
    Result,
};

/// Splices an override check ahead of `getServerCertificateFingerprint`.
///
/// The prologue reads the proxy fingerprint property and returns it when one
/// is set; otherwise it falls through into the original lookup, which keeps
/// computing the fingerprint from the server's own certificate.
pub struct FingerprintOverride;

impl MethodPatch for FingerprintOverride {
    fn name(&self) -> &'static str {
        "fingerprint-override"
    }

    fn description(&self) -> &'static str {
        "fingerprint getter prefers the proxy override property"
    }

    fn apply(&self, body: &MethodBody) -> Result<MethodBody> {
        let mut asm = InstructionEncoder::new();
        asm.ldstr(PROXY_FINGERPRINT_KEY)?
            .call(Intrinsic::GetProperty)?
            .dup()?
            .brnull("original")?
            .ret()?
            .label("original")?
            .pop()?;
        let (prologue, prologue_stack) = asm.finish()?;

        body.splice_prologue(&prologue, prologue_stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{decode_stream, Opcode, Operand};

    #[test]
    fn test_prologue_shape() {
        let body = MethodBody::new(vec![0x0B], 1); // ret.void placeholder
        let patched = FingerprintOverride.apply(&body).unwrap();

        let instructions = decode_stream(&patched.code).unwrap();
        assert_eq!(instructions[0].opcode, Opcode::Ldstr);
        assert_eq!(
            instructions[0].operand,
            Operand::Str(PROXY_FINGERPRINT_KEY.to_string())
        );
        assert_eq!(instructions[1].operand, Operand::Intrinsic(Intrinsic::GetProperty));
        assert_eq!(instructions[2].opcode, Opcode::Dup);
        assert_eq!(instructions[3].opcode, Opcode::Brnull);
        assert_eq!(instructions[4].opcode, Opcode::Ret);
        assert_eq!(instructions[5].opcode, Opcode::Pop);
        // The null branch lands on the pop
        assert_eq!(
            instructions[3].operand,
            Operand::Branch(i16::try_from(
                instructions[5].offset - instructions[3].next_offset()
            )
            .unwrap())
        );
        // Original code follows the prologue
        assert_eq!(instructions[6].opcode, Opcode::RetVoid);
    }

    #[test]
    fn test_prologue_needs_two_stack_slots() {
        let body = MethodBody::new(vec![0x0B], 1);
        let patched = FingerprintOverride.apply(&body).unwrap();
        assert_eq!(patched.max_stack, 2);
    }

    #[test]
    fn test_deeper_original_stack_wins() {
        let body = MethodBody {
            max_stack: 5,
            local_slots: 0,
            init_locals: false,
            code: vec![0x0B],
            exception_handlers: Vec::new(),
        };
        let patched = FingerprintOverride.apply(&body).unwrap();
        assert_eq!(patched.max_stack, 5);
    }
}
