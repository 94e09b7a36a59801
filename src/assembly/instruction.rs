//! Opcode definitions and single-instruction decoding.

use crate::{
    utils::io::{read_bytes_at, read_i16_at, read_i32_at, read_u16_at, read_u8_at},
    Error, Result,
};

/// The instruction set understood by the body codec and the evaluator.
///
/// Branch displacements are signed 16-bit offsets relative to the end of the
/// branching instruction, so code spliced ahead of an existing body never
/// invalidates the body's internal branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// No operation.
    Nop = 0x00,
    /// Push the integer constant `0` (boolean `false`).
    LdcI4_0 = 0x01,
    /// Push the integer constant `1` (boolean `true`).
    LdcI4_1 = 0x02,
    /// Push an inline 32-bit integer constant.
    LdcI4 = 0x03,
    /// Push an inline UTF-8 string constant.
    Ldstr = 0x04,
    /// Push the receiver object.
    Ldarg0 = 0x05,
    /// Pop the receiver, push the value of the named instance field.
    Ldfld = 0x06,
    /// Duplicate the top of the stack.
    Dup = 0x07,
    /// Discard the top of the stack.
    Pop = 0x08,
    /// Swap the two topmost values.
    Swap = 0x09,
    /// Pop the top of the stack and return it.
    Ret = 0x0A,
    /// Return without a value.
    RetVoid = 0x0B,
    /// Branch unconditionally.
    Br = 0x0C,
    /// Pop the top of the stack and branch when it is null.
    Brnull = 0x0D,
    /// Call an agent intrinsic; stack effect depends on the intrinsic.
    Call = 0x0E,
}

impl Opcode {
    /// Maps an instruction byte back to its opcode.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            0x00 => Some(Opcode::Nop),
            0x01 => Some(Opcode::LdcI4_0),
            0x02 => Some(Opcode::LdcI4_1),
            0x03 => Some(Opcode::LdcI4),
            0x04 => Some(Opcode::Ldstr),
            0x05 => Some(Opcode::Ldarg0),
            0x06 => Some(Opcode::Ldfld),
            0x07 => Some(Opcode::Dup),
            0x08 => Some(Opcode::Pop),
            0x09 => Some(Opcode::Swap),
            0x0A => Some(Opcode::Ret),
            0x0B => Some(Opcode::RetVoid),
            0x0C => Some(Opcode::Br),
            0x0D => Some(Opcode::Brnull),
            0x0E => Some(Opcode::Call),
            _ => None,
        }
    }

    /// Human-readable mnemonic, used in diagnostics.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::LdcI4_0 => "ldc.i4.0",
            Opcode::LdcI4_1 => "ldc.i4.1",
            Opcode::LdcI4 => "ldc.i4",
            Opcode::Ldstr => "ldstr",
            Opcode::Ldarg0 => "ldarg.0",
            Opcode::Ldfld => "ldfld",
            Opcode::Dup => "dup",
            Opcode::Pop => "pop",
            Opcode::Swap => "swap",
            Opcode::Ret => "ret",
            Opcode::RetVoid => "ret.void",
            Opcode::Br => "br",
            Opcode::Brnull => "brnull",
            Opcode::Call => "call",
        }
    }

    /// Number of values popped from the evaluation stack.
    ///
    /// [`Opcode::Call`] is not covered here; its effect depends on the
    /// intrinsic operand (see [`Intrinsic::stack_pops`]).
    #[must_use]
    pub fn stack_pops(&self) -> u16 {
        match self {
            Opcode::Nop
            | Opcode::LdcI4_0
            | Opcode::LdcI4_1
            | Opcode::LdcI4
            | Opcode::Ldstr
            | Opcode::Ldarg0
            | Opcode::RetVoid
            | Opcode::Br
            | Opcode::Call => 0,
            Opcode::Ldfld | Opcode::Dup | Opcode::Pop | Opcode::Ret | Opcode::Brnull => 1,
            Opcode::Swap => 2,
        }
    }

    /// Number of values pushed onto the evaluation stack.
    ///
    /// [`Opcode::Call`] is not covered here; see [`Intrinsic::stack_pushes`].
    #[must_use]
    pub fn stack_pushes(&self) -> u16 {
        match self {
            Opcode::Nop
            | Opcode::Pop
            | Opcode::Ret
            | Opcode::RetVoid
            | Opcode::Br
            | Opcode::Brnull
            | Opcode::Call => 0,
            Opcode::LdcI4_0
            | Opcode::LdcI4_1
            | Opcode::LdcI4
            | Opcode::Ldstr
            | Opcode::Ldarg0
            | Opcode::Ldfld => 1,
            Opcode::Dup | Opcode::Swap => 2,
        }
    }
}

/// Agent entry points that patched method bodies can call.
///
/// These are the rewrite-time equivalents of the helper the original agent
/// links into the host: property reads and writes against the process-wide
/// [`crate::properties::PropertyStore`] and the referral token extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Intrinsic {
    /// `(key: string) -> string | null` - read a property.
    GetProperty = 0x00,
    /// `(key: string, value: string) -> ()` - write a property.
    SetProperty = 0x01,
    /// `(referral_data: bytes) -> string | null` - extract a fingerprint.
    ExtractFingerprint = 0x02,
}

impl Intrinsic {
    /// Maps an operand byte back to its intrinsic.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Intrinsic> {
        match byte {
            0x00 => Some(Intrinsic::GetProperty),
            0x01 => Some(Intrinsic::SetProperty),
            0x02 => Some(Intrinsic::ExtractFingerprint),
            _ => None,
        }
    }

    /// Intrinsic name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::GetProperty => "get-property",
            Intrinsic::SetProperty => "set-property",
            Intrinsic::ExtractFingerprint => "extract-fingerprint",
        }
    }

    /// Number of arguments popped from the evaluation stack.
    #[must_use]
    pub fn stack_pops(&self) -> u16 {
        match self {
            Intrinsic::GetProperty | Intrinsic::ExtractFingerprint => 1,
            Intrinsic::SetProperty => 2,
        }
    }

    /// Number of results pushed onto the evaluation stack.
    #[must_use]
    pub fn stack_pushes(&self) -> u16 {
        match self {
            Intrinsic::GetProperty | Intrinsic::ExtractFingerprint => 1,
            Intrinsic::SetProperty => 0,
        }
    }
}

/// A decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// The opcode takes no operand.
    None,
    /// Inline 32-bit integer constant.
    Int32(i32),
    /// Inline UTF-8 string (constant or field name).
    Str(String),
    /// Signed branch displacement relative to the end of the instruction.
    Branch(i16),
    /// Intrinsic selector for [`Opcode::Call`].
    Intrinsic(Intrinsic),
}

/// One decoded instruction together with its position in the code stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The decoded opcode.
    pub opcode: Opcode,
    /// The decoded operand, [`Operand::None`] for operand-less opcodes.
    pub operand: Operand,
    /// Byte offset of the instruction within the code stream.
    pub offset: usize,
    /// Encoded size in bytes, including the operand.
    pub size: usize,
}

impl Instruction {
    /// Byte offset of the instruction that follows this one.
    ///
    /// Branch displacements are relative to this offset.
    #[must_use]
    pub fn next_offset(&self) -> usize {
        self.offset + self.size
    }
}

/// Decodes the instruction starting at `offset` within `code`.
///
/// # Errors
///
/// Returns [`Error::UnknownOpcode`] or [`Error::UnknownIntrinsic`] for bytes
/// outside the instruction set, [`Error::OutOfBounds`] for operands truncated
/// by the end of the stream, and [`Error::Malformed`] for inline strings that
/// are not valid UTF-8.
pub fn decode_instruction(code: &[u8], offset: usize) -> Result<Instruction> {
    let mut cursor = offset;

    let byte = read_u8_at(code, &mut cursor)?;
    let opcode = Opcode::from_byte(byte).ok_or(Error::UnknownOpcode(byte))?;

    let operand = match opcode {
        Opcode::LdcI4 => Operand::Int32(read_i32_at(code, &mut cursor)?),
        Opcode::Ldstr | Opcode::Ldfld => {
            let len = read_u16_at(code, &mut cursor)? as usize;
            let bytes = read_bytes_at(code, &mut cursor, len)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| malformed_error!("Inline string at offset {} is not UTF-8", offset))?;
            Operand::Str(text.to_string())
        }
        Opcode::Br | Opcode::Brnull => Operand::Branch(read_i16_at(code, &mut cursor)?),
        Opcode::Call => {
            let index = read_u8_at(code, &mut cursor)?;
            let intrinsic = Intrinsic::from_byte(index).ok_or(Error::UnknownIntrinsic(index))?;
            Operand::Intrinsic(intrinsic)
        }
        _ => Operand::None,
    };

    Ok(Instruction {
        opcode,
        operand,
        offset,
        size: cursor - offset,
    })
}

/// Decodes a complete code stream into its instruction sequence.
///
/// # Errors
///
/// Fails with the same errors as [`decode_instruction`]; a stream that ends in
/// the middle of an instruction is [`Error::OutOfBounds`].
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0;

    while offset < code.len() {
        let instruction = decode_instruction(code, offset)?;
        offset = instruction.next_offset();
        instructions.push(instruction);
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        let code = [0x02, 0x0A]; // ldc.i4.1, ret
        let instr = decode_instruction(&code, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::LdcI4_1);
        assert_eq!(instr.operand, Operand::None);
        assert_eq!(instr.size, 1);

        let instr = decode_instruction(&code, 1).unwrap();
        assert_eq!(instr.opcode, Opcode::Ret);
    }

    #[test]
    fn test_decode_ldc_i4() {
        let mut code = vec![0x03];
        code.extend_from_slice(&0x1234_5678_i32.to_le_bytes());
        let instr = decode_instruction(&code, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::LdcI4);
        assert_eq!(instr.operand, Operand::Int32(0x1234_5678));
        assert_eq!(instr.size, 5);
    }

    #[test]
    fn test_decode_ldstr() {
        let mut code = vec![0x04];
        code.extend_from_slice(&5u16.to_le_bytes());
        code.extend_from_slice(b"hello");
        let instr = decode_instruction(&code, 0).unwrap();
        assert_eq!(instr.operand, Operand::Str("hello".to_string()));
        assert_eq!(instr.size, 8);
    }

    #[test]
    fn test_decode_branch_negative() {
        let mut code = vec![0x00, 0x0C]; // nop, br -3
        code.extend_from_slice(&(-3i16).to_le_bytes());
        let instr = decode_instruction(&code, 1).unwrap();
        assert_eq!(instr.operand, Operand::Branch(-3));
        assert_eq!(instr.next_offset(), 4);
    }

    #[test]
    fn test_decode_call() {
        let code = [0x0E, 0x02];
        let instr = decode_instruction(&code, 0).unwrap();
        assert_eq!(
            instr.operand,
            Operand::Intrinsic(Intrinsic::ExtractFingerprint)
        );
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            decode_instruction(&[0xF7], 0),
            Err(Error::UnknownOpcode(0xF7))
        ));
    }

    #[test]
    fn test_unknown_intrinsic() {
        assert!(matches!(
            decode_instruction(&[0x0E, 0x09], 0),
            Err(Error::UnknownIntrinsic(0x09))
        ));
    }

    #[test]
    fn test_truncated_operand() {
        let code = [0x04, 0x0A, 0x00, b'h', b'i']; // ldstr claims 10 bytes
        assert!(matches!(
            decode_instruction(&code, 0),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_decode_stream() {
        let mut code = vec![0x05, 0x06]; // ldarg.0, ldfld "f"
        code.extend_from_slice(&1u16.to_le_bytes());
        code.push(b'f');
        code.extend_from_slice(&[0x0E, 0x00, 0x0A]); // call get-property, ret

        let instructions = decode_stream(&code).unwrap();
        let opcodes: Vec<Opcode> = instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::Ldarg0, Opcode::Ldfld, Opcode::Call, Opcode::Ret]
        );
        assert_eq!(instructions[1].offset, 1);
        assert_eq!(instructions[2].offset, 5);
    }

    #[test]
    fn test_opcode_byte_roundtrip() {
        for byte in 0x00..=0x0E {
            let opcode = Opcode::from_byte(byte).unwrap();
            assert_eq!(opcode as u8, byte);
        }
        assert_eq!(Opcode::from_byte(0x0F), None);
    }
}
