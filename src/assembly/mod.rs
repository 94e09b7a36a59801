//! Instruction set, decoding and encoding for compiled method bodies.
//!
//! Method bodies carried by module images use a compact bytecode: single-byte
//! opcodes, little-endian inline operands and 16-bit branch displacements
//! relative to the end of the branching instruction. The set is deliberately
//! small - it covers what the host compiles into the targeted methods plus
//! what the patches need to splice in: constants, string and field loads,
//! stack shuffling, conditional and unconditional branches, returns and calls
//! into the three agent intrinsics.
//!
//! # Key Types
//!
//! - [`Opcode`] - The instruction set with per-opcode stack effects
//! - [`Instruction`] / [`Operand`] - A decoded instruction with its operand
//! - [`Intrinsic`] - Agent entry points callable from patched bodies
//! - [`InstructionEncoder`] - Fluent assembler with label fixups and
//!   real-time stack depth tracking
//!
//! # Examples
//!
//! ```rust
//! use lineage_agent::assembly::InstructionEncoder;
//!
//! let mut asm = InstructionEncoder::new();
//! asm.ldc_i4_1()?.ret()?;
//! let (code, max_stack) = asm.finish()?;
//!
//! assert_eq!(code, vec![0x02, 0x0A]);
//! assert_eq!(max_stack, 1);
//! # Ok::<(), lineage_agent::Error>(())
//! ```

mod encoder;
mod instruction;

pub use encoder::InstructionEncoder;
pub use instruction::{
    decode_instruction, decode_stream, Instruction, Intrinsic, Opcode, Operand,
};
