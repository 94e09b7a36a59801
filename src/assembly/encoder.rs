//! Instruction encoding with label resolution and stack tracking.
//!
//! [`InstructionEncoder`] is the assembler the patches use to build
//! replacement code and splice prologues. It mirrors the decoder's
//! instruction metadata, resolves forward and backward branch labels in
//! [`InstructionEncoder::finish`], and tracks the evaluation stack depth in
//! real time so callers get a correct `max_stack` for free.
//!
//! # Examples
//!
//! ```rust
//! use lineage_agent::assembly::{InstructionEncoder, Intrinsic};
//!
//! let mut asm = InstructionEncoder::new();
//! asm.ldstr("some.key")?
//!     .call(Intrinsic::GetProperty)?
//!     .dup()?
//!     .brnull("absent")?
//!     .ret()?
//!     .label("absent")?
//!     .pop()?
//!     .ret_void()?;
//!
//! let (code, max_stack) = asm.finish()?;
//! assert_eq!(max_stack, 2);
//! # Ok::<(), lineage_agent::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{Intrinsic, Opcode},
    Error, Result,
};

/// A branch whose displacement is patched once all labels are known.
struct LabelFixup {
    /// Name of the target label.
    label: String,
    /// Offset of the 2-byte displacement placeholder within the code.
    patch_offset: usize,
    /// Offset of the instruction following the branch; displacements are
    /// relative to this.
    next_offset: usize,
}

/// Fluent bytecode assembler with automatic stack depth calculation.
///
/// Every emit method returns `Result<&mut Self>` so instruction sequences can
/// be chained with `?`. Labels may be referenced before they are defined; all
/// fixups are resolved by [`InstructionEncoder::finish`].
pub struct InstructionEncoder {
    /// The encoded instruction bytes.
    code: Vec<u8>,
    /// Offsets of defined labels.
    labels: HashMap<String, usize>,
    /// Branches awaiting displacement resolution.
    fixups: Vec<LabelFixup>,
    /// Current stack depth along the fall-through path.
    current_stack_depth: u16,
    /// Maximum stack depth reached so far.
    max_stack_depth: u16,
    /// Expected stack depth at branch targets, recorded when a branch to the
    /// label is emitted.
    label_stack_depths: HashMap<String, u16>,
    /// Set after `ret`/`ret.void`/`br`; the fall-through depth is meaningless
    /// until the next label restores a known depth.
    unreachable: bool,
}

impl InstructionEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        InstructionEncoder {
            code: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            current_stack_depth: 0,
            max_stack_depth: 0,
            label_stack_depths: HashMap::new(),
            unreachable: false,
        }
    }

    /// Emit `nop`.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Nop)
    }

    /// Emit `ldc.i4.0` - push `false`.
    pub fn ldc_i4_0(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::LdcI4_0)
    }

    /// Emit `ldc.i4.1` - push `true`.
    pub fn ldc_i4_1(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::LdcI4_1)
    }

    /// Emit `ldc.i4` with an inline constant.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        self.update_stack_depth(0, 1, Opcode::LdcI4.mnemonic())?;
        self.code.push(Opcode::LdcI4 as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
        Ok(self)
    }

    /// Emit `ldstr` with an inline string constant.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Malformed`] when the string exceeds the 16-bit
    /// inline length encoding.
    pub fn ldstr(&mut self, value: &str) -> Result<&mut Self> {
        self.update_stack_depth(0, 1, Opcode::Ldstr.mnemonic())?;
        self.emit_inline_str(Opcode::Ldstr, value)
    }

    /// Emit `ldarg.0` - push the receiver.
    pub fn ldarg_0(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Ldarg0)
    }

    /// Emit `ldfld` - pop the receiver, push the named field's value.
    pub fn ldfld(&mut self, field: &str) -> Result<&mut Self> {
        self.update_stack_depth(1, 1, Opcode::Ldfld.mnemonic())?;
        self.emit_inline_str(Opcode::Ldfld, field)
    }

    /// Emit `dup`.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Dup)
    }

    /// Emit `pop`.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Pop)
    }

    /// Emit `swap`.
    pub fn swap(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Swap)
    }

    /// Emit `ret` - return the top of the stack.
    ///
    /// Code after a `ret` is unreachable until the next label.
    pub fn ret(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::Ret)?;
        self.unreachable = true;
        Ok(self)
    }

    /// Emit `ret.void`.
    pub fn ret_void(&mut self) -> Result<&mut Self> {
        self.emit_simple(Opcode::RetVoid)?;
        self.unreachable = true;
        Ok(self)
    }

    /// Emit an unconditional branch to `label`.
    pub fn br(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::Br, label)?;
        self.unreachable = true;
        Ok(self)
    }

    /// Emit a branch to `label` taken when the popped value is null.
    pub fn brnull(&mut self, label: &str) -> Result<&mut Self> {
        self.emit_branch(Opcode::Brnull, label)
    }

    /// Emit a call to an agent intrinsic.
    pub fn call(&mut self, intrinsic: Intrinsic) -> Result<&mut Self> {
        self.update_stack_depth(
            intrinsic.stack_pops(),
            intrinsic.stack_pushes(),
            Opcode::Call.mnemonic(),
        )?;
        self.code.push(Opcode::Call as u8);
        self.code.push(intrinsic as u8);
        Ok(self)
    }

    /// Define `label` at the current position.
    ///
    /// When a branch to the label was emitted earlier, the recorded stack
    /// depth at that branch becomes the depth here; a reachable fall-through
    /// with a different depth is malformed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateLabel`] when the label already exists.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.code.len());

        if let Some(&depth) = self.label_stack_depths.get(name) {
            if !self.unreachable && self.current_stack_depth != depth {
                return Err(malformed_error!(
                    "Stack depth mismatch at label '{}': fall-through {} vs branch {}",
                    name,
                    self.current_stack_depth,
                    depth
                ));
            }
            self.current_stack_depth = depth;
            self.unreachable = false;
        } else if self.unreachable {
            // Label only reachable by later backward branches; assume empty
            // stack until a branch records otherwise.
            self.current_stack_depth = 0;
            self.unreachable = false;
        }
        Ok(self)
    }

    /// Finalizes the code stream, resolving all branch displacements.
    ///
    /// Returns the encoded bytes and the calculated maximum stack depth.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UndefinedLabel`] when a branch references a label
    /// that was never defined, or [`Error::BranchOutOfRange`] when a
    /// displacement does not fit 16 bits.
    pub fn finish(mut self) -> Result<(Vec<u8>, u16)> {
        for fixup in &self.fixups {
            let target = *self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let displacement = target as i64 - fixup.next_offset as i64;
            let displacement = i16::try_from(displacement)
                .map_err(|_| Error::BranchOutOfRange(fixup.label.clone()))?;

            self.code[fixup.patch_offset..fixup.patch_offset + 2]
                .copy_from_slice(&displacement.to_le_bytes());
        }

        Ok((self.code, self.max_stack_depth))
    }

    /// Emit an opcode without an operand, applying its metadata stack effect.
    fn emit_simple(&mut self, opcode: Opcode) -> Result<&mut Self> {
        self.update_stack_depth(opcode.stack_pops(), opcode.stack_pushes(), opcode.mnemonic())?;
        self.code.push(opcode as u8);
        Ok(self)
    }

    /// Emit an opcode with a 16-bit length-prefixed UTF-8 operand.
    fn emit_inline_str(&mut self, opcode: Opcode, value: &str) -> Result<&mut Self> {
        let len = u16::try_from(value.len())
            .map_err(|_| malformed_error!("Inline string exceeds 16-bit length encoding"))?;
        self.code.push(opcode as u8);
        self.code.extend_from_slice(&len.to_le_bytes());
        self.code.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    /// Emit a branch opcode with a placeholder displacement and record the
    /// fixup plus the expected stack depth at the target.
    fn emit_branch(&mut self, opcode: Opcode, label: &str) -> Result<&mut Self> {
        self.update_stack_depth(opcode.stack_pops(), opcode.stack_pushes(), opcode.mnemonic())?;

        self.code.push(opcode as u8);
        let patch_offset = self.code.len();
        self.code.extend_from_slice(&0i16.to_le_bytes());

        self.fixups.push(LabelFixup {
            label: label.to_string(),
            patch_offset,
            next_offset: self.code.len(),
        });
        self.record_label_stack_depth(label)?;
        Ok(self)
    }

    /// Record the stack depth a branch carries to `label`.
    fn record_label_stack_depth(&mut self, label: &str) -> Result<()> {
        match self.label_stack_depths.get(label) {
            Some(&depth) if depth != self.current_stack_depth => Err(malformed_error!(
                "Conflicting stack depths for label '{}': {} vs {}",
                label,
                depth,
                self.current_stack_depth
            )),
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths
                    .insert(label.to_string(), self.current_stack_depth);
                Ok(())
            }
        }
    }

    /// Apply a stack effect along the fall-through path.
    fn update_stack_depth(&mut self, pops: u16, pushes: u16, mnemonic: &'static str) -> Result<()> {
        if self.unreachable {
            return Err(malformed_error!(
                "Instruction '{}' is unreachable; define a label first",
                mnemonic
            ));
        }
        if pops > self.current_stack_depth {
            return Err(Error::StackUnderflow(mnemonic));
        }
        self.current_stack_depth = self.current_stack_depth - pops + pushes;
        if self.current_stack_depth > self.max_stack_depth {
            self.max_stack_depth = self.current_stack_depth;
        }
        Ok(())
    }
}

impl Default for InstructionEncoder {
    fn default() -> Self {
        Self::new()
    }
}
