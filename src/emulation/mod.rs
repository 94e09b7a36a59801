//! Reference evaluator for method bodies.
//!
//! Patches are structural edits; this module makes their effect observable.
//! [`evaluate`] runs a decoded [`MethodBody`] against a receiver's field
//! values and a [`PropertyStore`], executing intrinsic calls for real, and
//! returns the value the method would produce. The integration tests use it
//! to assert that a patched body behaves as intended rather than merely
//! looking right.
//!
//! The evaluator is not a sandbox: it trusts the code it runs and exists only
//! to validate rewrites. A step budget guards against accidental infinite
//! loops in hand-assembled test code.

use std::collections::HashMap;

use crate::{
    assembly::{decode_instruction, Instruction, Intrinsic, Opcode, Operand},
    image::MethodBody,
    properties::PropertyStore,
    token::extract_proxy_fingerprint,
    Error, Result,
};

/// Default step budget for [`EvalContext`].
const DEFAULT_STEP_BUDGET: usize = 10_000;

/// A value on the evaluation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The absent value; `brnull` branches on it.
    Null,
    /// A 32-bit integer, also carrying booleans as 0 and 1.
    Int(i32),
    /// An owned string.
    Str(String),
    /// An owned byte buffer, e.g. a referral data field.
    Bytes(Vec<u8>),
    /// The receiver object pushed by `ldarg.0`.
    Receiver,
}

impl Value {
    /// Value kind name, used in type mismatch diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Receiver => "receiver",
        }
    }
}

/// Execution environment for one method invocation.
pub struct EvalContext<'a> {
    /// Field values of the receiver object, looked up by `ldfld`.
    pub fields: HashMap<String, Value>,
    /// The property store intrinsic calls read and write.
    pub properties: &'a PropertyStore,
    /// Maximum number of instructions executed before giving up.
    pub step_budget: usize,
}

impl<'a> EvalContext<'a> {
    /// Creates a context with no fields and the default step budget.
    #[must_use]
    pub fn new(properties: &'a PropertyStore) -> Self {
        EvalContext {
            fields: HashMap::new(),
            properties,
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }

    /// Adds a receiver field, consuming and returning the context.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Executes `body` in `context` until a return instruction.
///
/// Returns `Some` for `ret`, `None` for `ret.void`.
///
/// # Errors
///
/// Fails with [`Error::Malformed`] when execution runs off the end of the
/// code or a branch lands outside it, [`Error::StackUnderflow`] or
/// [`Error::TypeMismatch`] for inconsistent stack use,
/// [`Error::UnknownField`] for an `ldfld` the context cannot satisfy, and
/// [`Error::StepLimit`] once the budget is exhausted.
pub fn evaluate(body: &MethodBody, context: &EvalContext<'_>) -> Result<Option<Value>> {
    let code = &body.code;
    let mut stack: Vec<Value> = Vec::new();
    let mut offset = 0;
    let mut steps = 0;

    loop {
        if offset >= code.len() {
            return Err(malformed_error!(
                "Execution ran off the end of the code at offset {}",
                offset
            ));
        }
        if steps >= context.step_budget {
            return Err(Error::StepLimit(context.step_budget));
        }
        steps += 1;

        let instruction = decode_instruction(code, offset)?;
        offset = instruction.next_offset();

        match instruction.opcode {
            Opcode::Nop => {}
            Opcode::LdcI4_0 => stack.push(Value::Int(0)),
            Opcode::LdcI4_1 => stack.push(Value::Int(1)),
            Opcode::LdcI4 => {
                if let Operand::Int32(value) = instruction.operand {
                    stack.push(Value::Int(value));
                }
            }
            Opcode::Ldstr => {
                if let Operand::Str(value) = instruction.operand {
                    stack.push(Value::Str(value));
                }
            }
            Opcode::Ldarg0 => stack.push(Value::Receiver),
            Opcode::Ldfld => {
                let receiver = pop(&mut stack, "ldfld")?;
                if receiver != Value::Receiver {
                    return Err(Error::TypeMismatch {
                        expected: "receiver",
                        found: receiver.kind(),
                    });
                }
                if let Operand::Str(name) = instruction.operand {
                    let value = context
                        .fields
                        .get(&name)
                        .cloned()
                        .ok_or(Error::UnknownField(name))?;
                    stack.push(value);
                }
            }
            Opcode::Dup => {
                let top = pop(&mut stack, "dup")?;
                stack.push(top.clone());
                stack.push(top);
            }
            Opcode::Pop => {
                pop(&mut stack, "pop")?;
            }
            Opcode::Swap => {
                let top = pop(&mut stack, "swap")?;
                let below = pop(&mut stack, "swap")?;
                stack.push(top);
                stack.push(below);
            }
            Opcode::Ret => return Ok(Some(pop(&mut stack, "ret")?)),
            Opcode::RetVoid => return Ok(None),
            Opcode::Br => {
                offset = branch_target(code, &instruction)?;
            }
            Opcode::Brnull => {
                let value = pop(&mut stack, "brnull")?;
                if value == Value::Null {
                    offset = branch_target(code, &instruction)?;
                }
            }
            Opcode::Call => {
                if let Operand::Intrinsic(intrinsic) = instruction.operand {
                    call_intrinsic(intrinsic, &mut stack, context)?;
                }
            }
        }
    }
}

/// Executes one intrinsic call against the context's property store.
fn call_intrinsic(
    intrinsic: Intrinsic,
    stack: &mut Vec<Value>,
    context: &EvalContext<'_>,
) -> Result<()> {
    match intrinsic {
        Intrinsic::GetProperty => {
            let key = pop_str(stack, "get-property")?;
            let result = match context.properties.get(&key) {
                Some(value) => Value::Str(value),
                None => Value::Null,
            };
            stack.push(result);
        }
        Intrinsic::SetProperty => {
            let value = pop_str(stack, "set-property")?;
            let key = pop_str(stack, "set-property")?;
            context.properties.set(&key, &value);
        }
        Intrinsic::ExtractFingerprint => {
            let data = match pop(stack, "extract-fingerprint")? {
                Value::Bytes(bytes) => bytes,
                Value::Null => {
                    stack.push(Value::Null);
                    return Ok(());
                }
                other => {
                    return Err(Error::TypeMismatch {
                        expected: "bytes",
                        found: other.kind(),
                    })
                }
            };
            let result = match extract_proxy_fingerprint(&data) {
                Some(fingerprint) => Value::Str(fingerprint),
                None => Value::Null,
            };
            stack.push(result);
        }
    }
    Ok(())
}

fn pop(stack: &mut Vec<Value>, mnemonic: &'static str) -> Result<Value> {
    stack.pop().ok_or(Error::StackUnderflow(mnemonic))
}

fn pop_str(stack: &mut Vec<Value>, mnemonic: &'static str) -> Result<String> {
    match pop(stack, mnemonic)? {
        Value::Str(value) => Ok(value),
        other => Err(Error::TypeMismatch {
            expected: "string",
            found: other.kind(),
        }),
    }
}

/// Resolves a branch displacement to an absolute code offset.
fn branch_target(code: &[u8], instruction: &Instruction) -> Result<usize> {
    let displacement = match instruction.operand {
        Operand::Branch(displacement) => i64::from(displacement),
        _ => 0,
    };
    let target = instruction.next_offset() as i64 + displacement;
    if target < 0 || target as usize > code.len() {
        return Err(malformed_error!(
            "Branch at offset {} targets {} outside the code",
            instruction.offset,
            target
        ));
    }
    Ok(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::InstructionEncoder;

    fn run(asm: InstructionEncoder, context: &EvalContext<'_>) -> Result<Option<Value>> {
        let (code, max_stack) = asm.finish()?;
        evaluate(&MethodBody::new(code, max_stack), context)
    }

    #[test]
    fn test_return_constant() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldc_i4_1().unwrap().ret().unwrap();

        let result = run(asm, &EvalContext::new(&store)).unwrap();
        assert_eq!(result, Some(Value::Int(1)));
    }

    #[test]
    fn test_return_void() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.nop().unwrap().ret_void().unwrap();

        assert_eq!(run(asm, &EvalContext::new(&store)).unwrap(), None);
    }

    #[test]
    fn test_get_property_found_and_absent() {
        let store = PropertyStore::new();
        store.set("k", "v");

        let mut asm = InstructionEncoder::new();
        asm.ldstr("k")
            .unwrap()
            .call(Intrinsic::GetProperty)
            .unwrap()
            .ret()
            .unwrap();
        assert_eq!(
            run(asm, &EvalContext::new(&store)).unwrap(),
            Some(Value::Str("v".to_string()))
        );

        let mut asm = InstructionEncoder::new();
        asm.ldstr("missing")
            .unwrap()
            .call(Intrinsic::GetProperty)
            .unwrap()
            .ret()
            .unwrap();
        assert_eq!(
            run(asm, &EvalContext::new(&store)).unwrap(),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_set_property() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldstr("k")
            .unwrap()
            .ldstr("v")
            .unwrap()
            .call(Intrinsic::SetProperty)
            .unwrap()
            .ret_void()
            .unwrap();

        run(asm, &EvalContext::new(&store)).unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_ldfld_reads_context_field() {
        let store = PropertyStore::new();
        let context =
            EvalContext::new(&store).with_field("referralData", Value::Bytes(vec![1, 2, 3]));

        let mut asm = InstructionEncoder::new();
        asm.ldarg_0()
            .unwrap()
            .ldfld("referralData")
            .unwrap()
            .ret()
            .unwrap();
        assert_eq!(
            run(asm, &context).unwrap(),
            Some(Value::Bytes(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_ldfld_unknown_field() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldarg_0()
            .unwrap()
            .ldfld("missing")
            .unwrap()
            .ret()
            .unwrap();
        assert!(matches!(
            run(asm, &EvalContext::new(&store)),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_brnull_takes_branch_on_null() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldstr("missing")
            .unwrap()
            .call(Intrinsic::GetProperty)
            .unwrap()
            .brnull("absent")
            .unwrap()
            .ldc_i4_1()
            .unwrap()
            .ret()
            .unwrap()
            .label("absent")
            .unwrap()
            .ldc_i4_0()
            .unwrap()
            .ret()
            .unwrap();

        assert_eq!(
            run(asm, &EvalContext::new(&store)).unwrap(),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn test_swap_reorders() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldstr("below")
            .unwrap()
            .ldstr("top")
            .unwrap()
            .swap()
            .unwrap()
            .ret()
            .unwrap();

        // swap brings the first push back on top
        assert_eq!(
            run(asm, &EvalContext::new(&store)).unwrap(),
            Some(Value::Str("below".to_string()))
        );
    }

    #[test]
    fn test_infinite_loop_hits_step_budget() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.label("loop").unwrap().br("loop").unwrap();
        let (code, _) = asm.finish().unwrap();

        let mut context = EvalContext::new(&store);
        context.step_budget = 100;
        assert!(matches!(
            evaluate(&MethodBody::new(code, 1), &context),
            Err(Error::StepLimit(100))
        ));
    }

    #[test]
    fn test_running_off_the_end_is_malformed() {
        let store = PropertyStore::new();
        let body = MethodBody::new(vec![0x00], 1); // nop, no return
        assert!(evaluate(&body, &EvalContext::new(&store)).is_err());
    }

    #[test]
    fn test_type_mismatch_on_intrinsic_argument() {
        let store = PropertyStore::new();
        let mut asm = InstructionEncoder::new();
        asm.ldc_i4_1()
            .unwrap()
            .call(Intrinsic::GetProperty)
            .unwrap()
            .ret()
            .unwrap();
        assert!(matches!(
            run(asm, &EvalContext::new(&store)),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
