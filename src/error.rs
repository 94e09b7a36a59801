use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the failure modes of module image parsing, method body rewriting,
/// instruction encoding and the reference evaluator. Token extraction deliberately does
/// not use this type: every extraction failure collapses to an absent fingerprint (see
/// [`crate::token::extract_proxy_fingerprint`]).
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    ///
    /// This is a safety check to prevent reads past the end of a module image
    /// or method body buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// An instruction byte that does not map to any known opcode.
    #[error("Unknown opcode byte - 0x{0:02X}")]
    UnknownOpcode(u8),

    /// A call instruction references an intrinsic index that does not exist.
    #[error("Unknown intrinsic index - {0}")]
    UnknownIntrinsic(u8),

    /// A label was defined twice during instruction encoding.
    #[error("Label defined more than once - '{0}'")]
    DuplicateLabel(String),

    /// A branch references a label that was never defined.
    #[error("Branch to undefined label - '{0}'")]
    UndefinedLabel(String),

    /// A branch displacement does not fit the 16-bit encoding.
    #[error("Branch displacement out of range for label '{0}'")]
    BranchOutOfRange(String),

    /// An instruction would pop more values than the evaluation stack holds.
    #[error("Evaluation stack underflow at '{0}'")]
    StackUnderflow(&'static str),

    /// The evaluator popped a value of the wrong kind.
    #[error("Expected {expected} on the evaluation stack, found {found}")]
    TypeMismatch {
        /// The value kind the instruction requires
        expected: &'static str,
        /// The value kind that was actually on the stack
        found: &'static str,
    },

    /// The receiver object has no field with the requested name.
    #[error("Receiver has no field named '{0}'")]
    UnknownField(String),

    /// Evaluation exceeded its step budget.
    #[error("Evaluation exceeded the step budget of {0}")]
    StepLimit(usize),
}
