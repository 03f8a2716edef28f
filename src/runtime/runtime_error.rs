use thiserror::Error;

use crate::bytecode::BytecodeError;
use crate::lang::object::Object;

/// Fatal VM fault. Any of these aborts the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("stack overflow: value stack exceeded {limit} slots")]
    StackOverflow { limit: usize },

    #[error("stack overflow: more than {limit} nested calls")]
    FrameOverflow { limit: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("unsupported types for binary operation: {left} {op} {right}")]
    UnsupportedBinaryTypes {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("index operator not supported: {container}[{index}]")]
    IndexNotSupported {
        container: &'static str,
        index: &'static str,
    },

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("calling non-function: {0}")]
    NotAFunction(&'static str),

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("global index {index} exceeds the configured limit of {limit}")]
    GlobalsOverflow { index: usize, limit: usize },

    #[error("constant {0} is missing or not a function")]
    InvalidConstant(usize),

    #[error("builtin index {0} out of range")]
    InvalidBuiltin(usize),

    #[error("captured variable {0} out of range")]
    InvalidFreeIndex(usize),

    #[error("bad instruction at {ip}: {source}")]
    Bytecode {
        ip: usize,
        #[source]
        source: BytecodeError,
    },

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("builtin {name} failed: {message}")]
    Builtin { name: &'static str, message: String },
}

impl RuntimeError {
    pub fn binary(op: &'static str, left: &Object, right: &Object) -> Self {
        RuntimeError::UnsupportedBinaryTypes {
            op,
            left: left.type_name(),
            right: right.type_name(),
        }
    }

    pub fn bytecode(ip: usize, source: BytecodeError) -> Self {
        RuntimeError::Bytecode { ip, source }
    }

    pub fn builtin(name: &'static str, message: impl Into<String>) -> Self {
        RuntimeError::Builtin {
            name,
            message: message.into(),
        }
    }
}
