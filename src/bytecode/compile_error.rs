use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// An identifier that no enclosing scope or builtin defines.
    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    /// A prefix or infix operator with no bytecode lowering.
    #[error("unknown operator {0}")]
    UnknownOperator(String),

    /// A count or index that does not fit its operand slot.
    #[error("too many {what}: {count} (limit {limit})")]
    OperandOverflow {
        what: &'static str,
        count: usize,
        limit: usize,
    },
}

impl CompileError {
    pub fn undefined_variable(name: &str) -> Self {
        CompileError::UndefinedVariable(name.to_string())
    }

    pub fn unknown_operator(operator: &str) -> Self {
        CompileError::UnknownOperator(operator.to_string())
    }

    pub fn overflow(what: &'static str, count: usize, limit: usize) -> Self {
        CompileError::OperandOverflow { what, count, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable_display() {
        let err = CompileError::undefined_variable("foo");
        assert_eq!(err.to_string(), "undefined variable foo");
    }

    #[test]
    fn test_unknown_operator_display() {
        let err = CompileError::unknown_operator("%");
        assert_eq!(err.to_string(), "unknown operator %");
    }

    #[test]
    fn test_overflow_display() {
        let err = CompileError::overflow("arguments", 300, 255);
        let msg = err.to_string();
        assert!(msg.contains("arguments"));
        assert!(msg.contains("300"));
        assert!(msg.contains("255"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::undefined_variable("x");
        let _: &dyn std::error::Error = &err;
    }
}
