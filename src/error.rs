use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::bytecode::CompileError;
use crate::config::ConfigError;
use crate::frontend::{LexerError, ParserError};
use crate::runtime::RuntimeError;

/// Any failure between source text and a finished run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("parse error: {0}")]
    Parser(#[from] ParserError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("line editor: {0}")]
    Repl(#[from] ReadlineError),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_prefixed_by_stage() {
        let err: Error = CompileError::undefined_variable("x").into();
        assert_eq!(err.to_string(), "compile error: undefined variable x");

        let err: Error = RuntimeError::DivisionByZero.into();
        assert_eq!(err.to_string(), "runtime error: division by zero");
    }

    #[test]
    fn test_line_editor_error_keeps_source() {
        let err: Error = ReadlineError::Io(std::io::Error::other("tty gone")).into();
        assert!(matches!(err, Error::Repl(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("line editor: "));
    }
}
