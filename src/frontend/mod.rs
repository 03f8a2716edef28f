//! Source text to AST: lexer, Pratt parser, and the `--tokens` dumper.

pub mod lexer;
pub mod parser;
pub mod token;
pub mod token_dumper;

use crate::Error;
use crate::lang::ast::Program;

pub use lexer::{Lexer, LexerError, Span, Spanned};
pub use parser::{Parser, ParserError};
pub use token::Token;

/// Lex and parse a complete source text.
pub fn parse(source: &str) -> Result<Program, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(Parser::new(tokens).parse_program()?)
}
