use thiserror::Error;

use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::ast::{BlockStatement, Expression, Program, Statement};

/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans.
/// Errors at end of input point at the `Eof` token, which the lexer places
/// right after the last character.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {message}")]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Binding power of infix and postfix operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn infix_precedence(token: &Token) -> Precedence {
    match token {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Asterisk | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Pratt parser for Monkey.
///
/// The parser consumes the lexer's `Spanned` tokens and produces a `Program`.
/// Parsing stops at the first error.
///
/// Notes:
/// - Semicolons after statements are optional.
/// - A function literal bound directly by `let` records the binding name, so
///   the compiler can let the body refer to itself.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    /// Creates a new parser from lexer output.
    ///
    /// A trailing `Eof` is appended if the token list lacks one, so `current`
    /// always has something to return.
    pub fn new(mut tokens: Vec<Spanned>) -> Self {
        if !matches!(tokens.last(), Some(Spanned { token: Token::Eof, .. })) {
            let span = tokens
                .last()
                .map(|s| s.span.clone())
                .unwrap_or(Span { line: 1, col: 1 });
            tokens.push(Spanned {
                token: Token::Eof,
                span,
            });
        }
        Parser { tokens, pos: 0 }
    }

    /// Returns the current token without consuming it.
    fn current(&self) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn current_token(&self) -> &Token {
        &self.current().token
    }

    /// Advances past the current token. Never moves beyond `Eof`.
    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    /// Constructs a `ParserError` at the current token.
    fn error(&self, message: impl Into<String>) -> ParserError {
        let span = &self.current().span;
        ParserError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Consumes `expected` or fails with a message naming what was found.
    fn expect(&mut self, expected: Token) -> Result<(), ParserError> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected `{}`, found `{}`",
                expected,
                self.current_token()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParserError> {
        match self.current_token() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found `{}`", other))),
        }
    }

    fn skip_semicolon(&mut self) {
        if *self.current_token() == Token::Semicolon {
            self.advance();
        }
    }

    /// Parses a complete program up to `Eof`.
    pub fn parse_program(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();

        loop {
            match self.current_token() {
                Token::Eof => break,
                // stray semicolons are empty statements
                Token::Semicolon => self.advance(),
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match self.current_token() {
            Token::Let => self.parse_let_statement(),
            Token::Return => {
                self.advance();
                let value = self.parse_expression(Precedence::Lowest)?;
                self.skip_semicolon();
                Ok(Statement::Return(value))
            }
            _ => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.skip_semicolon();
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // `let`
        let name = self.expect_ident()?;
        self.expect(Token::Assign)?;

        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expression::Function { name: fn_name, .. } = &mut value {
            *fn_name = Some(name.clone());
        }

        self.skip_semicolon();
        Ok(Statement::Let { name, value })
    }

    fn parse_block(&mut self) -> Result<BlockStatement, ParserError> {
        self.expect(Token::LBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.current_token() {
                Token::RBrace => break,
                Token::Eof => return Err(self.error("expected `}` before end of input")),
                Token::Semicolon => self.advance(),
                _ => statements.push(self.parse_statement()?),
            }
        }

        self.advance(); // `}`
        Ok(BlockStatement { statements })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let mut left = self.parse_prefix()?;

        while *self.current_token() != Token::Semicolon
            && precedence < infix_precedence(self.current_token())
        {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParserError> {
        let token = self.current_token().clone();

        match token {
            Token::Ident(name) => {
                self.advance();
                Ok(Expression::Identifier(name))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expression::Integer(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expression::String(s))
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expression::Boolean(token == Token::True))
            }
            Token::Bang | Token::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::prefix(&token.to_string(), right))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::If => self.parse_if(),
            Token::Function => self.parse_function(),
            Token::LBracket => {
                self.advance();
                Ok(Expression::Array(self.parse_list(Token::RBracket)?))
            }
            Token::LBrace => self.parse_hash(),
            other => Err(self.error(format!("expected expression, found `{}`", other))),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression, ParserError> {
        let token = self.current_token().clone();

        match token {
            Token::LParen => {
                self.advance();
                let arguments = self.parse_list(Token::RParen)?;
                Ok(Expression::Call {
                    function: Box::new(left),
                    arguments,
                })
            }
            Token::LBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RBracket)?;
                Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                })
            }
            _ => {
                let precedence = infix_precedence(&token);
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expression::infix(left, &token.to_string(), right))
            }
        }
    }

    /// `if (<condition>) { ... } [else { ... }]`
    fn parse_if(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // `if`
        self.expect(Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RParen)?;

        let consequence = self.parse_block()?;

        let alternative = if *self.current_token() == Token::Else {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// `fn(<params>) { ... }`
    fn parse_function(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // `fn`
        self.expect(Token::LParen)?;

        let mut parameters = Vec::new();
        if *self.current_token() == Token::RParen {
            self.advance();
        } else {
            loop {
                parameters.push(self.expect_ident()?);
                if *self.current_token() == Token::Comma {
                    self.advance();
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }

        let body = self.parse_block()?;

        Ok(Expression::Function {
            parameters,
            body,
            name: None,
        })
    }

    /// Comma separated expressions up to and including `end`.
    fn parse_list(&mut self, end: Token) -> Result<Vec<Expression>, ParserError> {
        let mut items = Vec::new();

        if *self.current_token() == end {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_expression(Precedence::Lowest)?);
            if *self.current_token() == Token::Comma {
                self.advance();
                continue;
            }
            self.expect(end)?;
            return Ok(items);
        }
    }

    /// `{<key>: <value>, ...}`
    fn parse_hash(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // `{`
        let mut pairs = Vec::new();

        while *self.current_token() != Token::RBrace {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if *self.current_token() != Token::RBrace {
                self.expect(Token::Comma)?;
            }
        }

        self.advance(); // `}`
        Ok(Expression::Hash(pairs))
    }
}
