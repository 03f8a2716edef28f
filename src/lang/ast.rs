//! Abstract syntax tree consumed by the bytecode compiler.
//!
//! `Display` renders canonical source text. The compiler relies on it to
//! order hash literal keys, so two literals with the same keys always
//! compile to the same bytecode.

use std::fmt;

/// A parsed Monkey program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let <name> = <value>;`
    Let { name: String, value: Expression },

    /// `return <value>;`
    Return(Expression),

    /// An expression evaluated for its value, which is then discarded.
    Expression(Expression),
}

/// `{ ... }` body of a conditional or function literal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    Integer(i64),
    String(String),
    Boolean(bool),

    /// `-x`, `!x`
    Prefix {
        operator: String,
        right: Box<Expression>,
    },

    /// `a + b`, `a < b`, ...
    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },

    Function {
        parameters: Vec<String>,
        body: BlockStatement,
        /// Set when the literal is bound directly by `let`, enabling
        /// self-reference from inside the body.
        name: Option<String>,
    },

    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },

    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },

    Array(Vec<Expression>),

    /// Pairs in source order. The compiler sorts them before emitting.
    Hash(Vec<(Expression, Expression)>),
}

impl Expression {
    pub fn prefix(operator: &str, right: Expression) -> Self {
        Expression::Prefix {
            operator: operator.to_string(),
            right: Box::new(right),
        }
    }

    pub fn infix(left: Expression, operator: &str, right: Expression) -> Self {
        Expression::Infix {
            operator: operator.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn ident(name: &str) -> Self {
        Expression::Identifier(name.to_string())
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::String(s) => write!(f, "{}", s),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, "else {}", alt)?;
                }
                Ok(())
            }
            Expression::Function {
                parameters,
                body,
                name,
            } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "(")?;
                join(f, parameters)?;
                write!(f, ") {}", body)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                join(f, arguments)?;
                write!(f, ")")
            }
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expression::Array(elements) => {
                write!(f, "[")?;
                join(f, elements)?;
                write!(f, "]")
            }
            Expression::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
