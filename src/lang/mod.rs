//! # Monkey language data model
//!
//! The syntax tree produced by the parser and the runtime objects shared by
//! the compiler (constant pool) and the virtual machine (stack, globals).

pub mod ast;
pub mod object;
