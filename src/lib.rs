//! Bytecode compiler and stack virtual machine for the Monkey language.
//!
//! Source text goes through [`frontend`] to a [`lang::ast::Program`], the
//! [`bytecode::Compiler`] lowers it to a flat instruction stream plus a
//! constant pool, and [`runtime::Vm`] executes the result.
//! [`runtime::Session`] ties the stages together for incremental use.

pub mod bytecode;
pub mod config;
pub mod error;
pub mod frontend;
pub mod lang;
pub mod runtime;

pub use config::Config;
pub use error::Error;
pub use runtime::{Session, Vm, VmConfig};
