pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbol_table;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use ir::{Bytecode, Instructions};
pub use op::{BytecodeError, Definition, Opcode, make};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
