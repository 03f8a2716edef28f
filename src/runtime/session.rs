use tracing::debug;

use crate::Error;
use crate::bytecode::{Bytecode, Compiler};
use crate::frontend;
use crate::lang::ast::Program;
use crate::lang::object::Object;
use crate::runtime::vm::{Vm, VmConfig};

/// Incremental evaluation: each input sees the globals and definitions of
/// the inputs before it.
pub struct Session {
    compiler: Compiler,
    globals: Vec<Object>,
    config: VmConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Session {
    pub fn new(config: VmConfig) -> Self {
        Self {
            compiler: Compiler::new(),
            globals: Vec::new(),
            config,
        }
    }

    /// Evaluate one chunk of source and return the value of its last
    /// expression statement.
    pub fn eval(&mut self, source: &str) -> Result<Object, Error> {
        let program = frontend::parse(source)?;
        self.eval_program(&program)
    }

    pub fn eval_program(&mut self, program: &Program) -> Result<Object, Error> {
        let bytecode = self.compile(program)?;
        self.run(bytecode)
    }

    /// Compile against the session's symbol table without running.
    pub fn compile(&mut self, program: &Program) -> Result<Bytecode, Error> {
        Ok(self.compiler.compile_program(program)?)
    }

    /// Run bytecode produced by [`Session::compile`]. Globals written before a
    /// runtime error are kept.
    pub fn run(&mut self, bytecode: Bytecode) -> Result<Object, Error> {
        let globals = std::mem::take(&mut self.globals);
        let mut vm = Vm::with_globals(bytecode, globals, self.config.clone());

        let result = vm.run();
        let value = vm.last_popped_stack_elem();
        self.globals = vm.into_globals();

        debug!(ok = result.is_ok(), globals = self.globals.len(), "session eval");
        result?;
        Ok(value)
    }

    pub fn globals(&self) -> &[Object] {
        &self.globals
    }
}
