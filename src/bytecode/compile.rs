use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{Opcode, make};
use crate::bytecode::symbol_table::{ClosedScope, Symbol, SymbolScope, SymbolTable};
use crate::bytecode::{Bytecode, Instructions};
use crate::lang::ast::{BlockStatement, Expression, Program, Statement};
use crate::lang::object::{CompiledFunction, Object};
use crate::runtime::builtins::BUILTINS;

/// Largest value a one-byte operand can hold.
const U8_OPERAND: usize = u8::MAX as usize;
/// Largest value a two-byte operand can hold.
const U16_OPERAND: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Build state of one function body (or the top level).
#[derive(Debug, Clone, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// AST to bytecode compiler.
///
/// The symbol table and constant pool survive between calls to
/// [`Compiler::compile_program`], so one compiler can serve a whole REPL
/// session.
pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compile a program into a fresh top-level stream.
    ///
    /// On error the symbol table and constant pool are restored to their
    /// state before the call and no bytecode is returned.
    pub fn compile_program(&mut self, program: &Program) -> Result<Bytecode, CompileError> {
        let symbols = self.symbol_table.globals_snapshot();
        let constants_len = self.constants.len();
        self.scopes = vec![CompilationScope::default()];

        debug!(
            statements = program.statements.len(),
            constants = constants_len,
            "compiling program"
        );

        if let Err(err) = self.compile_statements(&program.statements) {
            debug!(error = %err, "compilation failed, rolling back");
            self.symbol_table = symbols;
            self.constants.truncate(constants_len);
            self.scopes = vec![CompilationScope::default()];
            return Err(err);
        }

        Ok(self.bytecode())
    }

    /// The current top-level stream together with the whole constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    pub fn constants(&self) -> &[Object] {
        &self.constants
    }

    fn compile_statements(&mut self, statements: &[Statement]) -> Result<(), CompileError> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        self.compile_statements(&block.statements)
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
            }

            // The name is defined before the initializer is compiled, so a
            // function literal can load its own binding.
            Statement::Let { name, value } => {
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;

                match symbol.scope {
                    SymbolScope::Global => {
                        let index = operand("globals", symbol.index, U16_OPERAND)?;
                        self.emit(Opcode::SetGlobal, &[index]);
                    }
                    _ => {
                        let index = operand("locals", symbol.index, U8_OPERAND)?;
                        self.emit(Opcode::SetLocal, &[index]);
                    }
                }
            }

            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
        }

        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Integer(n) => {
                let index = self.add_constant(Object::Integer(*n))?;
                self.emit(Opcode::Constant, &[index]);
            }

            Expression::String(s) => {
                let index = self.add_constant(Object::string(s.as_str()))?;
                self.emit(Opcode::Constant, &[index]);
            }

            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[]);
            }

            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name))?;
                self.load_symbol(&symbol)?;
            }

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;

                match operator.as_str() {
                    "-" => self.emit(Opcode::Minus, &[]),
                    "!" => self.emit(Opcode::Bang, &[]),
                    other => return Err(CompileError::unknown_operator(other)),
                };
            }

            // `a < b` is emitted as `b > a`
            Expression::Infix {
                operator,
                left,
                right,
            } if operator == "<" => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Opcode::GreaterThan, &[]);
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;

                let op = match operator.as_str() {
                    "+" => Opcode::Add,
                    "-" => Opcode::Sub,
                    "*" => Opcode::Mul,
                    "/" => Opcode::Div,
                    ">" => Opcode::GreaterThan,
                    "==" => Opcode::Equal,
                    "!=" => Opcode::NotEqual,
                    other => return Err(CompileError::unknown_operator(other)),
                };
                self.emit(op, &[]);
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,

            Expression::Function {
                parameters,
                body,
                name,
            } => self.compile_function(parameters, body, name.as_deref())?,

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }

                let argc = operand("arguments", arguments.len(), U8_OPERAND)?;
                self.emit(Opcode::Call, &[argc]);
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }

            Expression::Array(elements) => {
                for el in elements {
                    self.compile_expression(el)?;
                }

                let count = operand("array elements", elements.len(), U16_OPERAND)?;
                self.emit(Opcode::Array, &[count]);
            }

            // Keys are ordered by their source text so the same literal always
            // produces the same stream.
            Expression::Hash(pairs) => {
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|pair| pair.0.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }

                let count = operand("hash entries", pairs.len() * 2, U16_OPERAND)?;
                self.emit(Opcode::Hash, &[count]);
            }
        }

        Ok(())
    }

    // =========================================================================
    // Conditionals
    // =========================================================================

    /// ```text
    ///   <condition>
    ///   JumpNotTruthy  -> ALT
    ///   <consequence> | Null  (trailing Pop removed)
    ///   Jump           -> END
    /// ALT:
    ///   <alternative> | Null
    /// END:
    /// ```
    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        // placeholder target, patched below
        let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        self.finish_branch();

        let jump_pos = self.emit(Opcode::Jump, &[9999]);

        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence)?;

        match alternative {
            None => {
                self.emit(Opcode::Null, &[]);
            }
            Some(alt) => {
                self.compile_block(alt)?;
                self.finish_branch();
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative)?;

        Ok(())
    }

    /// Leave exactly one value from a branch body. A trailing expression
    /// keeps its value; an empty body or one ending in `let` yields null.
    fn finish_branch(&mut self) {
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Null, &[]);
        }
    }

    // =========================================================================
    // Function literals
    // =========================================================================

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
        name: Option<&str>,
    ) -> Result<(), CompileError> {
        let num_parameters = operand("parameters", parameters.len(), U8_OPERAND)?;

        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for param in parameters {
            self.symbol_table.define(param);
        }

        self.compile_block(body)?;

        // implicit return of the last expression
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        // empty body, or a body ending in a let
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let (instructions, closed) = self.leave_scope();
        let num_free = operand("captured variables", closed.free_symbols.len(), U8_OPERAND)?;

        // Captured values are pushed in capture order right before Closure.
        for free in &closed.free_symbols {
            self.load_symbol(free)?;
        }

        let func = CompiledFunction {
            instructions,
            num_locals: closed.num_definitions,
            num_parameters,
        };
        let index = self.add_constant(Object::CompiledFunction(Rc::new(func)))?;
        self.emit(Opcode::Closure, &[index, num_free]);

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        match symbol.scope {
            SymbolScope::Global => {
                let index = operand("globals", symbol.index, U16_OPERAND)?;
                self.emit(Opcode::GetGlobal, &[index]);
            }
            SymbolScope::Local => {
                let index = operand("locals", symbol.index, U8_OPERAND)?;
                self.emit(Opcode::GetLocal, &[index]);
            }
            SymbolScope::Builtin => {
                let index = operand("builtins", symbol.index, U8_OPERAND)?;
                self.emit(Opcode::GetBuiltin, &[index]);
            }
            SymbolScope::Free => {
                let index = operand("captured variables", symbol.index, U8_OPERAND)?;
                self.emit(Opcode::GetFree, &[index]);
            }
            SymbolScope::Function => {
                self.emit(Opcode::CurrentClosure, &[]);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn add_constant(&mut self, obj: Object) -> Result<usize, CompileError> {
        let index = operand("constants", self.constants.len(), U16_OPERAND)?;
        self.constants.push(obj);
        Ok(index)
    }

    /// Append an instruction and return its offset.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let ins = make(op, operands);
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(&ins);

        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });

        position
    }

    fn current_scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        matches!(self.current_scope().last_instruction, Some(last) if last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction.as_mut() {
            last.opcode = Opcode::ReturnValue;
            let position = last.position;
            scope
                .instructions
                .replace(position, &make(Opcode::ReturnValue, &[]));
        }
    }

    /// Backpatch the single operand of the instruction at `op_pos`.
    fn change_operand(&mut self, op_pos: usize, value: usize) -> Result<(), CompileError> {
        let value = operand("instruction bytes", value, U16_OPERAND)?;
        let Some(op) = Opcode::from_byte(self.current_instructions()[op_pos]) else {
            return Ok(());
        };

        let ins = make(op, &[value]);
        self.current_scope_mut().instructions.replace(op_pos, &ins);
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbol_table.enter();
        trace!(depth = self.symbol_table.depth(), "enter function scope");
    }

    fn leave_scope(&mut self) -> (Instructions, ClosedScope) {
        let scope = self.scopes.pop().unwrap_or_default();
        let closed = self.symbol_table.leave();
        trace!(
            locals = closed.num_definitions,
            free = closed.free_symbols.len(),
            bytes = scope.instructions.len(),
            "leave function scope"
        );
        (scope.instructions, closed)
    }
}

/// Check that `value` fits an operand whose maximum is `limit`.
fn operand(what: &'static str, value: usize, limit: usize) -> Result<usize, CompileError> {
    if value > limit {
        return Err(CompileError::overflow(what, value, limit));
    }
    Ok(value)
}
