use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::bytecode::op::{Opcode, read_u8, read_u16};
use crate::bytecode::{Bytecode, BytecodeError};
use crate::lang::object::{Builtin, Closure, CompiledFunction, HashPair, Object};
use crate::runtime::builtins::BUILTINS;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::RuntimeError;

/// Resource limits of one VM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Value stack capacity, in slots.
    pub stack_size: usize,
    /// Maximum number of live call frames, the top-level frame included.
    pub max_frames: usize,
    /// Upper bound on the globals array.
    pub globals_size: usize,
    /// Abort after this many executed instructions.
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 2048,
            max_frames: 1024,
            globals_size: 65536,
            max_steps: None,
        }
    }
}

/// Operands of one decoded instruction. Unused slots stay zero.
type Operands = [usize; 2];

pub struct Vm {
    constants: Vec<Object>,

    stack: Vec<Object>,
    /// Next free slot. The top of stack is `stack[sp - 1]`.
    sp: usize,

    globals: Vec<Object>,
    frames: Vec<Frame>,

    config: VmConfig,
    steps: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode, config: VmConfig) -> Self {
        Self::with_globals(bytecode, Vec::new(), config)
    }

    /// Run against globals left behind by an earlier VM of the same session.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Object>, config: VmConfig) -> Self {
        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main_closure = Rc::new(Closure {
            func: Rc::new(main_fn),
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(config.max_frames.min(64));
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Object::Null; config.stack_size],
            sp: 0,
            globals,
            frames,
            config,
            steps: 0,
        }
    }

    /// The element most recently removed from the stack. After a program of
    /// expression statements this is the value of the last one.
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack.get(self.sp).cloned().unwrap_or(Object::Null)
    }

    pub fn globals(&self) -> &[Object] {
        &self.globals
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!(
            bytes = self.current_frame().instructions().len(),
            constants = self.constants.len(),
            globals = self.globals.len(),
            "vm run start"
        );

        while let Some((op, operands)) = self.fetch()? {
            self.check_limits()?;
            self.execute(op, operands)?;
        }

        debug!(steps = self.steps, sp = self.sp, "vm run finished");
        Ok(())
    }

    /// Decode the instruction at the current frame's ip and advance past it.
    /// `None` once the frame's stream is exhausted.
    fn fetch(&mut self) -> Result<Option<(Opcode, Operands)>, RuntimeError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(None);
        };

        let ip = frame.ip;
        let ins: &[u8] = &frame.closure.func.instructions;
        let Some(&byte) = ins.get(ip) else {
            return Ok(None);
        };

        let op = Opcode::from_byte(byte)
            .ok_or_else(|| RuntimeError::bytecode(ip, BytecodeError::UndefinedOpcode(byte)))?;
        let def = op.definition();

        let available = ins.len() - ip - 1;
        let needed = def.instruction_len() - 1;
        if available < needed {
            return Err(RuntimeError::bytecode(
                ip,
                BytecodeError::Truncated {
                    name: def.name,
                    needed,
                    available,
                },
            ));
        }

        let mut operands: Operands = [0; 2];
        let mut offset = ip + 1;
        for (slot, &width) in operands.iter_mut().zip(def.operand_widths) {
            *slot = match width {
                2 => read_u16(ins, offset) as usize,
                _ => read_u8(ins, offset) as usize,
            };
            offset += width;
        }

        frame.ip = offset;
        Ok(Some((op, operands)))
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimitExceeded(max));
            }
        }

        Ok(())
    }

    fn execute(&mut self, op: Opcode, operands: Operands) -> Result<(), RuntimeError> {
        match op {
            Opcode::Constant => {
                let index = operands[0];
                let constant = self
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or(RuntimeError::InvalidConstant(index))?;
                self.push(constant)?;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                self.execute_binary_operation(op)?;
            }

            Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                self.execute_comparison(op)?;
            }

            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::True => self.push(Object::Boolean(true))?,
            Opcode::False => self.push(Object::Boolean(false))?,
            Opcode::Null => self.push(Object::Null)?,

            Opcode::Bang => {
                let operand = self.pop()?;
                self.push(Object::Boolean(!operand.is_truthy()))?;
            }

            Opcode::Minus => {
                let operand = self.pop()?;
                match operand {
                    Object::Integer(n) => self.push(Object::Integer(n.wrapping_neg()))?,
                    other => return Err(RuntimeError::UnsupportedNegation(other.type_name())),
                }
            }

            Opcode::Jump => {
                self.current_frame_mut().ip = operands[0];
            }

            Opcode::JumpNotTruthy => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.current_frame_mut().ip = operands[0];
                }
            }

            Opcode::SetGlobal => {
                let index = operands[0];
                let value = self.pop()?;
                self.set_global(index, value)?;
            }

            // Slots that were never stored to read as null.
            Opcode::GetGlobal => {
                let value = self
                    .globals
                    .get(operands[0])
                    .cloned()
                    .unwrap_or(Object::Null);
                self.push(value)?;
            }

            Opcode::SetLocal => {
                let slot = self.current_frame().base_pointer + operands[0];
                let value = self.pop()?;
                *self.slot_mut(slot)? = value;
            }

            Opcode::GetLocal => {
                let slot = self.current_frame().base_pointer + operands[0];
                let value = self.stack.get(slot).cloned().ok_or(RuntimeError::StackOverflow {
                    limit: self.config.stack_size,
                })?;
                self.push(value)?;
            }

            Opcode::GetBuiltin => {
                let index = operands[0];
                let builtin: &'static Builtin =
                    BUILTINS.get(index).ok_or(RuntimeError::InvalidBuiltin(index))?;
                self.push(Object::Builtin(builtin))?;
            }

            Opcode::GetFree => {
                let index = operands[0];
                let value = self
                    .current_frame()
                    .closure
                    .free
                    .get(index)
                    .cloned()
                    .ok_or(RuntimeError::InvalidFreeIndex(index))?;
                self.push(value)?;
            }

            Opcode::CurrentClosure => {
                let closure = Rc::clone(&self.current_frame().closure);
                self.push(Object::Closure(closure))?;
            }

            Opcode::Array => {
                let elements = self.take(operands[0])?;
                self.push(Object::array(elements))?;
            }

            Opcode::Hash => {
                let entries = self.take(operands[0])?;
                let hash = build_hash(entries)?;
                self.push(hash)?;
            }

            Opcode::Index => {
                let index = self.pop()?;
                let left = self.pop()?;
                let value = execute_index(&left, &index)?;
                self.push(value)?;
            }

            Opcode::Call => self.execute_call(operands[0])?,

            Opcode::ReturnValue => {
                let value = self.pop()?;
                self.return_from_frame(value)?;
            }

            Opcode::Return => self.return_from_frame(Object::Null)?,

            Opcode::Closure => self.push_closure(operands[0], operands[1])?,
        }

        Ok(())
    }

    // =========================================================================
    // Stack
    // =========================================================================

    fn push(&mut self, obj: Object) -> Result<(), RuntimeError> {
        let Some(slot) = self.stack.get_mut(self.sp) else {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.stack_size,
            });
        };
        *slot = obj;
        self.sp += 1;
        Ok(())
    }

    /// The popped slot is left in place so `last_popped_stack_elem` can read it.
    fn pop(&mut self) -> Result<Object, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    /// Remove the top `count` values, returned bottom first.
    fn take(&mut self, count: usize) -> Result<Vec<Object>, RuntimeError> {
        let start = self
            .sp
            .checked_sub(count)
            .ok_or(RuntimeError::StackUnderflow)?;
        let values = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(values)
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Object, RuntimeError> {
        let limit = self.config.stack_size;
        self.stack
            .get_mut(slot)
            .ok_or(RuntimeError::StackOverflow { limit })
    }

    fn set_global(&mut self, index: usize, value: Object) -> Result<(), RuntimeError> {
        if index >= self.config.globals_size {
            return Err(RuntimeError::GlobalsOverflow {
                index,
                limit: self.config.globals_size,
            });
        }
        if index >= self.globals.len() {
            self.globals.resize(index + 1, Object::Null);
        }
        self.globals[index] = value;
        Ok(())
    }

    // =========================================================================
    // Frames
    // =========================================================================

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn execute_call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee_slot = self
            .sp
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;

        match self.stack[callee_slot].clone() {
            Object::Closure(closure) => self.call_closure(closure, argc),
            Object::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(RuntimeError::NotAFunction(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        let func = &closure.func;
        if argc != func.num_parameters {
            return Err(RuntimeError::WrongArgumentCount {
                want: func.num_parameters,
                got: argc,
            });
        }

        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeError::FrameOverflow {
                limit: self.config.max_frames,
            });
        }

        let base_pointer = self.sp - argc;
        let new_sp = base_pointer + func.num_locals;
        if new_sp > self.stack.len() {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.stack_size,
            });
        }

        // fresh locals start out null
        for slot in &mut self.stack[self.sp..new_sp] {
            *slot = Object::Null;
        }
        self.sp = new_sp;

        trace!(
            depth = self.frames.len(),
            base_pointer,
            locals = func.num_locals,
            "push frame"
        );
        self.frames.push(Frame::new(closure, base_pointer));
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static Builtin, argc: usize) -> Result<(), RuntimeError> {
        let args_start = self.sp - argc;
        let result = (builtin.func)(&self.stack[args_start..self.sp])?;

        // drop the arguments and the callee
        self.sp = args_start - 1;
        self.push(result)
    }

    /// Unwind to just below the callee slot and push `value` for the caller.
    ///
    /// A return at top level ends the run with `value` as the last popped
    /// element.
    fn return_from_frame(&mut self, value: Object) -> Result<(), RuntimeError> {
        if self.frames.len() == 1 {
            let frame = self.current_frame_mut();
            frame.ip = frame.instructions().len();
            let top = self.sp;
            *self.slot_mut(top)? = value;
            return Ok(());
        }

        let frame = self.frames.pop().ok_or(RuntimeError::StackUnderflow)?;
        trace!(depth = self.frames.len(), "pop frame");

        self.sp = frame
            .base_pointer
            .checked_sub(1)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.push(value)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let func = match self.constants.get(const_index) {
            Some(Object::CompiledFunction(func)) => Rc::clone(func),
            _ => return Err(RuntimeError::InvalidConstant(const_index)),
        };

        let free = self.take(num_free)?;
        self.push(Object::Closure(Rc::new(Closure { func, free })))
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                Object::Integer(integer_arithmetic(op, *l, *r)?)
            }
            (Object::String(l), Object::String(r)) if op == Opcode::Add => {
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                Object::string(joined)
            }
            _ => return Err(RuntimeError::binary(operator_symbol(op), &left, &right)),
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match op {
            Opcode::Equal => objects_equal(&left, &right),
            Opcode::NotEqual => !objects_equal(&left, &right),
            _ => match (&left, &right) {
                (Object::Integer(l), Object::Integer(r)) => l > r,
                _ => return Err(RuntimeError::binary(operator_symbol(op), &left, &right)),
            },
        };

        self.push(Object::Boolean(result))
    }
}

fn integer_arithmetic(op: Opcode, left: i64, right: i64) -> Result<i64, RuntimeError> {
    Ok(match op {
        Opcode::Add => left.wrapping_add(right),
        Opcode::Sub => left.wrapping_sub(right),
        Opcode::Mul => left.wrapping_mul(right),
        _ => {
            if right == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            left.wrapping_div(right)
        }
    })
}

fn operator_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        _ => "?",
    }
}

/// Scalars compare by value, aggregates and functions by identity.
/// Values of different kinds are never equal.
fn objects_equal(left: &Object, right: &Object) -> bool {
    match (left, right) {
        (Object::Integer(l), Object::Integer(r)) => l == r,
        (Object::Boolean(l), Object::Boolean(r)) => l == r,
        (Object::String(l), Object::String(r)) => l == r,
        (Object::Null, Object::Null) => true,
        (Object::Array(l), Object::Array(r)) => Rc::ptr_eq(l, r),
        (Object::Hash(l), Object::Hash(r)) => Rc::ptr_eq(l, r),
        (Object::CompiledFunction(l), Object::CompiledFunction(r)) => Rc::ptr_eq(l, r),
        (Object::Closure(l), Object::Closure(r)) => Rc::ptr_eq(l, r),
        (Object::Builtin(l), Object::Builtin(r)) => std::ptr::eq(*l, *r),
        (Object::Error(l), Object::Error(r)) => Rc::ptr_eq(l, r),
        _ => false,
    }
}

fn build_hash(entries: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut pairs = IndexMap::with_capacity(entries.len() / 2);
    let mut iter = entries.into_iter();

    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let hash_key = key
            .hash_key()
            .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
        pairs.insert(hash_key, HashPair { key, value });
    }

    Ok(Object::Hash(Rc::new(pairs)))
}

fn execute_index(left: &Object, index: &Object) -> Result<Object, RuntimeError> {
    match (left, index) {
        (Object::Array(elements), Object::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| elements.get(i))
            .cloned()
            .unwrap_or(Object::Null)),
        (Object::Hash(pairs), key) => {
            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            Ok(pairs
                .get(&hash_key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Object::Null))
        }
        _ => Err(RuntimeError::IndexNotSupported {
            container: left.type_name(),
            index: index.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Compiler, Instructions, make};
    use crate::frontend::parse;
    use crate::lang::object::HashKey;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    fn run_with_config(input: &str, config: VmConfig) -> Result<Object, RuntimeError> {
        let program = parse(input).expect("parse");
        let bytecode = Compiler::new().compile_program(&program).expect("compile");
        let mut vm = Vm::new(bytecode, config);
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    fn run(input: &str) -> Result<Object, RuntimeError> {
        run_with_config(input, VmConfig::default())
    }

    fn assert_result(input: &str, expected: Object) {
        match run(input) {
            Ok(got) => assert_eq!(got, expected, "input: {}", input),
            Err(e) => panic!("input {:?} failed: {}", input, e),
        }
    }

    fn assert_error(input: &str, contains: &str) {
        match run(input) {
            Ok(got) => panic!("expected error '{}' for {:?}, got {}", contains, input, got),
            Err(e) => assert!(
                e.to_string().contains(contains),
                "expected error containing '{}', got '{}'",
                contains,
                e
            ),
        }
    }

    fn int(n: i64) -> Object {
        Object::Integer(n)
    }

    fn ints(values: &[i64]) -> Object {
        Object::array(values.iter().map(|&n| int(n)).collect())
    }

    fn run_raw(instructions: Vec<Vec<u8>>, constants: Vec<Object>) -> Result<Object, RuntimeError> {
        let bytecode = Bytecode {
            instructions: Instructions::concat(instructions),
            constants,
        };
        let mut vm = Vm::new(bytecode, VmConfig::default());
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_integer_arithmetic() {
        let cases = [
            ("1", 1),
            ("1 + 2", 3),
            ("1 - 2", -1),
            ("4 / 2", 2),
            ("50 / 2 * 2 + 10 - 5", 55),
            ("5 * (2 + 10)", 60),
            ("-5", -5),
            ("-50 + 100 + -50", 0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ];
        for (input, expected) in cases {
            assert_result(input, int(expected));
        }
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_result("9223372036854775807 + 1", int(i64::MIN));
    }

    #[test]
    fn test_boolean_expressions() {
        let cases = [
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("true == true", true),
            ("true != false", true),
            ("(1 < 2) == true", true),
            ("(1 > 2) == true", false),
            ("!true", false),
            ("!5", false),
            ("!!5", true),
            ("!(if (false) { 5; })", true),
            ("1 == true", false),
        ];
        for (input, expected) in cases {
            assert_result(input, Object::Boolean(expected));
        }
    }

    #[test]
    fn test_equality_of_strings_and_aggregates() {
        assert_result(r#""a" == "a""#, Object::Boolean(true));
        assert_result(r#""a" != "b""#, Object::Boolean(true));
        assert_result("[1] == [1]", Object::Boolean(false));
        assert_result("let a = [1]; a == a", Object::Boolean(true));
        assert_result("len == len", Object::Boolean(true));
    }

    #[test]
    fn test_conditionals() {
        assert_result("if (true) { 10 }", int(10));
        assert_result("if (true) { 10 } else { 20 }", int(10));
        assert_result("if (false) { 10 } else { 20 } ", int(20));
        assert_result("if (1) { 10 }", int(10));
        assert_result("if (1 < 2) { 10 } else { 20 }", int(10));
        assert_result("if (1 > 2) { 10 }", Object::Null);
        assert_result("if (false) { 10 }", Object::Null);
        assert_result("if ((if (false) { 10 })) { 10 } else { 20 }", int(20));
    }

    #[test]
    fn test_conditional_leaves_only_branch_value() {
        assert_result("if (true) { 10 } else { 20 }; 3333;", int(3333));
    }

    #[test]
    fn test_conditional_without_branch_value_is_null() {
        assert_result("if (true) {}", Object::Null);
        assert_result("if (false) { 1 } else {}", Object::Null);
        assert_result("if (true) { let y = 1; }", Object::Null);

        // the branch must not consume the caller's slots
        let seven_and_null = Object::array(vec![int(7), Object::Null]);
        assert_result("fn(a) { [a, if (true) { }] }(7)", seven_and_null.clone());
        assert_result(
            "let h = fn(a) { let r = [a, if (true) { let b = 2; }]; r }; h(7)",
            seven_and_null,
        );
        assert_error("let f = fn() { 1 + if (true) {} }; f()", "INTEGER + NULL");
    }

    #[test]
    fn test_global_let_statements() {
        assert_result("let one = 1; one", int(1));
        assert_result("let one = 1; let two = 2; one + two", int(3));
        assert_result("let one = 1; let two = one + one; one + two", int(3));
    }

    #[test]
    fn test_string_expressions() {
        assert_result(r#""monkey""#, Object::from("monkey"));
        assert_result(r#""mon" + "key""#, Object::from("monkey"));
        assert_result(r#""mon" + "key" + "banana""#, Object::from("monkeybanana"));
    }

    #[test]
    fn test_array_literals() {
        assert_result("[]", ints(&[]));
        assert_result("[1, 2, 3]", ints(&[1, 2, 3]));
        assert_result("[1 + 2, 3 * 4, 5 + 6]", ints(&[3, 12, 11]));
    }

    #[test]
    fn test_hash_literals() {
        let result = run("{1: 2, 2: 3}").unwrap();
        let Object::Hash(pairs) = result else {
            panic!("expected hash, got {}", result);
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[&HashKey::Integer(1)].value, int(2));
        assert_eq!(pairs[&HashKey::Integer(2)].value, int(3));

        assert_result("{}", Object::Hash(Rc::new(IndexMap::new())));
    }

    #[test]
    fn test_index_expressions() {
        let cases = [
            ("[1, 2, 3][1]", int(2)),
            ("[1, 2, 3][0 + 2]", int(3)),
            ("[[1, 1, 1]][0][0]", int(1)),
            ("[1, 2, 3][0]", int(1)),
            ("[][0]", Object::Null),
            ("[1, 2, 3][99]", Object::Null),
            ("[1, 2, 3][5]", Object::Null),
            ("[1][-1]", Object::Null),
            ("{1: 1, 2: 2}[1]", int(1)),
            ("{1: 1, 2: 2}[2]", int(2)),
            ("{1: 1}[0]", Object::Null),
            ("{}[0]", Object::Null),
            (r#"{"a": 1}["b"]"#, Object::Null),
            (r#"{"a": 1}["a"]"#, int(1)),
            ("{true: 5}[true]", int(5)),
        ];
        for (input, expected) in cases {
            assert_result(input, expected);
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_calling_functions_without_arguments() {
        assert_result("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", int(15));
        assert_result(
            "let one = fn() { 1; }; let two = fn() { 2; }; one() + two()",
            int(3),
        );
        assert_result(
            "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
            int(3),
        );
    }

    #[test]
    fn test_functions_with_return_statement() {
        assert_result("let earlyExit = fn() { return 99; 100; }; earlyExit();", int(99));
        assert_result("let earlyExit = fn() { return 99; return 100; }; earlyExit();", int(99));
    }

    #[test]
    fn test_functions_without_return_value() {
        assert_result("let noReturn = fn() { }; noReturn();", Object::Null);
        assert_result(
            "let noReturn = fn() { }; let noReturnTwo = fn() { noReturn(); }; noReturn(); noReturnTwo();",
            Object::Null,
        );
    }

    #[test]
    fn test_first_class_functions() {
        assert_result(
            "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
            int(1),
        );
        assert_result(
            "let returnsOneReturner = fn() { let returnsOne = fn() { 1; }; returnsOne; }; returnsOneReturner()();",
            int(1),
        );
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        assert_result("let one = fn() { let one = 1; one }; one();", int(1));
        assert_result(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
            int(3),
        );
        assert_result(
            "let firstFoobar = fn() { let foobar = 50; foobar; };
             let secondFoobar = fn() { let foobar = 100; foobar; };
             firstFoobar() + secondFoobar();",
            int(150),
        );
        assert_result(
            "let globalSeed = 50;
             let minusOne = fn() { let num = 1; globalSeed - num; };
             let minusTwo = fn() { let num = 2; globalSeed - num; };
             minusOne() + minusTwo();",
            int(97),
        );
    }

    #[test]
    fn test_calling_functions_with_arguments_and_bindings() {
        assert_result("let identity = fn(a) { a; }; identity(4);", int(4));
        assert_result("let sum = fn(a, b) { a + b; }; sum(1, 2);", int(3));
        assert_result("let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);", int(3));
        assert_result(
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            int(10),
        );
        assert_result(
            "let sum = fn(a, b) { let c = a + b; c; };
             let outer = fn() { sum(1, 2) + sum(3, 4); };
             outer();",
            int(10),
        );
    }

    #[test]
    fn test_calling_functions_with_wrong_arguments() {
        assert_error("fn() { 1; }(1);", "wrong number of arguments: want=0, got=1");
        assert_error("fn(a) { a; }();", "wrong number of arguments: want=1, got=0");
        assert_error("fn(a, b) { a + b; }(1);", "wrong number of arguments: want=2, got=1");
        assert_error("fn(a) { a }(1, 2);", "wrong number of arguments: want=1, got=2");
    }

    #[test]
    fn test_top_level_return_ends_program() {
        assert_result("return 5; 6;", int(5));
    }

    #[test]
    fn test_top_level_return_on_full_stack() {
        let bytecode = Bytecode {
            instructions: Instructions::concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Return, &[]),
            ]),
            constants: vec![int(1)],
        };
        let config = VmConfig {
            stack_size: 1,
            ..Default::default()
        };
        let mut vm = Vm::new(bytecode, config);
        assert_eq!(vm.run(), Err(RuntimeError::StackOverflow { limit: 1 }));
    }

    // =========================================================================
    // Builtins
    // =========================================================================

    #[test]
    fn test_builtin_functions() {
        assert_result(r#"len("")"#, int(0));
        assert_result(r#"len("four")"#, int(4));
        assert_result(r#"len("hello world")"#, int(11));
        assert_result(
            "len(1)",
            Object::error("argument to `len` not supported, got INTEGER"),
        );
        assert_result(
            r#"len("one", "two")"#,
            Object::error("wrong number of arguments. got=2, want=1"),
        );
        assert_result("len([1, 2, 3])", int(3));
        assert_result("len([])", int(0));
        assert_result(r#"puts("hello", "world!")"#, Object::Null);
        assert_result("first([1, 2, 3])", int(1));
        assert_result("first([])", Object::Null);
        assert_result("last([1, 2, 3])", int(3));
        assert_result("rest([1, 2, 3])", ints(&[2, 3]));
        assert_result("rest([])", Object::Null);
        assert_result("push([], 1)", ints(&[1]));
        assert_result(
            "push(1, 1)",
            Object::error("argument to `push` must be ARRAY, got INTEGER"),
        );
    }

    #[test]
    fn test_error_values_are_ordinary_values() {
        assert_result("let e = len(1); 5", int(5));
        assert_error("len(1)()", "calling non-function: ERROR");
    }

    // =========================================================================
    // Closures
    // =========================================================================

    #[test]
    fn test_closures() {
        assert_result(
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            int(99),
        );
        assert_result(
            "let newAdder = fn(a) { fn(b) { a + b } }; let addTwo = newAdder(2); addTwo(3);",
            int(5),
        );
        assert_result(
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
            int(11),
        );
        assert_result(
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) {
                     let e = d + c;
                     fn(f) { e + f; };
                 };
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            int(14),
        );
        assert_result(
            "let a = 1;
             let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; };
             let newAdderInner = newAdderOuter(2);
             let adder = newAdderInner(3);
             adder(8);",
            int(14),
        );
        assert_result(
            "let newClosure = fn(a, b) {
                 let one = fn() { a; };
                 let two = fn() { b; };
                 fn() { one() + two(); };
             };
             let closure = newClosure(9, 90);
             closure();",
            int(99),
        );
    }

    #[test]
    fn test_recursive_functions() {
        assert_result(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             countDown(1);",
            int(0),
        );
        assert_result(
            "let wrapper = fn() {
                 let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);
             };
             wrapper();",
            int(0),
        );
    }

    #[test]
    fn test_recursive_fibonacci() {
        assert_result(
            "let fibonacci = fn(x) {
                 if (x == 0) { return 0; }
                 else {
                     if (x == 1) { return 1; }
                     else { fibonacci(x - 1) + fibonacci(x - 2); }
                 }
             };
             fibonacci(15);",
            int(610),
        );
    }

    // =========================================================================
    // Runtime errors
    // =========================================================================

    #[test]
    fn test_unbounded_recursion_overflows() {
        assert_error("let f = fn() { f() }; f();", "stack overflow");
        assert_error("let f = fn(x) { f(x + 1) }; f(0);", "stack overflow");
    }

    #[test]
    fn test_small_stack_overflows() {
        let result = run_with_config(
            "[1, 2, 3, 4, 5]",
            VmConfig {
                stack_size: 3,
                ..Default::default()
            },
        );
        assert_eq!(result, Err(RuntimeError::StackOverflow { limit: 3 }));
    }

    #[test]
    fn test_type_errors() {
        assert_error("1 + true", "unsupported types for binary operation: INTEGER + BOOLEAN");
        assert_error(r#""a" - "b""#, "STRING - STRING");
        assert_error("true > false", "BOOLEAN > BOOLEAN");
        assert_error("-true", "unsupported type for negation: BOOLEAN");
    }

    #[test]
    fn test_division_by_zero() {
        assert_error("1 / 0", "division by zero");
    }

    #[test]
    fn test_calling_non_function() {
        assert_error("1();", "calling non-function: INTEGER");
        assert_error(r#"let s = "x"; s();"#, "calling non-function: STRING");
    }

    #[test]
    fn test_index_errors() {
        assert_error("1[0]", "index operator not supported: INTEGER[INTEGER]");
        assert_error(r#"[1]["a"]"#, "index operator not supported: ARRAY[STRING]");
        assert_error("{1: 1}[[]]", "unusable as hash key: ARRAY");
        assert_error("{[]: 1}", "unusable as hash key: ARRAY");
        assert_error("{1: 1}[fn(x) { x }]", "unusable as hash key: CLOSURE");
    }

    #[test]
    fn test_step_limit() {
        let result = run_with_config(
            "let f = fn(x) { if (x == 0) { 0 } else { f(x - 1) } }; f(100);",
            VmConfig {
                max_steps: Some(50),
                ..Default::default()
            },
        );
        assert_eq!(result, Err(RuntimeError::StepLimitExceeded(50)));
    }

    #[test]
    fn test_globals_limit() {
        let result = run_with_config(
            "let a = 1; let b = 2;",
            VmConfig {
                globals_size: 1,
                ..Default::default()
            },
        );
        assert_eq!(
            result,
            Err(RuntimeError::GlobalsOverflow { index: 1, limit: 1 })
        );
    }

    #[test]
    fn test_undefined_opcode_is_reported() {
        let result = run_raw(vec![vec![250]], vec![]);
        assert_eq!(
            result,
            Err(RuntimeError::bytecode(0, BytecodeError::UndefinedOpcode(250)))
        );
    }

    #[test]
    fn test_truncated_instruction_is_reported() {
        let result = run_raw(vec![vec![Opcode::Constant as u8, 0]], vec![int(1)]);
        assert!(matches!(
            result,
            Err(RuntimeError::Bytecode {
                ip: 0,
                source: BytecodeError::Truncated { .. }
            })
        ));
    }

    #[test]
    fn test_closure_over_non_function_constant() {
        let result = run_raw(vec![make(Opcode::Closure, &[0, 0])], vec![int(1)]);
        assert_eq!(result, Err(RuntimeError::InvalidConstant(0)));
    }

    // =========================================================================
    // Globals across runs
    // =========================================================================

    #[test]
    fn test_globals_survive_between_vms() {
        let mut compiler = Compiler::new();

        let first = compiler
            .compile_program(&parse("let x = 40;").unwrap())
            .unwrap();
        let mut vm = Vm::new(first, VmConfig::default());
        vm.run().unwrap();
        let globals = vm.into_globals();
        assert_eq!(globals, vec![int(40)]);

        let second = compiler.compile_program(&parse("x + 2").unwrap()).unwrap();
        let mut vm = Vm::with_globals(second, globals, VmConfig::default());
        vm.run().unwrap();
        assert_eq!(vm.last_popped_stack_elem(), int(42));
    }

    #[test]
    fn test_stack_is_balanced_after_statements() {
        let program = parse("1; 2; let a = 3; a + 4;").unwrap();
        let bytecode = Compiler::new().compile_program(&program).unwrap();
        let mut vm = Vm::new(bytecode, VmConfig::default());
        vm.run().unwrap();
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped_stack_elem(), int(7));
    }
}
