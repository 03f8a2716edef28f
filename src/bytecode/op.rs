use std::fmt;

use thiserror::Error;
use tracing::warn;

// =============================================================================
// OPCODE - one byte per instruction, followed by fixed-width operands
// =============================================================================

/// Instruction tag. The discriminant is the encoded byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Push `constants[operand]`.
    Constant = 0,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    /// Discard the top of the stack (end of an expression statement).
    Pop,

    True,
    False,

    // comparison
    Equal,
    NotEqual,
    /// There is no less-than: the compiler swaps the operands of `<`.
    GreaterThan,

    // prefix
    Minus,
    Bang,

    // ==========================================================================
    // Control flow. Targets are absolute offsets into the frame's own stream.
    // ==========================================================================
    JumpNotTruthy,
    Jump,

    Null,

    GetGlobal,
    SetGlobal,

    /// Build an array from the top `operand` values.
    Array,
    /// Build a hash from the top `operand` values (keys and values interleaved).
    Hash,
    Index,

    /// Operand is the argument count.
    Call,
    ReturnValue,
    Return,

    SetLocal,
    GetLocal,
    GetBuiltin,

    /// Operands: function constant index, number of captured values.
    Closure,
    GetFree,
    CurrentClosure,
}

/// Name and operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    /// Byte width of each operand, in order.
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total encoded size, opcode byte included.
    pub fn instruction_len(&self) -> usize {
        1 + self.operand_widths.iter().sum::<usize>()
    }
}

const fn def(name: &'static str, operand_widths: &'static [usize]) -> Definition {
    Definition {
        name,
        operand_widths,
    }
}

/// Indexed by opcode byte. Order must follow the `Opcode` discriminants.
static DEFINITIONS: [Definition; Opcode::COUNT] = [
    def("OpConstant", &[2]),
    def("OpAdd", &[]),
    def("OpSub", &[]),
    def("OpMul", &[]),
    def("OpDiv", &[]),
    def("OpPop", &[]),
    def("OpTrue", &[]),
    def("OpFalse", &[]),
    def("OpEqual", &[]),
    def("OpNotEqual", &[]),
    def("OpGreaterThan", &[]),
    def("OpMinus", &[]),
    def("OpBang", &[]),
    def("OpJumpNotTruthy", &[2]),
    def("OpJump", &[2]),
    def("OpNull", &[]),
    def("OpGetGlobal", &[2]),
    def("OpSetGlobal", &[2]),
    def("OpArray", &[2]),
    def("OpHash", &[2]),
    def("OpIndex", &[]),
    def("OpCall", &[1]),
    def("OpReturnValue", &[]),
    def("OpReturn", &[]),
    def("OpSetLocal", &[1]),
    def("OpGetLocal", &[1]),
    def("OpGetBuiltin", &[1]),
    def("OpClosure", &[2, 1]),
    def("OpGetFree", &[1]),
    def("OpCurrentClosure", &[]),
];

static OPCODES: [Opcode; Opcode::COUNT] = [
    Opcode::Constant,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Pop,
    Opcode::True,
    Opcode::False,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::GreaterThan,
    Opcode::Minus,
    Opcode::Bang,
    Opcode::JumpNotTruthy,
    Opcode::Jump,
    Opcode::Null,
    Opcode::GetGlobal,
    Opcode::SetGlobal,
    Opcode::Array,
    Opcode::Hash,
    Opcode::Index,
    Opcode::Call,
    Opcode::ReturnValue,
    Opcode::Return,
    Opcode::SetLocal,
    Opcode::GetLocal,
    Opcode::GetBuiltin,
    Opcode::Closure,
    Opcode::GetFree,
    Opcode::CurrentClosure,
];

impl Opcode {
    pub const COUNT: usize = Opcode::CurrentClosure as usize + 1;

    /// Every opcode, in byte order.
    pub fn all() -> &'static [Opcode] {
        &OPCODES
    }

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    pub fn definition(self) -> &'static Definition {
        &DEFINITIONS[self as usize]
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().name)
    }
}

// =============================================================================
// Encoding / decoding
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("opcode {0} undefined")]
    UndefinedOpcode(u8),

    #[error("{name} needs {needed} operand bytes, only {available} left")]
    Truncated {
        name: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Look up the definition of a raw opcode byte.
pub fn lookup(byte: u8) -> Result<&'static Definition, BytecodeError> {
    Opcode::from_byte(byte)
        .map(Opcode::definition)
        .ok_or(BytecodeError::UndefinedOpcode(byte))
}

/// Encode one instruction.
///
/// Yields no bytes when the operand count does not match the opcode's arity.
/// Operands wider than their slot are truncated to the slot width; the
/// compiler range-checks before calling this.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();
    if operands.len() != def.operand_widths.len() {
        warn!(
            "{} expects {} operands, got {}",
            def.name,
            def.operand_widths.len(),
            operands.len()
        );
        return Vec::new();
    }

    let mut instruction = Vec::with_capacity(def.instruction_len());
    instruction.push(op as u8);

    for (&operand, &width) in operands.iter().zip(def.operand_widths) {
        match width {
            2 => instruction.extend_from_slice(&(operand as u16).to_be_bytes()),
            1 => instruction.push(operand as u8),
            _ => {}
        }
    }

    instruction
}

/// Decode the operands of `def` from `ins`, which starts right after the
/// opcode byte. Returns the operands and the number of bytes read.
pub fn read_operands(
    def: &Definition,
    ins: &[u8],
) -> Result<(Vec<usize>, usize), BytecodeError> {
    let needed = def.instruction_len() - 1;
    if ins.len() < needed {
        return Err(BytecodeError::Truncated {
            name: def.name,
            needed,
            available: ins.len(),
        });
    }

    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for &width in def.operand_widths {
        match width {
            2 => operands.push(read_u16(ins, offset) as usize),
            1 => operands.push(read_u8(ins, offset) as usize),
            _ => {}
        }
        offset += width;
    }

    Ok((operands, offset))
}

/// Big-endian u16 at `at`. The caller guarantees two bytes are available.
pub fn read_u16(ins: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([ins[at], ins[at + 1]])
}

pub fn read_u8(ins: &[u8], at: usize) -> u8 {
    ins[at]
}
