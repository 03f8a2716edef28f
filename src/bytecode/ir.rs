use std::fmt;
use std::ops::Deref;

use crate::bytecode::disasm::disassemble;
use crate::lang::object::Object;

/// A flat, encoded instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    /// Concatenate several encoded instructions (handy for expected streams).
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self(parts.into_iter().flatten().collect())
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Overwrite bytes in place starting at `pos`.
    pub fn replace(&mut self, pos: usize, bytes: &[u8]) {
        self.0[pos..pos + bytes.len()].copy_from_slice(bytes);
    }
}

impl Deref for Instructions {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&disassemble(&self.0))
    }
}

/// Output of one compilation: the top-level stream and the constant pool.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}
