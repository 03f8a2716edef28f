use std::rc::Rc;

use crate::lang::object::{Closure, CompiledFunction};

/// Activation record of one closure call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Offset of the next instruction in the closure's own stream.
    pub ip: usize,
    /// Stack index of the first argument; the callee sits just below.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn func(&self) -> &CompiledFunction {
        &self.closure.func
    }

    pub fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}
