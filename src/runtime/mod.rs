pub mod builtins;
pub mod frame;
pub mod runtime_error;
pub mod session;
pub mod vm;

pub use runtime_error::RuntimeError;
pub use session::Session;
pub use vm::{Vm, VmConfig};
