pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod op;
pub mod program;
pub mod verify;

pub(crate) mod builder;
pub(crate) mod ir;
pub(crate) mod lower;

pub use compile::{Compiler, CompilerConfig, compile};
pub use compile_error::CompileError;
pub use op::{Op, Type};
pub use program::Program;
pub use verify::{ProgramError, verify};
