use crate::bytecode::Program;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("program cache error: {0}")]
    Cache(#[from] postcard::Error),

    #[error("op {ip} targets address {target}, program has {len} ops")]
    TargetOutOfBounds { ip: usize, target: usize, len: usize },

    #[error("op {ip} halts with unknown error id {error_id}")]
    UnknownError { ip: usize, error_id: usize },

    #[error("method '{name}' starts at {offset}, program has {len} ops")]
    MethodOutOfBounds {
        name: String,
        offset: usize,
        len: usize,
    },
}

/// Check that every address operand lands inside the program and every
/// halt refers to a known message.
///
/// Compiled programs satisfy this by construction; it exists for programs
/// that come back from a cache.
pub fn verify(program: &Program) -> Result<(), ProgramError> {
    let len = program.ops.len();

    for (ip, op) in program.ops.iter().enumerate() {
        if let Some(target) = op.target() {
            if target >= len {
                return Err(ProgramError::TargetOutOfBounds { ip, target, len });
            }
        }
        if let crate::bytecode::Op::Halt(error_id) = op {
            if *error_id >= program.errors.len() {
                return Err(ProgramError::UnknownError {
                    ip,
                    error_id: *error_id,
                });
            }
        }
    }

    for (name, offset) in &program.methods {
        if *offset >= len {
            return Err(ProgramError::MethodOutOfBounds {
                name: name.clone(),
                offset: *offset,
                len,
            });
        }
    }

    Ok(())
}
