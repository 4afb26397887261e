use crate::bytecode::Op;
use crate::bytecode::verify::{ProgramError, verify};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A compiled decode program.
///
/// Convention: execution starts at op 0, the main body ends with `Return`,
/// and method bodies follow it. A program holds no run state and can be
/// shared by any number of concurrent VM runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub(crate) ops: Vec<Op>,

    /// Method name -> entry offset, in registration order.
    pub(crate) methods: IndexMap<String, usize>,

    /// Messages addressed by `Halt` operands.
    pub(crate) errors: Vec<String>,
}

impl Program {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn method_offset(&self, name: &str) -> Option<usize> {
        self.methods.get(name).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, usize)> {
        self.methods.iter().map(|(name, offset)| (name.as_str(), *offset))
    }

    pub fn error_message(&self, error_id: usize) -> Option<&str> {
        self.errors.get(error_id).map(String::as_str)
    }

    /// Encode for a precompilation cache.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProgramError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a cached program. Address integrity is re-checked, so a
    /// corrupted cache is rejected here rather than misbehaving at run time.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        let program: Program = postcard::from_bytes(bytes)?;
        verify(&program)?;
        Ok(program)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::bytecode::disasm::disassemble(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Type;

    fn small_program() -> Program {
        let mut methods = IndexMap::new();
        methods.insert("read:Foo".to_string(), 2);
        Program {
            ops: vec![
                Op::Call(2),
                Op::Return,
                Op::Read(Type::Int),
                Op::Set(Type::Long),
                Op::Return,
            ],
            methods,
            errors: vec!["no such branch".to_string()],
        }
    }

    #[test]
    fn test_accessors() {
        let program = small_program();
        assert_eq!(program.len(), 5);
        assert_eq!(program.method_offset("read:Foo"), Some(2));
        assert_eq!(program.method_offset("read:Bar"), None);
        assert_eq!(program.error_message(0), Some("no such branch"));
        assert_eq!(program.error_message(1), None);
    }

    #[test]
    fn test_cache_bytes_roundtrip() {
        let program = small_program();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_cache_rejects_bad_target() {
        let mut program = small_program();
        program.ops[0] = Op::Call(99);
        let bytes = program.to_bytes().unwrap();
        assert!(matches!(
            Program::from_bytes(&bytes),
            Err(ProgramError::TargetOutOfBounds { ip: 0, target: 99, .. })
        ));
    }

    #[test]
    fn test_cache_rejects_garbage() {
        assert!(matches!(
            Program::from_bytes(&[0xff, 0xff, 0xff]),
            Err(ProgramError::Cache(_))
        ));
    }
}
