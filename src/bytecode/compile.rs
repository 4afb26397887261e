use tracing::debug;

use crate::{
    bytecode::{
        Program, builder, compile_error::CompileError, disasm::disassemble, ir::IrProgram, lower,
    },
    lang::schema::Schema,
};

#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Emit every IR instruction as a `debug` event before lowering.
    pub log_ir: bool,
    /// Emit the disassembled program as a `debug` event after lowering.
    pub log_program: bool,
}

/// Compiles a writer/reader schema pair into a decode [`Program`].
///
/// A compiler holds no state between calls; one instance can compile any
/// number of schema pairs.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Resolve `writer` against `reader` and lower the result. Either the
    /// whole program is produced or an error is returned.
    pub fn compile(&self, writer: &Schema, reader: &Schema) -> Result<Program, CompileError> {
        let ir = builder::build(writer, reader)?;
        if self.config.log_ir {
            log_ir(&ir);
        }

        let program = lower::lower(ir)?;
        if self.config.log_program {
            debug!(
                ops = program.len(),
                methods = program.methods.len(),
                "compiled program\n{}",
                disassemble(&program)
            );
        }

        Ok(program)
    }
}

fn log_ir(ir: &IrProgram) {
    for (index, inst) in ir.main.iter().enumerate() {
        debug!(body = "main", index, "{}", inst);
    }
    for method in ir.methods.values() {
        for (index, inst) in method.body.iter().enumerate() {
            debug!(body = %method.name, index, "{}", inst);
        }
    }
    debug!(
        blocks = ir.blocks.len(),
        switches = ir.switches.len(),
        methods = ir.methods.len(),
        "ir built"
    );
}

/// Compile with the default configuration.
pub fn compile(writer: &Schema, reader: &Schema) -> Result<Program, CompileError> {
    Compiler::new().compile(writer, reader)
}
