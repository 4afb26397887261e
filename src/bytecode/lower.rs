//! Two-pass lowering of IR into a flat [`Program`].
//!
//! The first pass walks main and then every method body in layout order,
//! recording where each method, block and switch case lands. The second
//! pass asks every instruction for its ops, which can now reference any
//! address, forward or backward.

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{Block, IrInstruction, IrProgram, Switch};
use crate::bytecode::{Program, verify};

/// Offset pass. Returns the total program length.
pub(crate) fn assign_offsets(ir: &mut IrProgram) -> Result<usize, CompileError> {
    let mut counter = 0;
    place(&ir.main, &mut counter, &mut ir.blocks, &mut ir.switches)?;
    for method in ir.methods.values_mut() {
        method.offset = counter;
        place(&method.body, &mut counter, &mut ir.blocks, &mut ir.switches)?;
    }
    Ok(counter)
}

fn place(
    body: &[IrInstruction],
    counter: &mut usize,
    blocks: &mut [Block],
    switches: &mut [Switch],
) -> Result<(), CompileError> {
    for inst in body {
        let len = inst.vm_length();
        match inst {
            IrInstruction::BlockStart { block, .. } => {
                block_mut(blocks, *block)?.start = *counter;
            }
            IrInstruction::BlockEnd { block } => {
                block_mut(blocks, *block)?.end = *counter + len;
            }
            IrInstruction::SwitchCase {
                switch,
                writer_index,
                ..
            } => {
                let sw = switch_mut(switches, *switch)?;
                if sw.cases.insert(*writer_index, *counter + len).is_some() {
                    return Err(CompileError::internal(format!(
                        "switch {} has two cases for writer index {}",
                        switch, writer_index
                    )));
                }
            }
            IrInstruction::SwitchEnd { switch } => {
                switch_mut(switches, *switch)?.end = *counter;
            }
            IrInstruction::Literal(_)
            | IrInstruction::MethodCall(_)
            | IrInstruction::SwitchStart { .. } => {}
        }
        *counter += len;
    }
    Ok(())
}

fn block_mut(blocks: &mut [Block], id: usize) -> Result<&mut Block, CompileError> {
    blocks
        .get_mut(id)
        .ok_or_else(|| CompileError::internal(format!("reference to unknown block {}", id)))
}

fn switch_mut(switches: &mut [Switch], id: usize) -> Result<&mut Switch, CompileError> {
    switches
        .get_mut(id)
        .ok_or_else(|| CompileError::internal(format!("reference to unknown switch {}", id)))
}

/// Lowering pass. Every instruction must produce exactly `vm_length()` ops,
/// otherwise the addresses from the offset pass would be wrong.
pub(crate) fn lower(mut ir: IrProgram) -> Result<Program, CompileError> {
    let expected = assign_offsets(&mut ir)?;

    let mut ops = Vec::with_capacity(expected);
    for inst in ir.instructions() {
        let lowered = inst.lower(&ir)?;
        if lowered.len() != inst.vm_length() {
            return Err(CompileError::internal(format!(
                "`{}` lowered to {} ops, expected {}",
                inst,
                lowered.len(),
                inst.vm_length()
            )));
        }
        ops.extend(lowered);
    }
    if ops.len() != expected {
        return Err(CompileError::internal(format!(
            "program has {} ops, offset pass counted {}",
            ops.len(),
            expected
        )));
    }

    let methods = ir
        .methods
        .iter()
        .map(|(name, method)| (name.clone(), method.offset))
        .collect();

    let program = Program {
        ops,
        methods,
        errors: ir.errors,
    };
    verify(&program).map_err(|e| CompileError::internal(e.to_string()))?;
    Ok(program)
}
