//! Intermediate representation between schema resolution and bytecode.
//!
//! IR instructions refer to blocks, switches and methods symbolically. Their
//! VM length is known up front, which lets [`lower`](crate::bytecode::lower)
//! place every construct before any op is generated.

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::{Op, Type};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// One array or map construct.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    /// Address of the first op of the BlockStart.
    pub(crate) start: usize,
    /// Address immediately after the BlockEnd.
    pub(crate) end: usize,
    /// Decoded elements land in a reader container, which gets a HintSize.
    pub(crate) has_size_hint: bool,
}

impl Block {
    /// Address of the block's `PushLoop`, where iteration resumes.
    pub(crate) fn loop_entry(&self) -> usize {
        self.start + block_jump_offset(self.has_size_hint)
    }
}

fn block_jump_offset(has_size_hint: bool) -> usize {
    if has_size_hint { 8 } else { 7 }
}

/// One union (or enum symbol) dispatch.
#[derive(Debug, Clone)]
pub(crate) struct Switch {
    pub(crate) id: usize,
    /// Writer-side index -> address of the case body.
    pub(crate) cases: BTreeMap<i64, usize>,
    /// Address right after the last case body.
    pub(crate) end: usize,
    pub(crate) error_id: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Method {
    pub(crate) name: String,
    pub(crate) offset: usize,
    pub(crate) body: Vec<IrInstruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IrInstruction {
    Literal(Op),
    MethodCall(String),
    BlockStart {
        block: usize,
        has_size_hint: bool,
    },
    BlockEnd {
        block: usize,
    },
    SwitchStart {
        switch: usize,
        cases: usize,
    },
    /// Placed in front of each case body. Its jump ends the *previous* body;
    /// the case body itself starts right after it.
    SwitchCase {
        switch: usize,
        writer_index: i64,
        /// -1 when there is no reader-side union branch to select.
        reader_index: i64,
    },
    SwitchEnd {
        switch: usize,
    },
}

impl IrInstruction {
    pub(crate) fn vm_length(&self) -> usize {
        match self {
            IrInstruction::Literal(_) => 1,
            IrInstruction::MethodCall(_) => 1,
            IrInstruction::BlockStart { has_size_hint, .. } => {
                block_jump_offset(*has_size_hint) + 1
            }
            IrInstruction::BlockEnd { .. } => 5,
            IrInstruction::SwitchStart { cases, .. } => 2 * cases + 1,
            IrInstruction::SwitchCase { .. } => 1,
            IrInstruction::SwitchEnd { .. } => 0,
        }
    }

    pub(crate) fn lower(&self, program: &IrProgram) -> Result<Vec<Op>, CompileError> {
        match self {
            IrInstruction::Literal(op) => Ok(vec![*op]),

            IrInstruction::MethodCall(name) => {
                let method = program
                    .methods
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownMethod(name.clone()))?;
                Ok(vec![Op::Call(method.offset)])
            }

            // Read the block length into the long register.
            // 0: the container is exhausted, jump past the BlockEnd.
            // >0: jump straight to PushLoop.
            // <0: read and drop the byte size, negate, optionally hint, push.
            IrInstruction::BlockStart {
                block,
                has_size_hint,
            } => {
                let block = program.block(*block)?;
                let mut ops = vec![
                    Op::Read(Type::Long),
                    Op::EvalEqual(0),
                    Op::CondJump(block.end),
                    Op::EvalGreater(0),
                    Op::CondJump(block.start + block_jump_offset(*has_size_hint)),
                    Op::Read(Type::UnusedLong),
                    Op::MultLong(-1),
                ];
                if *has_size_hint {
                    ops.push(Op::HintSize);
                }
                ops.push(Op::PushLoop);
                Ok(ops)
            }

            // Pop and decrement the loop count. At zero, go back to the top
            // to read the next block length; otherwise re-enter at PushLoop
            // for the next element.
            IrInstruction::BlockEnd { block } => {
                let block = program.block(*block)?;
                Ok(vec![
                    Op::PopLoop,
                    Op::AddLong(-1),
                    Op::EvalEqual(0),
                    Op::CondJump(block.start),
                    Op::Jump(block.loop_entry()),
                ])
            }

            IrInstruction::SwitchStart { switch, cases } => {
                let sw = program.switch(*switch)?;
                if sw.cases.len() != *cases {
                    return Err(CompileError::internal(format!(
                        "switch {} declares {} cases but {} were placed",
                        sw.id,
                        cases,
                        sw.cases.len()
                    )));
                }
                let mut ops = Vec::with_capacity(self.vm_length());
                for (value, body) in &sw.cases {
                    ops.push(Op::EvalEqual(*value));
                    ops.push(Op::CondJump(*body));
                }
                ops.push(Op::Halt(sw.error_id));
                Ok(ops)
            }

            IrInstruction::SwitchCase { switch, .. } => {
                let sw = program.switch(*switch)?;
                Ok(vec![Op::Jump(sw.end)])
            }

            IrInstruction::SwitchEnd { .. } => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrInstruction::Literal(op) => write!(f, "{:?}", op),
            IrInstruction::MethodCall(name) => write!(f, "call {}", name),
            IrInstruction::BlockStart {
                block,
                has_size_hint,
            } => write!(f, "block_start #{} hint={}", block, has_size_hint),
            IrInstruction::BlockEnd { block } => write!(f, "block_end #{}", block),
            IrInstruction::SwitchStart { switch, cases } => {
                write!(f, "switch_start #{} cases={}", switch, cases)
            }
            IrInstruction::SwitchCase {
                switch,
                writer_index,
                reader_index,
            } => write!(
                f,
                "switch_case #{} writer={} reader={}",
                switch, writer_index, reader_index
            ),
            IrInstruction::SwitchEnd { switch } => write!(f, "switch_end #{}", switch),
        }
    }
}

/// IR for a whole schema pair: main body, method bodies and the construct
/// tables the instructions point into.
#[derive(Debug, Clone, Default)]
pub(crate) struct IrProgram {
    pub(crate) main: Vec<IrInstruction>,
    pub(crate) methods: IndexMap<String, Method>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) switches: Vec<Switch>,
    pub(crate) errors: Vec<String>,
}

impl IrProgram {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_block(&mut self, has_size_hint: bool) -> usize {
        let id = self.blocks.len();
        self.blocks.push(Block {
            start: 0,
            end: 0,
            has_size_hint,
        });
        id
    }

    pub(crate) fn add_switch(&mut self, error: String) -> usize {
        let error_id = self.errors.len();
        self.errors.push(error);
        let id = self.switches.len();
        self.switches.push(Switch {
            id,
            cases: BTreeMap::new(),
            end: 0,
            error_id,
        });
        id
    }

    pub(crate) fn block(&self, id: usize) -> Result<&Block, CompileError> {
        self.blocks
            .get(id)
            .ok_or_else(|| CompileError::internal(format!("reference to unknown block {}", id)))
    }

    pub(crate) fn switch(&self, id: usize) -> Result<&Switch, CompileError> {
        self.switches
            .get(id)
            .ok_or_else(|| CompileError::internal(format!("reference to unknown switch {}", id)))
    }

    /// Main body followed by each method body, in layout order.
    pub(crate) fn instructions(&self) -> impl Iterator<Item = &IrInstruction> {
        self.main
            .iter()
            .chain(self.methods.values().flat_map(|m| m.body.iter()))
    }
}
