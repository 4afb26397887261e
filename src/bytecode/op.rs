use serde::{Deserialize, Serialize};

// =============================================================================
// TYPE - primitive operand of Read / Set
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    /// Fixed-size byte run of the given length.
    Fixed(usize),
    /// A long that is decoded and thrown away (block byte sizes).
    UnusedLong,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Boolean => write!(f, "boolean"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Bytes => write!(f, "bytes"),
            Type::String => write!(f, "string"),
            Type::Fixed(n) => write!(f, "fixed({})", n),
            Type::UnusedLong => write!(f, "unused-long"),
        }
    }
}

// =============================================================================
// OP - VM instructions
// =============================================================================

/// A single VM instruction.
///
/// Every address operand is an absolute index into the program's op list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // ==========================================================================
    // Input and sink
    // ==========================================================================
    /// Decode one value of the given type into the frame registers.
    /// Narrower numeric reads also fill the wider registers.
    Read(Type),

    /// Deliver the frame register of the given type to the current sink.
    Set(Type),

    /// `set_field_to_default(field)` on the current sink.
    SetDefault(usize),

    /// `set_field_to_null(field)` on the current sink.
    SetNull(usize),

    /// `set_union_branch(index)` with the reader-side branch index.
    SetUnionBranch(usize),

    /// `set_int(symbol)` with a reader-side enum symbol index.
    SetEnumSymbol(i32),

    /// Descend into `get(field)` of the current sink.
    Enter(usize),

    /// Finalize the current sink and return to its parent.
    Exit,

    /// Descend into `append_array_element()`.
    AppendArray,

    /// Descend into `append_map_entry(key)`, key taken from the string register.
    AppendMap,

    // ==========================================================================
    // Evaluation register and control flow
    // ==========================================================================
    /// condition = long register == value
    EvalEqual(i64),

    /// condition = long register > value
    EvalGreater(i64),

    /// Jump to the address if the condition is set.
    CondJump(usize),

    Jump(usize),

    AddLong(i64),
    MultLong(i64),

    /// Push the long register onto the loop stack.
    PushLoop,

    /// Pop the loop stack into the long register.
    PopLoop,

    /// Pass the long register to the current sink as an element count hint.
    HintSize,

    /// Push the return address and jump to a method entry.
    Call(usize),

    /// Return from a method; with an empty call stack, stop the run.
    Return,

    /// Abort with the program's error message at this index.
    Halt(usize),
}

impl Op {
    /// Address operand of jumps and calls.
    pub fn target(&self) -> Option<usize> {
        match self {
            Op::Jump(t) | Op::CondJump(t) | Op::Call(t) => Some(*t),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Read(_) => "READ",
            Op::Set(_) => "SET",
            Op::SetDefault(_) => "SET_DEFAULT",
            Op::SetNull(_) => "SET_NULL",
            Op::SetUnionBranch(_) => "SET_BRANCH",
            Op::SetEnumSymbol(_) => "SET_SYMBOL",
            Op::Enter(_) => "ENTER",
            Op::Exit => "EXIT",
            Op::AppendArray => "APPEND_ARRAY",
            Op::AppendMap => "APPEND_MAP",
            Op::EvalEqual(_) => "EVAL_EQ",
            Op::EvalGreater(_) => "EVAL_GT",
            Op::CondJump(_) => "COND_JUMP",
            Op::Jump(_) => "JUMP",
            Op::AddLong(_) => "ADD_LONG",
            Op::MultLong(_) => "MULT_LONG",
            Op::PushLoop => "PUSH_LOOP",
            Op::PopLoop => "POP_LOOP",
            Op::HintSize => "HINT_SIZE",
            Op::Call(_) => "CALL",
            Op::Return => "RETURN",
            Op::Halt(_) => "HALT",
        }
    }
}
