//! Schema-evolution decoding for Avro binary data.
//!
//! A writer schema and a reader schema are compiled once into a flat
//! [`Program`]. The [`Vm`] then runs that program over encoded input and
//! delivers the values, already resolved to the reader's shape, to a
//! [`FieldSink`].
//!
//! ```no_run
//! use avrovm::{Datum, Schema, compile, read_datum};
//!
//! let program = compile(&Schema::Int, &Schema::Long)?;
//! let value = read_datum(&Schema::Long, &program, &[0x54u8][..])?;
//! assert_eq!(value, Datum::Long(42));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{CompileError, Compiler, CompilerConfig, Program, ProgramError, compile};
pub use lang::{Datum, EnumSchema, FixedSchema, Name, Names, RecordField, RecordSchema, Schema};
pub use runtime::{
    DatumSink, DecodeError, FieldSink, SinkError, Vm, VmConfig, eval, read_datum,
};
