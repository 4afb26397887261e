pub mod datum_sink;
pub mod runtime_error;
pub mod sink;
pub mod vm;
pub mod wire;

pub use datum_sink::{DatumSink, read_datum};
pub use runtime_error::DecodeError;
pub use sink::{FieldSink, SinkError};
pub use vm::{Vm, VmConfig, eval};
