//! The capability interface decoded values are delivered through.
//!
//! A sink stands for one reader-side value: a record, an array, a map, a
//! union or a scalar slot. The VM only ever calls the operation the
//! compiled program asks for; a sink that cannot perform it reports
//! [`SinkError::Unsupported`] and the run stops.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink has no such capability.
    #[error("sink does not support {op}")]
    Unsupported { op: &'static str },

    /// The sink rejected the value it was given.
    #[error("sink rejected value: {0}")]
    InvalidValue(String),
}

impl SinkError {
    pub fn unsupported(op: &'static str) -> Self {
        SinkError::Unsupported { op }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SinkError::InvalidValue(msg.into())
    }
}

pub trait FieldSink {
    fn set_boolean(&mut self, _value: bool) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_boolean"))
    }

    fn set_int(&mut self, _value: i32) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_int"))
    }

    fn set_long(&mut self, _value: i64) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_long"))
    }

    fn set_float(&mut self, _value: f32) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_float"))
    }

    fn set_double(&mut self, _value: f64) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_double"))
    }

    /// Bytes and fixed values.
    fn set_bytes(&mut self, _value: Vec<u8>) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_bytes"))
    }

    fn set_string(&mut self, _value: String) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_string"))
    }

    /// Select a branch of a reader union by its reader-side index.
    fn set_union_branch(&mut self, _branch: usize) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_union_branch"))
    }

    /// Child sink for a record field or a union branch.
    fn get(&mut self, _index: usize) -> Result<&mut dyn FieldSink, SinkError> {
        Err(SinkError::unsupported("get"))
    }

    fn append_array_element(&mut self) -> Result<&mut dyn FieldSink, SinkError> {
        Err(SinkError::unsupported("append_array_element"))
    }

    fn append_map_entry(&mut self, _key: String) -> Result<&mut dyn FieldSink, SinkError> {
        Err(SinkError::unsupported("append_map_entry"))
    }

    /// Fill a record field the writer did not provide.
    fn set_field_to_default(&mut self, _field: usize) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_field_to_default"))
    }

    fn set_field_to_null(&mut self, _field: usize) -> Result<(), SinkError> {
        Err(SinkError::unsupported("set_field_to_null"))
    }

    /// Advisory element count for the block about to be decoded.
    fn hint_size(&mut self, _size: usize) -> Result<(), SinkError> {
        Ok(())
    }

    /// Called once when the VM is done with this sink.
    fn finalize(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
