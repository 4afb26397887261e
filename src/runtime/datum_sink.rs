//! A [`FieldSink`] that assembles a [`Datum`] shaped by the reader schema.

use crate::bytecode::Program;
use crate::lang::{Datum, Names, RecordField, Schema};
use crate::runtime::runtime_error::DecodeError;
use crate::runtime::sink::{FieldSink, SinkError};
use crate::runtime::vm::{Vm, with_stack};
use indexmap::IndexMap;
use std::io::Read;

/// Upper bound on what a block size hint may reserve up front.
const MAX_RESERVE: usize = 4096;

pub struct DatumSink<'a> {
    names: &'a Names<'a>,
    /// Resolved reader schema of this value.
    schema: &'a Schema,
    slot: Slot<'a>,
}

enum Slot<'a> {
    Empty,
    Value(Datum),
    /// Fields are created on first use; recursive types would not
    /// terminate otherwise.
    Record(Vec<Option<DatumSink<'a>>>),
    Array(Vec<DatumSink<'a>>),
    Map(IndexMap<String, DatumSink<'a>>),
    Union(usize, Box<DatumSink<'a>>),
}

impl<'a> DatumSink<'a> {
    pub fn new(names: &'a Names<'a>, schema: &'a Schema) -> Result<Self, SinkError> {
        let schema = names
            .resolve(schema)
            .ok_or_else(|| SinkError::invalid(format!("unknown named type {}", schema)))?;
        let slot = match schema {
            Schema::Record(record) => Slot::Record(record.fields.iter().map(|_| None).collect()),
            Schema::Array(_) => Slot::Array(Vec::new()),
            Schema::Map(_) => Slot::Map(IndexMap::new()),
            _ => Slot::Empty,
        };
        Ok(DatumSink {
            names,
            schema,
            slot,
        })
    }

    fn with_value(names: &'a Names<'a>, schema: &'a Schema, value: Datum) -> Result<Self, SinkError> {
        let mut sink = DatumSink::new(names, schema)?;
        sink.slot = Slot::Value(value);
        Ok(sink)
    }

    /// Consume the sink and return what was decoded into it.
    pub fn into_datum(self) -> Result<Datum, SinkError> {
        with_stack(|| self.build())
    }

    fn build(mut self) -> Result<Datum, SinkError> {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Value(datum) => Ok(datum),
            Slot::Empty => match self.schema {
                Schema::Null => Ok(Datum::Null),
                other => Err(SinkError::invalid(format!("no value decoded for {}", other))),
            },
            Slot::Record(fields) => {
                let Schema::Record(record) = self.schema else {
                    return Err(SinkError::invalid("record slot without record schema"));
                };
                let mut out = Vec::with_capacity(fields.len());
                for (field, sink) in record.fields.iter().zip(fields) {
                    let sink = sink.ok_or_else(|| {
                        SinkError::invalid(format!(
                            "field '{}' of {} was never set",
                            field.name, record.name
                        ))
                    })?;
                    out.push((field.name.clone(), sink.into_datum()?));
                }
                Ok(Datum::Record(out))
            }
            Slot::Array(items) => Ok(Datum::Array(
                items
                    .into_iter()
                    .map(DatumSink::into_datum)
                    .collect::<Result<_, _>>()?,
            )),
            Slot::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, sink) in entries {
                    out.insert(key, sink.into_datum()?);
                }
                Ok(Datum::Map(out))
            }
            Slot::Union(branch, sink) => Ok(Datum::union(branch, sink.into_datum()?)),
        }
    }

    fn take_children(&mut self, out: &mut Vec<DatumSink<'a>>) {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Record(fields) => out.extend(fields.into_iter().flatten()),
            Slot::Array(items) => out.extend(items),
            Slot::Map(entries) => out.extend(entries.into_values()),
            Slot::Union(_, child) => out.push(*child),
            Slot::Empty | Slot::Value(_) => {}
        }
    }

    fn store(&mut self, datum: Datum) -> Result<(), SinkError> {
        self.slot = Slot::Value(datum);
        Ok(())
    }

    fn mismatch(&self, op: &str) -> SinkError {
        SinkError::invalid(format!("{} on a {} value", op, self.schema))
    }

    fn record_field(&self, index: usize) -> Result<&'a RecordField, SinkError> {
        match self.schema {
            Schema::Record(record) => record
                .fields
                .get(index)
                .ok_or_else(|| SinkError::invalid(format!("{} has no field {}", record.name, index))),
            _ => Err(self.mismatch("field access")),
        }
    }

    fn put_field(&mut self, index: usize, sink: DatumSink<'a>) -> Result<(), SinkError> {
        match &mut self.slot {
            Slot::Record(fields) => match fields.get_mut(index) {
                Some(slot) => {
                    *slot = Some(sink);
                    Ok(())
                }
                None => Err(SinkError::invalid(format!("no field {}", index))),
            },
            _ => Err(SinkError::invalid("field access on a non-record value")),
        }
    }
}

/// Child sinks are released from a worklist instead of recursive drop glue.
impl Drop for DatumSink<'_> {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut sink) = pending.pop() {
            sink.take_children(&mut pending);
        }
    }
}

impl FieldSink for DatumSink<'_> {
    fn set_boolean(&mut self, value: bool) -> Result<(), SinkError> {
        match self.schema {
            Schema::Boolean => self.store(Datum::Boolean(value)),
            _ => Err(self.mismatch("set_boolean")),
        }
    }

    fn set_int(&mut self, value: i32) -> Result<(), SinkError> {
        let schema = self.schema;
        match schema {
            Schema::Int => self.store(Datum::Int(value)),
            Schema::Enum(e) => {
                let symbol = usize::try_from(value)
                    .ok()
                    .and_then(|i| e.symbols.get(i))
                    .ok_or_else(|| SinkError::invalid(format!("{} has no symbol {}", e.name, value)))?;
                self.store(Datum::Enum(symbol.clone()))
            }
            _ => Err(self.mismatch("set_int")),
        }
    }

    fn set_long(&mut self, value: i64) -> Result<(), SinkError> {
        match self.schema {
            Schema::Long => self.store(Datum::Long(value)),
            _ => Err(self.mismatch("set_long")),
        }
    }

    fn set_float(&mut self, value: f32) -> Result<(), SinkError> {
        match self.schema {
            Schema::Float => self.store(Datum::Float(value)),
            _ => Err(self.mismatch("set_float")),
        }
    }

    fn set_double(&mut self, value: f64) -> Result<(), SinkError> {
        match self.schema {
            Schema::Double => self.store(Datum::Double(value)),
            _ => Err(self.mismatch("set_double")),
        }
    }

    fn set_bytes(&mut self, value: Vec<u8>) -> Result<(), SinkError> {
        match self.schema {
            Schema::Bytes => self.store(Datum::Bytes(value)),
            Schema::Fixed(f) if f.size == value.len() => self.store(Datum::Fixed(value)),
            _ => Err(self.mismatch("set_bytes")),
        }
    }

    fn set_string(&mut self, value: String) -> Result<(), SinkError> {
        match self.schema {
            Schema::String => self.store(Datum::String(value)),
            _ => Err(self.mismatch("set_string")),
        }
    }

    fn set_union_branch(&mut self, branch: usize) -> Result<(), SinkError> {
        let Schema::Union(branches) = self.schema else {
            return Err(self.mismatch("set_union_branch"));
        };
        let schema = branches
            .get(branch)
            .ok_or_else(|| SinkError::invalid(format!("union has no branch {}", branch)))?;
        self.slot = Slot::Union(branch, Box::new(DatumSink::new(self.names, schema)?));
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<&mut dyn FieldSink, SinkError> {
        let names = self.names;
        let schema = self.schema;
        match (&mut self.slot, schema) {
            (Slot::Record(fields), Schema::Record(record)) => {
                let field = record
                    .fields
                    .get(index)
                    .ok_or_else(|| SinkError::invalid(format!("{} has no field {}", record.name, index)))?;
                let entry = fields
                    .get_mut(index)
                    .ok_or_else(|| SinkError::invalid(format!("no field {}", index)))?;
                if entry.is_none() {
                    *entry = Some(DatumSink::new(names, &field.schema)?);
                }
                match entry {
                    Some(child) => Ok(child),
                    None => Err(SinkError::invalid("field sink missing")),
                }
            }
            (Slot::Union(branch, child), _) if *branch == index => Ok(&mut **child),
            (Slot::Union(branch, _), _) => Err(SinkError::invalid(format!(
                "branch {} requested, branch {} selected",
                index, branch
            ))),
            _ => Err(SinkError::invalid(format!("get on a {} value", schema))),
        }
    }

    fn append_array_element(&mut self) -> Result<&mut dyn FieldSink, SinkError> {
        let names = self.names;
        let schema = self.schema;
        let (Slot::Array(items), Schema::Array(item)) = (&mut self.slot, schema) else {
            return Err(SinkError::invalid(format!(
                "append_array_element on a {} value",
                schema
            )));
        };
        items.push(DatumSink::new(names, item)?);
        match items.last_mut() {
            Some(child) => Ok(child),
            None => Err(SinkError::invalid("array element missing")),
        }
    }

    fn append_map_entry(&mut self, key: String) -> Result<&mut dyn FieldSink, SinkError> {
        let names = self.names;
        let schema = self.schema;
        let (Slot::Map(entries), Schema::Map(value)) = (&mut self.slot, schema) else {
            return Err(SinkError::invalid(format!(
                "append_map_entry on a {} value",
                schema
            )));
        };
        let child = DatumSink::new(names, value)?;
        let (index, _) = entries.insert_full(key, child);
        match entries.get_index_mut(index) {
            Some((_, child)) => Ok(child),
            None => Err(SinkError::invalid("map entry missing")),
        }
    }

    fn set_field_to_default(&mut self, field: usize) -> Result<(), SinkError> {
        let def = self.record_field(field)?;
        let schema = &def.schema;
        let default = def
            .default
            .clone()
            .ok_or_else(|| SinkError::invalid(format!("field '{}' has no default", def.name)))?;

        // A union default is always for the first branch.
        let value = match (self.names.resolve(schema), default) {
            (Some(Schema::Union(_)), d @ Datum::Union(..)) => d,
            (Some(Schema::Union(_)), d) => Datum::union(0, d),
            (_, d) => d,
        };
        let sink = DatumSink::with_value(self.names, schema, value)?;
        self.put_field(field, sink)
    }

    fn set_field_to_null(&mut self, field: usize) -> Result<(), SinkError> {
        let schema = &self.record_field(field)?.schema;
        let value = match self.names.resolve(schema) {
            Some(Schema::Null) => Datum::Null,
            Some(Schema::Union(branches)) => {
                let branch = branches
                    .iter()
                    .position(|b| matches!(b, Schema::Null))
                    .ok_or_else(|| SinkError::invalid(format!("field {} has no null branch", field)))?;
                Datum::union(branch, Datum::Null)
            }
            _ => return Err(SinkError::invalid(format!("field {} is not nullable", field))),
        };
        let sink = DatumSink::with_value(self.names, schema, value)?;
        self.put_field(field, sink)
    }

    fn hint_size(&mut self, size: usize) -> Result<(), SinkError> {
        match &mut self.slot {
            Slot::Array(items) => items.reserve(size.min(MAX_RESERVE)),
            Slot::Map(entries) => entries.reserve(size.min(MAX_RESERVE)),
            _ => {}
        }
        Ok(())
    }
}

impl Vm {
    /// Decode one value into a [`Datum`] shaped by `reader_schema`, which
    /// must be the reader schema `program` was compiled against.
    pub fn read_datum<R: Read>(
        &self,
        reader_schema: &Schema,
        program: &Program,
        input: R,
    ) -> Result<Datum, DecodeError> {
        let names = Names::collect(reader_schema);
        let mut sink = DatumSink::new(&names, reader_schema)
            .map_err(|source| DecodeError::Sink { ip: 0, source })?;
        self.eval(input, program, &mut sink)?;
        sink.into_datum().map_err(|source| DecodeError::Sink {
            ip: program.len(),
            source,
        })
    }
}

/// [`Vm::read_datum`] with the default configuration.
pub fn read_datum<R: Read>(
    reader_schema: &Schema,
    program: &Program,
    input: R,
) -> Result<Datum, DecodeError> {
    Vm::new().read_datum(reader_schema, program, input)
}
