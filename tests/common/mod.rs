#![allow(dead_code)]

use avrovm::{Datum, FieldSink, Names, Schema, SinkError};
use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// Encoding
// =============================================================================

pub fn put_long(out: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        if n < 0x80 {
            out.push(n as u8);
            return;
        }
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
}

pub fn long(value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    put_long(&mut out, value);
    out
}

pub fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

/// Avro binary encoding of `datum` under `schema`. Arrays and maps are
/// written as a single positive-count block.
pub fn encode(schema: &Schema, datum: &Datum) -> Vec<u8> {
    let names = Names::collect(schema);
    let mut out = Vec::new();
    write(&names, schema, datum, &mut out);
    out
}

fn write<'s>(names: &Names<'s>, schema: &'s Schema, datum: &Datum, out: &mut Vec<u8>) {
    let schema = names.resolve(schema).expect("named type is defined");
    match (schema, datum) {
        (Schema::Null, Datum::Null) => {}
        (Schema::Boolean, Datum::Boolean(b)) => out.push(*b as u8),
        (Schema::Int, Datum::Int(v)) => put_long(out, i64::from(*v)),
        (Schema::Long, Datum::Long(v)) => put_long(out, *v),
        (Schema::Float, Datum::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::Double, Datum::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::Bytes, Datum::Bytes(b)) => put_bytes(out, b),
        (Schema::String, Datum::String(s)) => put_bytes(out, s.as_bytes()),
        (Schema::Fixed(f), Datum::Fixed(b)) => {
            assert_eq!(f.size, b.len());
            out.extend_from_slice(b);
        }
        (Schema::Enum(e), Datum::Enum(symbol)) => {
            let index = e.position(symbol).expect("symbol in writer enum");
            put_long(out, index as i64);
        }
        (Schema::Array(items), Datum::Array(values)) => {
            if !values.is_empty() {
                put_long(out, values.len() as i64);
                for value in values {
                    write(names, items, value, out);
                }
            }
            put_long(out, 0);
        }
        (Schema::Map(values), Datum::Map(entries)) => {
            if !entries.is_empty() {
                put_long(out, entries.len() as i64);
                for (key, value) in entries {
                    put_bytes(out, key.as_bytes());
                    write(names, values, value, out);
                }
            }
            put_long(out, 0);
        }
        (Schema::Union(branches), Datum::Union(index, value)) => {
            put_long(out, *index as i64);
            write(names, &branches[*index], value, out);
        }
        (Schema::Record(record), Datum::Record(_)) => {
            for field in &record.fields {
                let value = datum
                    .field(&field.name)
                    .unwrap_or_else(|| panic!("datum has field {}", field.name));
                write(names, &field.schema, value, out);
            }
        }
        (schema, datum) => panic!("cannot encode {} as {}", datum, schema),
    }
}

// =============================================================================
// Recording sink
// =============================================================================

/// Shared call log. Every sink in one tree appends to the same log, so the
/// entries come out in the order the VM made the calls.
#[derive(Debug, Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Entries without `finalize` and `hint_size` calls.
    pub fn values(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| !e.ends_with(" finalize") && !e.contains(" hint_size("))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.entries().iter().filter(|e| e.contains(call)).count()
    }
}

/// Accepts every operation and logs it as `"<path> <call>"`. Paths start at
/// `$`; `.N` is a field or branch, `[]` an array element, `{key}` a map
/// entry.
pub struct RecordingSink {
    path: String,
    log: Log,
    children: Vec<RecordingSink>,
}

impl RecordingSink {
    pub fn new(log: &Log) -> Self {
        Self::at("$".to_string(), log.clone())
    }

    fn at(path: String, log: Log) -> Self {
        RecordingSink {
            path,
            log,
            children: Vec::new(),
        }
    }

    fn record(&self, call: String) -> Result<(), SinkError> {
        self.log.0.borrow_mut().push(format!("{} {}", self.path, call));
        Ok(())
    }

    fn child(&mut self, path: String) -> &mut dyn FieldSink {
        self.children.push(RecordingSink::at(path, self.log.clone()));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }
}

impl FieldSink for RecordingSink {
    fn set_boolean(&mut self, value: bool) -> Result<(), SinkError> {
        self.record(format!("set_boolean({})", value))
    }

    fn set_int(&mut self, value: i32) -> Result<(), SinkError> {
        self.record(format!("set_int({})", value))
    }

    fn set_long(&mut self, value: i64) -> Result<(), SinkError> {
        self.record(format!("set_long({})", value))
    }

    fn set_float(&mut self, value: f32) -> Result<(), SinkError> {
        self.record(format!("set_float({})", value))
    }

    fn set_double(&mut self, value: f64) -> Result<(), SinkError> {
        self.record(format!("set_double({})", value))
    }

    fn set_bytes(&mut self, value: Vec<u8>) -> Result<(), SinkError> {
        self.record(format!("set_bytes({:?})", value))
    }

    fn set_string(&mut self, value: String) -> Result<(), SinkError> {
        self.record(format!("set_string({:?})", value))
    }

    fn set_union_branch(&mut self, branch: usize) -> Result<(), SinkError> {
        self.record(format!("set_union_branch({})", branch))
    }

    fn get(&mut self, index: usize) -> Result<&mut dyn FieldSink, SinkError> {
        self.record(format!("get({})", index))?;
        let path = format!("{}.{}", self.path, index);
        Ok(self.child(path))
    }

    fn append_array_element(&mut self) -> Result<&mut dyn FieldSink, SinkError> {
        self.record("append_array_element".to_string())?;
        let path = format!("{}[]", self.path);
        Ok(self.child(path))
    }

    fn append_map_entry(&mut self, key: String) -> Result<&mut dyn FieldSink, SinkError> {
        self.record(format!("append_map_entry({:?})", key))?;
        let path = format!("{}{{{}}}", self.path, key);
        Ok(self.child(path))
    }

    fn set_field_to_default(&mut self, field: usize) -> Result<(), SinkError> {
        self.record(format!("set_field_to_default({})", field))
    }

    fn set_field_to_null(&mut self, field: usize) -> Result<(), SinkError> {
        self.record(format!("set_field_to_null({})", field))
    }

    fn hint_size(&mut self, size: usize) -> Result<(), SinkError> {
        self.record(format!("hint_size({})", size))
    }

    fn finalize(&mut self) -> Result<(), SinkError> {
        self.record("finalize".to_string())
    }
}
