use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Generic decoded Avro value.
///
/// `Datum` is what the generic sink produces and what record field defaults
/// are expressed in. Its shape always follows the *reader* schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),

    /// Enum value, by symbol.
    Enum(String),

    Array(Vec<Datum>),

    /// Map entries in the order they were decoded.
    Map(IndexMap<String, Datum>),

    /// Selected reader-side branch index and the branch value.
    Union(usize, Box<Datum>),

    /// Record fields in reader schema order.
    Record(Vec<(String, Datum)>),
}

impl Datum {
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Datum)>,
        S: Into<String>,
    {
        Datum::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn union(branch: usize, value: Datum) -> Self {
        Datum::Union(branch, Box::new(value))
    }

    pub fn string(s: &str) -> Self {
        Datum::String(s.to_string())
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&Datum> {
        match self {
            Datum::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Boolean(_) => "boolean",
            Datum::Int(_) => "int",
            Datum::Long(_) => "long",
            Datum::Float(_) => "float",
            Datum::Double(_) => "double",
            Datum::Bytes(_) => "bytes",
            Datum::String(_) => "string",
            Datum::Fixed(_) => "fixed",
            Datum::Enum(_) => "enum",
            Datum::Array(_) => "array",
            Datum::Map(_) => "map",
            Datum::Union(..) => "union",
            Datum::Record(_) => "record",
        }
    }
}

impl std::fmt::Display for Datum {
    /// JSON-like rendering, mostly for diagnostics.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int(n) => write!(f, "{}", n),
            Datum::Long(n) => write!(f, "{}", n),
            Datum::Float(n) => write!(f, "{}", n),
            Datum::Double(n) => write!(f, "{}", n),
            Datum::Bytes(b) | Datum::Fixed(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Datum::String(s) | Datum::Enum(s) => write!(f, "{:?}", s),
            Datum::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Datum::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Datum::Union(_, value) => write!(f, "{}", value),
            Datum::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Nested values are released from a worklist, so dropping a deeply nested
/// datum does not recurse once per level.
impl Drop for Datum {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_children(self, &mut pending);
        while let Some(mut datum) = pending.pop() {
            take_children(&mut datum, &mut pending);
        }
    }
}

fn take_children(datum: &mut Datum, out: &mut Vec<Datum>) {
    match datum {
        Datum::Array(items) => out.append(items),
        Datum::Map(entries) => out.extend(std::mem::take(entries).into_values()),
        Datum::Union(_, value) => out.push(std::mem::replace(&mut **value, Datum::Null)),
        Datum::Record(fields) => out.extend(std::mem::take(fields).into_iter().map(|(_, v)| v)),
        _ => {}
    }
}
