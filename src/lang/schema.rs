use super::datum::Datum;
use std::collections::HashMap;
use std::fmt;

/// A fully qualified Avro type name.
///
/// The schema parser hands us names that already carry their effective
/// namespace, so nothing here performs namespace inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub name: String,
    pub namespace: Option<String>,
}

impl Name {
    /// Split a dotted full name: `"a.b.Foo"` becomes namespace `a.b`, name `Foo`.
    pub fn new(full: &str) -> Self {
        match full.rsplit_once('.') {
            Some((namespace, name)) => Name {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
            },
            None => Name {
                name: full.to_string(),
                namespace: None,
            },
        }
    }

    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}.{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    /// Named-type matching used during resolution: full names first, then
    /// the unqualified name, then any of the reader's aliases.
    pub fn matches(&self, reader: &Name, reader_aliases: &[Name]) -> bool {
        if self.fullname() == reader.fullname() || self.name == reader.name {
            return true;
        }
        reader_aliases
            .iter()
            .any(|alias| alias.fullname() == self.fullname() || alias.name == self.name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}

/// Avro schema tree, as produced by an external schema parser.
///
/// Named types (`record`, `enum`, `fixed`) are defined once and referenced
/// elsewhere through [`Schema::Ref`], which is how recursive types are
/// expressed.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Array(Box<Schema>),
    Map(Box<Schema>),
    Union(Vec<Schema>),
    Record(RecordSchema),
    Enum(EnumSchema),
    Fixed(FixedSchema),
    /// Reference to a named type defined elsewhere in the same tree.
    Ref(Name),
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array(Box::new(items))
    }

    pub fn map(values: Schema) -> Self {
        Schema::Map(Box::new(values))
    }

    pub fn union(branches: Vec<Schema>) -> Self {
        Schema::Union(branches)
    }

    pub fn reference(full: &str) -> Self {
        Schema::Ref(Name::new(full))
    }

    /// Name of the defined type, if this node defines one.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Schema::Record(r) => Some(&r.name),
            Schema::Enum(e) => Some(&e.name),
            Schema::Fixed(f) => Some(&f.name),
            _ => None,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Null => write!(f, "null"),
            Schema::Boolean => write!(f, "boolean"),
            Schema::Int => write!(f, "int"),
            Schema::Long => write!(f, "long"),
            Schema::Float => write!(f, "float"),
            Schema::Double => write!(f, "double"),
            Schema::Bytes => write!(f, "bytes"),
            Schema::String => write!(f, "string"),
            Schema::Array(items) => write!(f, "array<{}>", items),
            Schema::Map(values) => write!(f, "map<{}>", values),
            Schema::Union(branches) => {
                write!(f, "[")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", branch)?;
                }
                write!(f, "]")
            }
            Schema::Record(r) => write!(f, "record {}", r.name),
            Schema::Enum(e) => write!(f, "enum {}", e.name),
            Schema::Fixed(x) => write!(f, "fixed {}({})", x.name, x.size),
            Schema::Ref(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: Name,
    pub aliases: Vec<Name>,
    pub fields: Vec<RecordField>,
}

impl RecordSchema {
    pub fn new(full: &str, fields: Vec<RecordField>) -> Self {
        RecordSchema {
            name: Name::new(full),
            aliases: Vec::new(),
            fields,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| Name::new(a)).collect();
        self
    }

    /// Reader-side lookup of a writer field: by name, then by the reader
    /// field's aliases.
    pub fn field_for(&self, writer_field: &str) -> Option<(usize, &RecordField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == writer_field)
            .or_else(|| {
                self.fields
                    .iter()
                    .enumerate()
                    .find(|(_, f)| f.aliases.iter().any(|a| a == writer_field))
            })
    }
}

impl From<RecordSchema> for Schema {
    fn from(record: RecordSchema) -> Self {
        Schema::Record(record)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub aliases: Vec<String>,
    pub schema: Schema,
    /// Value used when the writer did not provide this field.
    pub default: Option<Datum>,
}

impl RecordField {
    pub fn new(name: &str, schema: Schema) -> Self {
        RecordField {
            name: name.to_string(),
            aliases: Vec::new(),
            schema,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Datum) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub name: Name,
    pub aliases: Vec<Name>,
    pub symbols: Vec<String>,
    /// Symbol substituted for writer symbols the reader does not know.
    pub default: Option<String>,
}

impl EnumSchema {
    pub fn new(full: &str, symbols: &[&str]) -> Self {
        EnumSchema {
            name: Name::new(full),
            aliases: Vec::new(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            default: None,
        }
    }

    pub fn with_default(mut self, symbol: &str) -> Self {
        self.default = Some(symbol.to_string());
        self
    }

    pub fn position(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

impl From<EnumSchema> for Schema {
    fn from(e: EnumSchema) -> Self {
        Schema::Enum(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedSchema {
    pub name: Name,
    pub aliases: Vec<Name>,
    pub size: usize,
}

impl FixedSchema {
    pub fn new(full: &str, size: usize) -> Self {
        FixedSchema {
            name: Name::new(full),
            aliases: Vec::new(),
            size,
        }
    }
}

impl From<FixedSchema> for Schema {
    fn from(f: FixedSchema) -> Self {
        Schema::Fixed(f)
    }
}

/// Table of the named types defined inside one schema tree.
#[derive(Debug, Clone, Default)]
pub struct Names<'s> {
    types: HashMap<String, &'s Schema>,
}

impl<'s> Names<'s> {
    pub fn collect(root: &'s Schema) -> Self {
        let mut names = Names::default();
        names.visit(root);
        names
    }

    fn visit(&mut self, schema: &'s Schema) {
        match schema {
            Schema::Record(record) => {
                self.types.insert(record.name.fullname(), schema);
                for field in &record.fields {
                    self.visit(&field.schema);
                }
            }
            Schema::Enum(e) => {
                self.types.insert(e.name.fullname(), schema);
            }
            Schema::Fixed(f) => {
                self.types.insert(f.name.fullname(), schema);
            }
            Schema::Array(inner) | Schema::Map(inner) => self.visit(inner),
            Schema::Union(branches) => {
                for branch in branches {
                    self.visit(branch);
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, name: &Name) -> Option<&'s Schema> {
        self.types.get(&name.fullname()).copied()
    }

    /// Follow a `Ref` to its definition; other nodes are returned as-is.
    pub fn resolve(&self, schema: &'s Schema) -> Option<&'s Schema> {
        match schema {
            Schema::Ref(name) => self.get(name),
            other => Some(other),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
