use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{IrInstruction, IrProgram, Method};
use crate::bytecode::{Op, Type};
use crate::lang::schema::{EnumSchema, Names, RecordSchema, Schema};

/// Where a resolved union value is delivered.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// The sink currently on top (array element, map value, root).
    Current,
    /// A field of the current record sink; a null branch becomes `SetNull`.
    Field(usize),
}

/// Walks a writer schema against a reader schema and emits IR.
///
/// Every record becomes a method, keyed by its writer/reader names, so a
/// recursive type is compiled once and referenced by `MethodCall`.
pub(crate) struct Builder<'s> {
    writer_names: Names<'s>,
    reader_names: Names<'s>,
    ir: IrProgram,
    /// Instructions of the body currently being built (main or a method).
    out: Vec<IrInstruction>,
    path: Vec<String>,
}

pub(crate) fn build<'s>(writer: &'s Schema, reader: &'s Schema) -> Result<IrProgram, CompileError> {
    let mut builder = Builder {
        writer_names: Names::collect(writer),
        reader_names: Names::collect(reader),
        ir: IrProgram::new(),
        out: Vec::new(),
        path: Vec::new(),
    };

    builder.value(writer, Some(reader))?;
    builder.emit_op(Op::Return);

    let mut ir = builder.ir;
    ir.main = builder.out;
    Ok(ir)
}

impl<'s> Builder<'s> {
    fn emit(&mut self, inst: IrInstruction) {
        self.out.push(inst);
    }

    fn emit_op(&mut self, op: Op) {
        self.out.push(IrInstruction::Literal(op));
    }

    fn path(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path.join(".")
        }
    }

    fn writer_type(&self, schema: &'s Schema) -> Result<&'s Schema, CompileError> {
        self.writer_names
            .resolve(schema)
            .ok_or_else(|| self.unknown_type(schema))
    }

    fn reader_type(&self, schema: &'s Schema) -> Result<&'s Schema, CompileError> {
        self.reader_names
            .resolve(schema)
            .ok_or_else(|| self.unknown_type(schema))
    }

    fn unknown_type(&self, schema: &Schema) -> CompileError {
        CompileError::UnknownType {
            path: self.path(),
            name: schema.to_string(),
        }
    }

    fn incompatible(&self, writer: &Schema, reader: &Schema) -> CompileError {
        CompileError::incompatible(self.path(), writer, reader)
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Decode one writer value into the current sink, or skip it when there
    /// is no reader counterpart.
    fn value(&mut self, writer: &'s Schema, reader: Option<&'s Schema>) -> Result<(), CompileError> {
        let w = self.writer_type(writer)?;
        let Some(reader) = reader else {
            return self.skip(w);
        };
        let r = self.reader_type(reader)?;

        match (w, r) {
            (Schema::Union(branches), _) => self.writer_union(branches, r, Slot::Current),
            (_, Schema::Union(branches)) => self.reader_union(w, r, branches, Slot::Current),

            (Schema::Record(wr), Schema::Record(rr)) => {
                if !wr.name.matches(&rr.name, &rr.aliases) {
                    return Err(self.incompatible(w, r));
                }
                self.record(wr, Some(rr))
            }

            (Schema::Array(wi), Schema::Array(ri)) => self.block(true, |b| {
                b.emit_op(Op::AppendArray);
                b.value(wi, Some(ri))?;
                b.emit_op(Op::Exit);
                Ok(())
            }),

            (Schema::Map(wv), Schema::Map(rv)) => self.block(true, |b| {
                b.emit_op(Op::Read(Type::String));
                b.emit_op(Op::AppendMap);
                b.value(wv, Some(rv))?;
                b.emit_op(Op::Exit);
                Ok(())
            }),

            (Schema::Enum(we), Schema::Enum(re)) => {
                if !we.name.matches(&re.name, &re.aliases) {
                    return Err(self.incompatible(w, r));
                }
                self.enum_symbols(we, re)
            }

            (Schema::Fixed(wf), Schema::Fixed(rf)) => {
                if !wf.name.matches(&rf.name, &rf.aliases) || wf.size != rf.size {
                    return Err(self.incompatible(w, r));
                }
                self.emit_op(Op::Read(Type::Fixed(wf.size)));
                self.emit_op(Op::Set(Type::Fixed(rf.size)));
                Ok(())
            }

            _ => match (primitive(w), primitive(r)) {
                (Some(Type::Null), Some(Type::Null)) => Ok(()),
                (Some(wt), Some(rt)) if promotes(wt, rt) => {
                    self.emit_op(Op::Read(wt));
                    self.emit_op(Op::Set(rt));
                    Ok(())
                }
                _ => Err(self.incompatible(w, r)),
            },
        }
    }

    /// Read a value and drop it. Never touches the sink.
    fn skip(&mut self, writer: &'s Schema) -> Result<(), CompileError> {
        let w = self.writer_type(writer)?;
        match w {
            Schema::Null => {}
            Schema::Boolean
            | Schema::Int
            | Schema::Long
            | Schema::Float
            | Schema::Double
            | Schema::Bytes
            | Schema::String => {
                if let Some(t) = primitive(w) {
                    self.emit_op(Op::Read(t));
                }
            }
            Schema::Enum(_) => self.emit_op(Op::Read(Type::Int)),
            Schema::Fixed(f) => self.emit_op(Op::Read(Type::Fixed(f.size))),
            Schema::Array(items) => return self.block(false, |b| b.skip(items)),
            Schema::Map(values) => {
                return self.block(false, |b| {
                    b.emit_op(Op::Read(Type::String));
                    b.skip(values)
                });
            }
            Schema::Union(branches) => return self.skip_union(branches),
            Schema::Record(record) => return self.record(record, None),
            Schema::Ref(name) => {
                return Err(CompileError::internal(format!(
                    "unresolved reference to {}",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Record field `index` of the current record sink.
    fn field(&mut self, index: usize, writer: &'s Schema, reader: &'s Schema) -> Result<(), CompileError> {
        let w = self.writer_type(writer)?;
        let r = self.reader_type(reader)?;

        match (w, r) {
            (Schema::Union(branches), Schema::Union(_)) => {
                self.writer_union(branches, r, Slot::Field(index))
            }
            (_, Schema::Union(branches)) => self.reader_union(w, r, branches, Slot::Field(index)),
            (Schema::Null, Schema::Null) => {
                self.emit_op(Op::SetNull(index));
                Ok(())
            }
            _ => {
                self.emit_op(Op::Enter(index));
                self.value(w, Some(r))?;
                self.emit_op(Op::Exit);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Containers
    // =========================================================================

    fn block<F>(&mut self, has_size_hint: bool, body: F) -> Result<(), CompileError>
    where
        F: FnOnce(&mut Self) -> Result<(), CompileError>,
    {
        let block = self.ir.add_block(has_size_hint);
        self.emit(IrInstruction::BlockStart {
            block,
            has_size_hint,
        });
        body(self)?;
        self.emit(IrInstruction::BlockEnd { block });
        Ok(())
    }

    fn record(
        &mut self,
        writer: &'s RecordSchema,
        reader: Option<&'s RecordSchema>,
    ) -> Result<(), CompileError> {
        let name = match reader {
            Some(r) if r.name == writer.name => format!("read:{}", writer.name),
            Some(r) => format!("read:{}>{}", writer.name, r.name),
            None => format!("skip:{}", writer.name),
        };

        if !self.ir.methods.contains_key(&name) {
            // Registered before the body is built so recursive references
            // resolve to a call instead of being inlined again.
            self.ir.methods.insert(
                name.clone(),
                Method {
                    name: name.clone(),
                    offset: 0,
                    body: Vec::new(),
                },
            );

            let outer = std::mem::take(&mut self.out);
            let result = self.record_body(writer, reader);
            let body = std::mem::replace(&mut self.out, outer);
            result?;

            if let Some(method) = self.ir.methods.get_mut(&name) {
                method.body = body;
            }
        }

        self.emit(IrInstruction::MethodCall(name));
        Ok(())
    }

    fn record_body(
        &mut self,
        writer: &'s RecordSchema,
        reader: Option<&'s RecordSchema>,
    ) -> Result<(), CompileError> {
        self.path.push(writer.name.name.clone());
        let mut matched = vec![false; reader.map_or(0, |r| r.fields.len())];

        for wf in &writer.fields {
            self.path.push(wf.name.clone());
            let result = match reader.and_then(|r| r.field_for(&wf.name)) {
                // name and alias can both point at one reader field
                Some((index, rf)) if matched[index] => {
                    Err(CompileError::incompatible(
                        self.path(),
                        format!("field '{}'", wf.name),
                        format!("field '{}' already filled by another writer field", rf.name),
                    ))
                }
                Some((index, rf)) => {
                    matched[index] = true;
                    self.field(index, &wf.schema, &rf.schema)
                }
                None => self.skip(&wf.schema),
            };
            self.path.pop();
            result?;
        }

        if let Some(reader) = reader {
            for (index, rf) in reader.fields.iter().enumerate() {
                if matched[index] {
                    continue;
                }
                if rf.default.is_none() {
                    return Err(CompileError::MissingDefault {
                        path: self.path(),
                        field: rf.name.clone(),
                    });
                }
                self.emit_op(Op::SetDefault(index));
            }
        }

        self.path.pop();
        self.emit_op(Op::Return);
        Ok(())
    }

    // =========================================================================
    // Unions and enums
    // =========================================================================

    /// Writer union: read the branch index and dispatch. Writer branches
    /// that resolve against the reader get a case; any other branch index
    /// halts at run time.
    fn writer_union(
        &mut self,
        branches: &'s [Schema],
        reader: &'s Schema,
        slot: Slot,
    ) -> Result<(), CompileError> {
        let mut cases = Vec::new();
        for (writer_index, branch) in branches.iter().enumerate() {
            let w = self.writer_type(branch)?;
            let reader_index = match reader {
                Schema::Union(reader_branches) => self
                    .find_reader_branch(w, reader_branches)?
                    .map(|r| r as i64),
                other => (same_kind(w, other) || promotable(w, other)).then_some(-1),
            };
            if let Some(reader_index) = reader_index {
                cases.push((writer_index as i64, w, reader_index));
            }
        }

        let message = format!(
            "at {}: writer union branch has no counterpart in reader {}",
            self.path(),
            reader
        );
        self.emit_op(Op::Read(Type::Long));
        let switch = self.ir.add_switch(message);
        self.emit(IrInstruction::SwitchStart {
            switch,
            cases: cases.len(),
        });

        for (writer_index, w, reader_index) in cases {
            self.emit(IrInstruction::SwitchCase {
                switch,
                writer_index,
                reader_index,
            });
            match reader {
                Schema::Union(reader_branches) => {
                    let index = reader_index as usize;
                    self.union_branch(slot, index, w, &reader_branches[index])?;
                }
                _ => self.value(w, Some(reader))?,
            }
        }

        self.emit(IrInstruction::SwitchEnd { switch });
        Ok(())
    }

    /// Writer non-union into a reader union: the branch is fixed at compile
    /// time.
    fn reader_union(
        &mut self,
        writer: &'s Schema,
        reader: &'s Schema,
        branches: &'s [Schema],
        slot: Slot,
    ) -> Result<(), CompileError> {
        match self.find_reader_branch(writer, branches)? {
            Some(index) => self.union_branch(slot, index, writer, &branches[index]),
            None => Err(self.incompatible(writer, reader)),
        }
    }

    fn union_branch(
        &mut self,
        slot: Slot,
        reader_index: usize,
        writer: &'s Schema,
        reader_branch: &'s Schema,
    ) -> Result<(), CompileError> {
        let r = self.reader_type(reader_branch)?;
        let is_null = matches!(r, Schema::Null);

        match slot {
            Slot::Field(field) if is_null => self.emit_op(Op::SetNull(field)),
            Slot::Field(field) => {
                self.emit_op(Op::Enter(field));
                self.branch_value(reader_index, writer, r)?;
                self.emit_op(Op::Exit);
            }
            Slot::Current if is_null => self.emit_op(Op::SetUnionBranch(reader_index)),
            Slot::Current => self.branch_value(reader_index, writer, r)?,
        }
        Ok(())
    }

    fn branch_value(
        &mut self,
        reader_index: usize,
        writer: &'s Schema,
        reader: &'s Schema,
    ) -> Result<(), CompileError> {
        self.emit_op(Op::SetUnionBranch(reader_index));
        self.emit_op(Op::Enter(reader_index));
        self.value(writer, Some(reader))?;
        self.emit_op(Op::Exit);
        Ok(())
    }

    fn skip_union(&mut self, branches: &'s [Schema]) -> Result<(), CompileError> {
        let message = format!("at {}: union branch index out of range", self.path());
        self.emit_op(Op::Read(Type::Long));
        let switch = self.ir.add_switch(message);
        self.emit(IrInstruction::SwitchStart {
            switch,
            cases: branches.len(),
        });
        for (writer_index, branch) in branches.iter().enumerate() {
            self.emit(IrInstruction::SwitchCase {
                switch,
                writer_index: writer_index as i64,
                reader_index: -1,
            });
            self.skip(branch)?;
        }
        self.emit(IrInstruction::SwitchEnd { switch });
        Ok(())
    }

    /// First reader branch of the same kind, else the first one the writer
    /// type promotes to.
    fn find_reader_branch(
        &self,
        writer: &'s Schema,
        branches: &'s [Schema],
    ) -> Result<Option<usize>, CompileError> {
        let resolved = branches
            .iter()
            .map(|b| self.reader_type(b))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(index) = resolved.iter().position(|r| same_kind(writer, r)) {
            return Ok(Some(index));
        }
        Ok(resolved.iter().position(|r| promotable(writer, r)))
    }

    /// Enum symbols are resolved by name through a switch over the writer's
    /// symbol index. Symbols the reader lacks map to its default symbol, or
    /// get no case at all.
    fn enum_symbols(&mut self, writer: &'s EnumSchema, reader: &'s EnumSchema) -> Result<(), CompileError> {
        let fallback = reader.default.as_deref().and_then(|d| reader.position(d));
        let mut cases = Vec::new();
        for (writer_index, symbol) in writer.symbols.iter().enumerate() {
            if let Some(reader_index) = reader.position(symbol).or(fallback) {
                let symbol_index = i32::try_from(reader_index).map_err(|_| {
                    CompileError::internal(format!("enum {} has too many symbols", reader.name))
                })?;
                cases.push((writer_index as i64, reader_index as i64, symbol_index));
            }
        }

        let message = format!(
            "at {}: symbol of writer enum {} is unknown to reader enum {}",
            self.path(),
            writer.name,
            reader.name
        );
        self.emit_op(Op::Read(Type::Int));
        let switch = self.ir.add_switch(message);
        self.emit(IrInstruction::SwitchStart {
            switch,
            cases: cases.len(),
        });
        for (writer_index, reader_index, symbol_index) in cases {
            self.emit(IrInstruction::SwitchCase {
                switch,
                writer_index,
                reader_index,
            });
            self.emit_op(Op::SetEnumSymbol(symbol_index));
        }
        self.emit(IrInstruction::SwitchEnd { switch });
        Ok(())
    }
}

fn primitive(schema: &Schema) -> Option<Type> {
    match schema {
        Schema::Null => Some(Type::Null),
        Schema::Boolean => Some(Type::Boolean),
        Schema::Int => Some(Type::Int),
        Schema::Long => Some(Type::Long),
        Schema::Float => Some(Type::Float),
        Schema::Double => Some(Type::Double),
        Schema::Bytes => Some(Type::Bytes),
        Schema::String => Some(Type::String),
        _ => None,
    }
}

/// Avro's promotion rules, identity included.
fn promotes(writer: Type, reader: Type) -> bool {
    writer == reader
        || matches!(
            (writer, reader),
            (Type::Int, Type::Long | Type::Float | Type::Double)
                | (Type::Long, Type::Float | Type::Double)
                | (Type::Float, Type::Double)
                | (Type::String, Type::Bytes)
                | (Type::Bytes, Type::String)
        )
}

fn same_kind(writer: &Schema, reader: &Schema) -> bool {
    match (writer, reader) {
        (Schema::Record(w), Schema::Record(r)) => w.name.matches(&r.name, &r.aliases),
        (Schema::Enum(w), Schema::Enum(r)) => w.name.matches(&r.name, &r.aliases),
        (Schema::Fixed(w), Schema::Fixed(r)) => {
            w.name.matches(&r.name, &r.aliases) && w.size == r.size
        }
        (Schema::Array(_), Schema::Array(_)) | (Schema::Map(_), Schema::Map(_)) => true,
        _ => match (primitive(writer), primitive(reader)) {
            (Some(w), Some(r)) => w == r,
            _ => false,
        },
    }
}

fn promotable(writer: &Schema, reader: &Schema) -> bool {
    match (primitive(writer), primitive(reader)) {
        (Some(w), Some(r)) => w != r && promotes(w, r),
        _ => false,
    }
}
