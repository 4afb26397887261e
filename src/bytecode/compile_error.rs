use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A method call that nothing registered. The builder registers every
    /// method before lowering, so this means the IR is not well formed.
    #[error("compile error: unable to call unknown method {0:?}")]
    UnknownMethod(String),

    /// A `Ref` to a named type that the schema tree never defines.
    #[error("compile error: at {path}: unknown named type '{name}'")]
    UnknownType { path: String, name: String },

    /// The writer's type at `path` cannot be read as the reader's type.
    #[error("compile error: at {path}: writer {writer} cannot be read as {reader}")]
    Incompatible {
        path: String,
        writer: String,
        reader: String,
    },

    /// A reader field the writer does not have, and no default to fill it.
    #[error(
        "compile error: at {path}: reader field '{field}' is missing from the writer and has no default"
    )]
    MissingDefault { path: String, field: String },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn incompatible(
        path: impl Into<String>,
        writer: impl std::fmt::Display,
        reader: impl std::fmt::Display,
    ) -> Self {
        CompileError::Incompatible {
            path: path.into(),
            writer: writer.to_string(),
            reader: reader.to_string(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
