use crate::runtime::sink::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The data holds a union branch or enum symbol the compiled program
    /// has no case for.
    #[error("schema mismatch (error {error_id}): {message}")]
    SchemaMismatch { error_id: usize, message: String },

    /// The input is not valid Avro binary: truncated, overlong varint,
    /// negative length and the like.
    #[error("malformed input at byte {position}: {reason}")]
    MalformedInput { position: u64, reason: String },

    /// Sink nesting went past `VmConfig::max_depth`.
    #[error("nesting deeper than {limit} levels at byte {position}")]
    NestingTooDeep { limit: usize, position: u64 },

    /// The sink refused an operation.
    #[error("sink error at op {ip}: {source}")]
    Sink {
        ip: usize,
        #[source]
        source: SinkError,
    },

    #[error("i/o error at byte {position}: {source}")]
    Io {
        position: u64,
        #[source]
        source: std::io::Error,
    },

    /// The program itself is inconsistent (unbalanced stacks, a jump past
    /// the end). Verified programs never produce this.
    #[error("internal error at op {ip}: {reason}")]
    Internal { ip: usize, reason: String },
}

impl DecodeError {
    pub fn malformed(position: u64, reason: impl Into<String>) -> Self {
        DecodeError::MalformedInput {
            position,
            reason: reason.into(),
        }
    }

    pub fn internal(ip: usize, reason: impl Into<String>) -> Self {
        DecodeError::Internal {
            ip,
            reason: reason.into(),
        }
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, DecodeError::SchemaMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_schema_mismatch_display() {
        let err = DecodeError::SchemaMismatch {
            error_id: 3,
            message: "at Foo.bar: no such branch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "schema mismatch (error 3): at Foo.bar: no such branch"
        );
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_sink_error_source() {
        let err = DecodeError::Sink {
            ip: 4,
            source: SinkError::unsupported("set_long"),
        };
        assert!(err.to_string().contains("op 4"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("sink does not support set_long"));
    }

    #[test]
    fn test_malformed_display() {
        let err = DecodeError::malformed(12, "varint longer than 10 bytes");
        assert_eq!(
            err.to_string(),
            "malformed input at byte 12: varint longer than 10 bytes"
        );
        assert!(!err.is_schema_mismatch());
    }
}
