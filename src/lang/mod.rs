//! # Schema and value model
//!
//! The schema tree is the input the compiler consumes; it is built by an
//! external schema parser and is never mutated here. [`Datum`] is the
//! generic value tree used for field defaults and generic decoding.

pub mod datum;
pub mod schema;

pub use datum::Datum;
pub use schema::{EnumSchema, FixedSchema, Name, Names, RecordField, RecordSchema, Schema};
