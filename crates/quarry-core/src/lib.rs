//! Core types and traits for Quarry.
//!
//! This crate provides the foundational abstractions for object-relational
//! persistence:
//!
//! - `Entity` trait for struct-to-table mapping with typed accessors
//! - `AttributeInfo` and `RelationshipInfo` metadata tables
//! - `EntityModel` sealed runtime registry
//! - `Backend` trait for executing parameterized SQL
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod attribute;
pub mod backend;
pub mod entity;
pub mod error;
pub mod model;
pub mod relationship;
pub mod row;
pub mod value;

pub use attribute::{AttributeInfo, ReferentialAction, SqlType};
pub use backend::Backend;
pub use entity::{Accessor, Entity};
pub use error::{
    Error, PoolError, PoolErrorKind, Result, StatementError, StatementErrorKind, TransactionError,
    ValidationError, ValidationErrorKind,
};
pub use model::{EntityModel, EntityType, ModelBuilder};
pub use relationship::{
    JunctionTable, Related, RelatedMany, RelationshipInfo, RelationshipKind, find_relationship,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
