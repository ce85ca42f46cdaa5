//! Query definitions and the dialect-aware statement compiler for Quarry.
//!
//! This crate turns typed, dialect-independent query definitions into SQL:
//!
//! - `Expr` expression trees with structural equality
//! - `Query` builder producing validated `QueryDefinition`s
//! - `Dialect` descriptors for placeholder/quoting/upsert differences
//! - `compile` turning a definition into a `CompiledStatement`

pub mod clause;
pub mod compile;
pub mod dialect;
pub mod expr;
pub mod query;

pub use clause::{Join, JoinType, OrderBy, OrderDirection};
pub use compile::{CompiledStatement, compile};
pub use dialect::{Dialect, UpsertStyle};
pub use expr::{BinaryOp, Expr, InSet, UnaryOp};
pub use query::{Query, QueryDefinition, QueryKind};
