//! Quarry - object-relational persistence for Rust.
//!
//! Quarry maps plain structs to relational tables and gives you:
//!
//! - Typed entity metadata with attribute and relationship tables
//! - A fluent query builder compiling to dialect-specific SQL
//! - A transactional data store with dirty tracking and a weak identity cache
//! - Bounded connection pooling with structured concurrency
//!
//! # Quick Start
//!
//! ```ignore
//! use quarry::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Hero {
//!     id: Option<i64>,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! impl Entity for Hero {
//!     const TABLE_NAME: &'static str = "hero";
//!     const PRIMARY_KEY: &'static [&'static str] = &["id"];
//!     // attributes(), accessors(), from_row() describe the mapping
//!     # fn attributes() -> &'static [AttributeInfo] { unimplemented!() }
//!     # fn accessors() -> &'static [Accessor<Self>] { unimplemented!() }
//!     # fn from_row(row: &Row) -> Result<Self> { unimplemented!() }
//! }
//!
//! async fn example(cx: &Cx, backend: impl Backend) -> Outcome<(), Error> {
//!     let model = ModelBuilder::new("app").register::<Hero>()?.seal()?;
//!     let mut store = EntityStore::new(backend, model, StoreConfig::default());
//!
//!     // Insert assigns the generated key back onto the struct.
//!     let mut hero = Hero { id: None, name: "Spider-Man".into(), age: Some(25) };
//!     store.insert(cx, &mut hero).await?;
//!
//!     // Updates touch only the attributes that changed.
//!     hero.age = Some(26);
//!     store.update(cx, &mut hero).await?;
//!
//!     // Lookups by key are served from the identity cache when live.
//!     let found = store.find_by_key::<Hero>(cx, hero.id).await?;
//!
//!     store.delete(cx, &hero).await?;
//!     Outcome::Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Deterministic compilation**: the same query definition always compiles
//!   to byte-identical SQL, including join aliases and parameter numbering
//! - **Structured concurrency**: built on asupersync for cancel-correct
//!   operations end to end
//! - **Optimistic concurrency**: version attributes turn updates into
//!   compare-and-swap statements
//! - **Cascading deletes**: relationship metadata drives junction and child
//!   cleanup inside one transaction

pub use quarry_core::{
    // asupersync re-exports
    Cx,
    Outcome,
    // Entity metadata
    Accessor,
    AttributeInfo,
    Entity,
    EntityModel,
    EntityType,
    JunctionTable,
    ModelBuilder,
    ReferentialAction,
    Related,
    RelatedMany,
    RelationshipInfo,
    RelationshipKind,
    SqlType,
    find_relationship,
    // Execution surface
    Backend,
    ColumnInfo,
    FromValue,
    Row,
    Value,
    // Errors
    Error,
    PoolError,
    PoolErrorKind,
    Result,
    StatementError,
    StatementErrorKind,
    TransactionError,
    ValidationError,
    ValidationErrorKind,
};

pub use quarry_query::{
    BinaryOp, CompiledStatement, Dialect, Expr, InSet, Join, JoinType, OrderBy, OrderDirection,
    Query, QueryDefinition, QueryKind, UnaryOp, UpsertStyle, compile,
};

pub use quarry_pool::{Pool, PoolConfig, PoolStats, PooledConnection};

pub use quarry_store::{
    CancelToken, Completion, EntityCache, EntityState, EntityStore, EntityStream, ObjectKey,
    StateTracker, StoreConfig, TransactionState,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use quarry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Entity metadata
        Accessor,
        AttributeInfo,
        Entity,
        EntityModel,
        ModelBuilder,
        Related,
        RelatedMany,
        RelationshipInfo,
        SqlType,
        // Execution surface
        Backend,
        Error,
        Result,
        Row,
        Value,
        // Query building
        Dialect,
        Expr,
        Join,
        OrderBy,
        Query,
        compile,
        // Pool
        Pool,
        PoolConfig,
        // Store
        EntityStore,
        EntityStream,
        StoreConfig,
    };
}
