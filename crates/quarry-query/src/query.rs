//! Query definitions and the kind-checked builder.
//!
//! A [`QueryDefinition`] is the complete logical description of one
//! statement: kind, target table, clauses, and values. It is pure data with
//! structural equality, independent of any dialect. The [`Query`] builder
//! accumulates clauses fluently and validates kind/clause combinations when
//! [`build`](Query::build) is called, so malformed shapes surface as
//! [`InvalidQuery`](quarry_core::ValidationErrorKind::InvalidQuery) errors
//! before any SQL exists.

use crate::clause::{Join, OrderBy};
use crate::expr::Expr;
use quarry_core::{Result, ValidationError, Value};

/// The operation a query performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Atomic insert-or-update keyed on conflict columns
    Upsert,
}

/// A complete, dialect-independent description of one SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    pub kind: QueryKind,
    /// Target table
    pub table: String,
    /// Select list; empty means all columns
    pub columns: Vec<Expr>,
    /// Column/value pairs for INSERT, UPDATE, and UPSERT
    pub assignments: Vec<(String, Value)>,
    /// Key columns an UPSERT detects conflicts on
    pub conflict_columns: Vec<String>,
    /// WHERE condition
    pub filter: Option<Expr>,
    /// JOIN clauses, in declaration order
    pub joins: Vec<Join>,
    /// GROUP BY expressions
    pub group_by: Vec<Expr>,
    /// HAVING condition
    pub having: Option<Expr>,
    /// ORDER BY entries, in declaration order
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    /// Generated columns whose values the backend reports after execution
    pub returning: Vec<String>,
}

/// Fluent builder for [`QueryDefinition`].
#[derive(Debug, Clone)]
pub struct Query {
    def: QueryDefinition,
}

impl Query {
    fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            def: QueryDefinition {
                kind,
                table: table.into(),
                columns: Vec::new(),
                assignments: Vec::new(),
                conflict_columns: Vec::new(),
                filter: None,
                joins: Vec::new(),
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
                limit: None,
                offset: None,
                distinct: false,
                returning: Vec::new(),
            },
        }
    }

    /// Start a SELECT query against a table.
    pub fn select(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Select, table)
    }

    /// Start an INSERT statement.
    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Insert, table)
    }

    /// Start an UPDATE statement.
    pub fn update(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Update, table)
    }

    /// Start a DELETE statement.
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Delete, table)
    }

    /// Start an UPSERT statement (insert-or-update on key conflict).
    pub fn upsert(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Upsert, table)
    }

    /// Add a column to the select list.
    pub fn column(mut self, expr: impl Into<Expr>) -> Self {
        self.def.columns.push(expr.into());
        self
    }

    /// Add several named columns to the select list.
    pub fn columns(mut self, names: &[&str]) -> Self {
        self.def.columns.extend(names.iter().map(|n| Expr::col(*n)));
        self
    }

    /// Set DISTINCT on the select list.
    pub fn distinct(mut self) -> Self {
        self.def.distinct = true;
        self
    }

    /// Bind a column/value pair for INSERT, UPDATE, or UPSERT.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.def.assignments.push((column.into(), value.into()));
        self
    }

    /// Name the key columns an UPSERT detects conflicts on.
    pub fn on_conflict(mut self, columns: &[&str]) -> Self {
        self.def
            .conflict_columns
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    /// Set or AND-extend the WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.def.filter = Some(match self.def.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Add a JOIN clause.
    pub fn join(mut self, join: Join) -> Self {
        self.def.joins.push(join);
        self
    }

    /// Add a GROUP BY expression.
    pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
        self.def.group_by.push(expr.into());
        self
    }

    /// Set the HAVING condition.
    pub fn having(mut self, expr: Expr) -> Self {
        self.def.having = Some(expr);
        self
    }

    /// Add an ORDER BY entry.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.def.order_by.push(order);
        self
    }

    /// Limit the number of returned rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.def.limit = Some(n);
        self
    }

    /// Skip the first `n` rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.def.offset = Some(n);
        self
    }

    /// Name generated columns to read back after an INSERT or UPSERT.
    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.def
            .returning
            .extend(columns.iter().map(|c| (*c).to_string()));
        self
    }

    /// Validate the clause combination and produce the definition.
    pub fn build(self) -> Result<QueryDefinition> {
        let def = self.def;
        let reject = |clause: &str| {
            Err(ValidationError::invalid_query(format!(
                "{} not allowed on {:?} against '{}'",
                clause, def.kind, def.table
            ))
            .into())
        };

        match def.kind {
            QueryKind::Select => {
                if !def.assignments.is_empty() {
                    return reject("SET assignments");
                }
                if !def.conflict_columns.is_empty() {
                    return reject("conflict columns");
                }
                if def.having.is_some() && def.group_by.is_empty() {
                    return Err(ValidationError::invalid_query(format!(
                        "HAVING without GROUP BY against '{}'",
                        def.table
                    ))
                    .into());
                }
            }
            QueryKind::Insert | QueryKind::Upsert => {
                if def.assignments.is_empty() {
                    return Err(ValidationError::invalid_query(format!(
                        "{:?} against '{}' binds no values",
                        def.kind, def.table
                    ))
                    .into());
                }
                if def.filter.is_some() {
                    return reject("WHERE");
                }
                if !def.joins.is_empty() {
                    return reject("JOIN");
                }
                if !def.group_by.is_empty() || def.having.is_some() {
                    return reject("GROUP BY/HAVING");
                }
                if !def.order_by.is_empty() || def.limit.is_some() || def.offset.is_some() {
                    return reject("ORDER BY/LIMIT/OFFSET");
                }
                if def.kind == QueryKind::Upsert && def.conflict_columns.is_empty() {
                    return Err(ValidationError::invalid_query(format!(
                        "UPSERT against '{}' names no conflict columns",
                        def.table
                    ))
                    .into());
                }
                if def.kind == QueryKind::Insert && !def.conflict_columns.is_empty() {
                    return reject("conflict columns");
                }
            }
            QueryKind::Update => {
                if def.assignments.is_empty() {
                    return Err(ValidationError::invalid_query(format!(
                        "UPDATE against '{}' sets no columns",
                        def.table
                    ))
                    .into());
                }
                if !def.joins.is_empty() {
                    return reject("JOIN");
                }
                if !def.group_by.is_empty() || def.having.is_some() {
                    return reject("GROUP BY/HAVING");
                }
                if !def.order_by.is_empty() || def.limit.is_some() || def.offset.is_some() {
                    return reject("ORDER BY/LIMIT/OFFSET");
                }
                if !def.conflict_columns.is_empty() || !def.returning.is_empty() {
                    return reject("conflict/returning columns");
                }
            }
            QueryKind::Delete => {
                if !def.assignments.is_empty() {
                    return reject("SET assignments");
                }
                if !def.joins.is_empty() {
                    return reject("JOIN");
                }
                if !def.group_by.is_empty() || def.having.is_some() {
                    return reject("GROUP BY/HAVING");
                }
                if !def.order_by.is_empty() || def.limit.is_some() || def.offset.is_some() {
                    return reject("ORDER BY/LIMIT/OFFSET");
                }
                if !def.columns.is_empty() {
                    return reject("select list");
                }
                if !def.conflict_columns.is_empty() || !def.returning.is_empty() {
                    return reject("conflict/returning columns");
                }
            }
        }
        Ok(def)
    }
}
