//! Error types for Quarry operations.

use std::fmt;

/// The primary error type for all Quarry operations.
#[derive(Debug)]
pub enum Error {
    /// Malformed query or metadata, detected at build time
    Validation(ValidationError),
    /// Connection pool exhausted or acquisition timed out
    ConnectionUnavailable(PoolError),
    /// The backend rejected a statement
    Statement(StatementError),
    /// Commit attempted after the transaction was marked rollback-only
    TransactionRolledBack(TransactionError),
    /// Optimistic-concurrency conflict: the row changed underneath us
    StaleEntity {
        /// Entity type name
        entity: &'static str,
        /// Human-readable key description
        key: String,
    },
    /// A row that was required to exist is gone
    EntityNotFound {
        /// Entity type name
        entity: &'static str,
        /// Human-readable key description
        key: String,
    },
    /// The dialect cannot express the requested SQL
    Unsupported(String),
    /// Operation was cancelled cooperatively
    Cancelled,
    /// Custom error with message
    Custom(String),
}

/// Validation error raised while building queries or registering metadata.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// An illegal clause combination in a query builder
    InvalidQuery,
    /// Two entity types registered under the same name
    DuplicateType,
    /// An attribute name that does not exist on the entity type
    UnknownAttribute,
    /// Mutation attempted on a sealed model, or a model invariant broken
    IllegalState,
}

impl ValidationError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::InvalidQuery,
            message: message.into(),
        }
    }

    pub fn duplicate_type(name: &str) -> Self {
        Self {
            kind: ValidationErrorKind::DuplicateType,
            message: format!("entity type '{name}' is already registered"),
        }
    }

    pub fn unknown_attribute(entity: &str, attribute: &str) -> Self {
        Self {
            kind: ValidationErrorKind::UnknownAttribute,
            message: format!("entity type '{entity}' has no attribute '{attribute}'"),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::IllegalState,
            message: message.into(),
        }
    }
}

/// Error raised when the backend rejects a statement.
///
/// Wraps the native driver error without losing its code or message.
#[derive(Debug)]
pub struct StatementError {
    pub kind: StatementErrorKind,
    /// The SQL that was being executed, if known
    pub sql: Option<String>,
    /// SQLSTATE code reported by the backend, if any
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// Unique or foreign key constraint violation
    ConstraintViolation,
    /// Parameter or column type mismatch
    TypeMismatch,
    /// Syntax error in generated SQL (a compiler bug, not a user error)
    Syntax,
    /// Statement timed out at the backend
    Timeout,
    /// Other backend error
    Database,
}

impl StatementError {
    pub fn new(kind: StatementErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            sqlstate: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StatementErrorKind::ConstraintViolation, message)
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_source(mut self, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

/// Pool acquisition failure.
#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// No connection became available within the acquire timeout
    Timeout,
    /// Pool has been closed
    Closed,
    /// The connection factory failed
    Factory,
}

impl PoolError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: PoolErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self {
            kind: PoolErrorKind::Closed,
            message: message.into(),
        }
    }

    pub fn factory(message: impl Into<String>) -> Self {
        Self {
            kind: PoolErrorKind::Factory,
            message: message.into(),
        }
    }
}

/// Transaction lifecycle failure.
#[derive(Debug, Clone)]
pub struct TransactionError {
    pub message: String,
}

impl Error {
    /// Is this a retryable error (pool timeout, backend timeout)?
    ///
    /// Quarry never retries on its own; this flag is advisory for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionUnavailable(p) => matches!(p.kind, PoolErrorKind::Timeout),
            Error::Statement(s) => matches!(s.kind, StatementErrorKind::Timeout),
            _ => false,
        }
    }

    /// Is this a constraint violation reported by the backend?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Statement(StatementError {
                kind: StatementErrorKind::ConstraintViolation,
                ..
            })
        )
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation).
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Statement(s) => s.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "Validation error: {}", e.message),
            Error::ConnectionUnavailable(e) => write!(f, "Connection unavailable: {}", e.message),
            Error::Statement(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Statement error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Statement error: {}", e.message)
                }
            }
            Error::TransactionRolledBack(e) => {
                write!(f, "Transaction rolled back: {}", e.message)
            }
            Error::StaleEntity { entity, key } => {
                write!(f, "Stale entity {entity}({key}): concurrent modification detected")
            }
            Error::EntityNotFound { entity, key } => {
                write!(f, "Entity {entity}({key}) not found")
            }
            Error::Unsupported(msg) => write!(f, "Unsupported operation: {msg}"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Statement(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<StatementError> for Error {
    fn from(err: StatementError) -> Self {
        Error::Statement(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::ConnectionUnavailable(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::TransactionRolledBack(err)
    }
}

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, Error>;
