//! SQL expressions for query building.
//!
//! Expressions form the WHERE/HAVING/ON fragments of a
//! [`QueryDefinition`](crate::QueryDefinition). The tree is a plain data
//! structure with structural equality; rendering to SQL text happens in the
//! statement compiler, never here.

use crate::query::QueryDefinition;
use quarry_core::Value;

/// A SQL expression usable in WHERE, HAVING, and join conditions.
///
/// Two expressions compare equal when their trees are structurally equal,
/// which makes query definitions usable as cache keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value, bound as a statement parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a > b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation (e.g., NOT a, -a)
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// Function call (e.g., COUNT(*), UPPER(name))
    Function { name: String, args: Vec<Expr> },

    /// IN over an explicit list or a subquery
    In {
        expr: Box<Expr>,
        set: InSet,
        negated: bool,
    },

    /// BETWEEN expression
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// Special aggregate: COUNT(*)
    CountStar,

    /// Raw SQL fragment (escape hatch, carries no parameters)
    Raw(String),
}

/// The right-hand side of an IN expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InSet {
    /// Explicit value list
    List(Vec<Expr>),
    /// A nested SELECT, compiled inline with shared parameter numbering
    Query(Box<QueryDefinition>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "NOT",
            UnaryOp::Neg => "-",
        }
    }
}

impl Expr {
    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a qualified column reference (table.column).
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a NULL literal.
    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// LIKE pattern match
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// NOT LIKE pattern match
    pub fn not_like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: true,
        }
    }

    /// IN list of values.
    ///
    /// An empty list degenerates to a constant-false predicate rather than
    /// emitting `IN ()`, which most backends reject.
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        if values.is_empty() {
            return Expr::raw("1 = 0");
        }
        Expr::In {
            expr: Box::new(self),
            set: InSet::List(values.into_iter().map(Into::into).collect()),
            negated: false,
        }
    }

    /// NOT IN list of values.
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        if values.is_empty() {
            return Expr::raw("1 = 1");
        }
        Expr::In {
            expr: Box::new(self),
            set: InSet::List(values.into_iter().map(Into::into).collect()),
            negated: true,
        }
    }

    /// IN (SELECT ...) with a nested query definition.
    pub fn in_subquery(self, query: QueryDefinition) -> Self {
        Expr::In {
            expr: Box::new(self),
            set: InSet::Query(Box::new(query)),
            negated: false,
        }
    }

    /// NOT IN (SELECT ...).
    pub fn not_in_subquery(self, query: QueryDefinition) -> Self {
        Expr::In {
            expr: Box::new(self),
            set: InSet::Query(Box::new(query)),
            negated: true,
        }
    }

    /// BETWEEN low AND high
    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    /// NOT BETWEEN low AND high
    pub fn not_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: true,
        }
    }

    /// COUNT(*) aggregate function.
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    /// COUNT(expr) aggregate function.
    pub fn count(self) -> Self {
        Expr::function("COUNT", vec![self])
    }

    /// SUM(expr) aggregate function.
    pub fn sum(self) -> Self {
        Expr::function("SUM", vec![self])
    }

    /// AVG(expr) aggregate function.
    pub fn avg(self) -> Self {
        Expr::function("AVG", vec![self])
    }

    /// MIN(expr) aggregate function.
    pub fn min(self) -> Self {
        Expr::function("MIN", vec![self])
    }

    /// MAX(expr) aggregate function.
    pub fn max(self) -> Self {
        Expr::function("MAX", vec![self])
    }

    /// UPPER function.
    pub fn upper(self) -> Self {
        Expr::function("UPPER", vec![self])
    }

    /// LOWER function.
    pub fn lower(self) -> Self {
        Expr::function("LOWER", vec![self])
    }

    /// Create a generic function call.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        let a = Expr::col("age").gt(21).and(Expr::col("name").like("A%"));
        let b = Expr::col("age").gt(21).and(Expr::col("name").like("A%"));
        let c = Expr::col("age").gt(22).and(Expr::col("name").like("A%"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_in_list_degenerates() {
        let always_false = Expr::col("id").in_list(Vec::<Expr>::new());
        assert_eq!(always_false, Expr::raw("1 = 0"));

        let always_true = Expr::col("id").not_in_list(Vec::<Expr>::new());
        assert_eq!(always_true, Expr::raw("1 = 1"));
    }

    #[test]
    fn constructor_shapes() {
        assert_eq!(
            Expr::qualified("person", "id"),
            Expr::Column {
                table: Some("person".to_string()),
                name: "id".to_string(),
            }
        );
        assert!(matches!(Expr::col("x").is_null(), Expr::IsNull { negated: false, .. }));
        assert!(matches!(Expr::col("x").not(), Expr::Unary { op: UnaryOp::Not, .. }));
    }
}
