//! Attribute and column metadata.

/// SQL column type for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Text,
    Blob,
    Timestamp,
}

impl SqlType {
    /// Get the SQL name of this type.
    pub const fn sql_name(self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }
}

/// Referential action applied to dependent rows when the referenced row is
/// deleted.
///
/// The default is [`ReferentialAction::NoAction`]: deleting an owner with
/// dependent rows present fails with a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// Raise an error if any references exist.
    #[default]
    NoAction,
    /// Delete referencing rows first.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// Metadata about an entity attribute and its backing column.
///
/// Built once at metadata-registration time with a `const` builder chain and
/// stored in a `'static` table per entity type.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    /// Logical attribute name
    pub name: &'static str,
    /// Database column name (may differ from the attribute name)
    pub column_name: &'static str,
    /// SQL type for this attribute
    pub sql_type: SqlType,
    /// Whether this attribute is nullable
    pub nullable: bool,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the backend generates the value (e.g. auto-increment keys)
    pub generated: bool,
    /// Whether this attribute has a unique constraint
    pub unique: bool,
    /// Whether this attribute is the optimistic-concurrency version column
    pub version: bool,
    /// Default value expression (SQL)
    pub default: Option<&'static str>,
    /// Foreign key reference as "table.column"
    pub foreign_key: Option<&'static str>,
    /// Referential action for ON DELETE (only meaningful with foreign_key)
    pub on_delete: ReferentialAction,
}

impl AttributeInfo {
    /// Create a new attribute with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name,
            sql_type,
            nullable: false,
            primary_key: false,
            generated: false,
            unique: false,
            version: false,
            default: None,
            foreign_key: None,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Mark the value as backend-generated.
    ///
    /// Generated attributes are excluded from INSERT parameter lists and
    /// their values are read back from the execution result.
    pub const fn generated(mut self, value: bool) -> Self {
        self.generated = value;
        self
    }

    /// Set unique flag.
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Mark this attribute as the optimistic-concurrency version column.
    pub const fn version(mut self, value: bool) -> Self {
        self.version = value;
        self
    }

    /// Set default value expression.
    pub const fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    /// Set foreign key reference ("table.column").
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Set ON DELETE action for the foreign key.
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// The referenced table, when this attribute is a foreign key.
    pub fn referenced_table(&self) -> Option<&'static str> {
        self.foreign_key.and_then(|fk| fk.split('.').next())
    }

    /// The referenced column, when this attribute is a foreign key.
    pub fn referenced_column(&self) -> Option<&'static str> {
        self.foreign_key.and_then(|fk| fk.split('.').nth(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        const ID: AttributeInfo = AttributeInfo::new("id", "id", SqlType::BigInt)
            .primary_key(true)
            .generated(true);
        assert!(ID.primary_key);
        assert!(ID.generated);
        assert!(!ID.nullable);
        assert!(ID.foreign_key.is_none());
    }

    #[test]
    fn foreign_key_split() {
        let owner = AttributeInfo::new("owner_id", "owner_id", SqlType::BigInt)
            .foreign_key("person.id")
            .on_delete(ReferentialAction::Cascade);
        assert_eq!(owner.referenced_table(), Some("person"));
        assert_eq!(owner.referenced_column(), Some("id"));
        assert_eq!(owner.on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn referential_action_sql() {
        assert_eq!(ReferentialAction::NoAction.as_sql(), "NO ACTION");
        assert_eq!(ReferentialAction::Cascade.as_sql(), "CASCADE");
        assert_eq!(ReferentialAction::SetNull.as_sql(), "SET NULL");
    }
}
