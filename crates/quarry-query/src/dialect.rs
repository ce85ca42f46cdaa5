//! SQL dialect descriptors.
//!
//! A [`Dialect`] captures the syntactic differences the statement compiler
//! has to care about: placeholder style, identifier quoting, upsert idiom,
//! and LIMIT/OFFSET support. Everything else is rendered as portable SQL.

/// Target SQL dialect for statement generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL (uses ? placeholders)
    Mysql,
    /// Lowest-common-denominator SQL-92 subset (uses ? placeholders)
    Generic,
}

/// How a dialect expresses an atomic insert-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `INSERT ... ON CONFLICT (keys) DO UPDATE SET ...`
    OnConflict,
    /// `INSERT ... ON DUPLICATE KEY UPDATE ...`
    OnDuplicateKey,
}

impl Dialect {
    /// Resolve a dialect from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "sqlite" => Some(Dialect::Sqlite),
            "mysql" => Some(Dialect::Mysql),
            "generic" => Some(Dialect::Generic),
            _ => None,
        }
    }

    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql | Dialect::Generic => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are escaped by doubling:
    /// - Postgres/SQLite/Generic: `"` becomes `""`
    /// - MySQL: `` ` `` becomes ``` `` ```
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite | Dialect::Generic => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// The native upsert idiom, if the dialect has one.
    ///
    /// `None` means callers must fall back to a transactional
    /// select-then-insert-or-update sequence.
    pub const fn upsert_style(self) -> Option<UpsertStyle> {
        match self {
            Dialect::Postgres | Dialect::Sqlite => Some(UpsertStyle::OnConflict),
            Dialect::Mysql => Some(UpsertStyle::OnDuplicateKey),
            Dialect::Generic => None,
        }
    }

    /// Whether the dialect supports OFFSET at all.
    pub const fn supports_offset(self) -> bool {
        !matches!(self, Dialect::Generic)
    }

    /// Whether OFFSET may appear without an accompanying LIMIT.
    ///
    /// MySQL requires a LIMIT; SQLite gets `LIMIT -1` emitted for it.
    pub const fn supports_offset_without_limit(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Whether the dialect natively returns inserted rows (RETURNING clause).
    pub const fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
        assert_eq!(Dialect::Generic.placeholder(4), "?");
    }

    #[test]
    fn identifier_quoting_escapes_embedded_quotes() {
        assert_eq!(Dialect::Postgres.quote_identifier("name"), "\"name\"");
        assert_eq!(
            Dialect::Postgres.quote_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
        assert_eq!(Dialect::Mysql.quote_identifier("name"), "`name`");
        assert_eq!(Dialect::Mysql.quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn from_name_round_trip() {
        assert_eq!(Dialect::from_name("postgres"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_name("postgresql"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_name("sqlite"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_name("mysql"), Some(Dialect::Mysql));
        assert_eq!(Dialect::from_name("generic"), Some(Dialect::Generic));
        assert_eq!(Dialect::from_name("oracle"), None);
    }

    #[test]
    fn upsert_and_offset_capabilities() {
        assert_eq!(Dialect::Postgres.upsert_style(), Some(UpsertStyle::OnConflict));
        assert_eq!(Dialect::Mysql.upsert_style(), Some(UpsertStyle::OnDuplicateKey));
        assert_eq!(Dialect::Generic.upsert_style(), None);
        assert!(!Dialect::Generic.supports_offset());
        assert!(!Dialect::Mysql.supports_offset_without_limit());
        assert!(Dialect::Sqlite.supports_offset_without_limit());
    }
}
