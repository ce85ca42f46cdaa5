//! Statement compiler.
//!
//! Turns a [`QueryDefinition`] into dialect-specific SQL text plus an
//! ordered parameter list. Compilation is a pure function of the definition
//! and the dialect: the same inputs always produce byte-identical output,
//! including join alias assignment and parameter numbering.

use crate::clause::Join;
use crate::dialect::{Dialect, UpsertStyle};
use crate::expr::{BinaryOp, Expr, InSet};
use crate::query::{QueryDefinition, QueryKind};
use quarry_core::{Error, Result, Value};

/// The output of compiling one query definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    /// SQL text with dialect-specific placeholders
    pub sql: String,
    /// Parameter values, ordered to match the placeholders
    pub params: Vec<Value>,
    /// Generated columns the backend must report after execution
    pub returning: Vec<String>,
}

/// Compile a query definition for a target dialect.
///
/// Fails with [`Error::Unsupported`] when the dialect cannot express the
/// requested statement (OFFSET on Generic, OFFSET without LIMIT on MySQL,
/// UPSERT on Generic).
#[tracing::instrument(level = "trace", skip(def), fields(kind = ?def.kind, table = %def.table))]
pub fn compile(def: &QueryDefinition, dialect: Dialect) -> Result<CompiledStatement> {
    let mut c = Compiler {
        dialect,
        params: Vec::new(),
    };
    let sql = match def.kind {
        QueryKind::Select => c.select(def)?,
        QueryKind::Insert => c.insert(def),
        QueryKind::Update => c.update(def)?,
        QueryKind::Delete => c.delete(def)?,
        QueryKind::Upsert => c.upsert(def)?,
    };
    Ok(CompiledStatement {
        sql,
        params: c.params,
        returning: def.returning.clone(),
    })
}

struct Compiler {
    dialect: Dialect,
    params: Vec<Value>,
}

impl Compiler {
    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn push_param(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    /// Assign deterministic aliases for repeated table names.
    ///
    /// The base table and each join are visited in declaration order; the
    /// nth occurrence of a name gets the alias `name_n` (first occurrence
    /// keeps the bare name).
    fn join_aliases(&self, def: &QueryDefinition) -> Vec<Option<String>> {
        let mut seen: Vec<&str> = vec![&def.table];
        def.joins
            .iter()
            .map(|j| {
                let occurrence = seen.iter().filter(|t| **t == j.table).count() + 1;
                seen.push(&j.table);
                if occurrence > 1 {
                    Some(format!("{}_{}", j.table, occurrence))
                } else {
                    None
                }
            })
            .collect()
    }

    fn select(&mut self, def: &QueryDefinition) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if def.distinct {
            sql.push_str("DISTINCT ");
        }
        if def.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = def
                .columns
                .iter()
                .map(|e| self.render(e))
                .collect::<Result<_>>()?;
            sql.push_str(&cols.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.quote(&def.table));

        let aliases = self.join_aliases(def);
        for (join, alias) in def.joins.iter().zip(&aliases) {
            sql.push(' ');
            sql.push_str(&self.render_join(join, alias.as_deref())?);
        }

        if let Some(filter) = &def.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render(filter)?);
        }

        if !def.group_by.is_empty() {
            let groups: Vec<String> = def
                .group_by
                .iter()
                .map(|e| self.render(e))
                .collect::<Result<_>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if let Some(having) = &def.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.render(having)?);
        }

        if !def.order_by.is_empty() {
            let orders: Vec<String> = def
                .order_by
                .iter()
                .map(|o| Ok(format!("{} {}", self.render(&o.expr)?, o.direction.as_str())))
                .collect::<Result<_>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        sql.push_str(&self.paging(def)?);
        Ok(sql)
    }

    fn paging(&self, def: &QueryDefinition) -> Result<String> {
        let mut sql = String::new();
        if let Some(limit) = def.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = def.offset {
            if !self.dialect.supports_offset() {
                return Err(Error::Unsupported(format!(
                    "{:?} dialect cannot express OFFSET",
                    self.dialect
                )));
            }
            if def.limit.is_none() && !self.dialect.supports_offset_without_limit() {
                return Err(Error::Unsupported(
                    "MySQL requires LIMIT when OFFSET is used".to_string(),
                ));
            }
            if def.limit.is_none() && self.dialect == Dialect::Sqlite {
                // SQLite has no bare OFFSET; LIMIT -1 means unbounded.
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok(sql)
    }

    fn insert(&mut self, def: &QueryDefinition) -> String {
        let (columns, placeholders) = self.assignment_lists(def);
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(&def.table),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn update(&mut self, def: &QueryDefinition) -> Result<String> {
        let mut sql = format!("UPDATE {} SET ", self.quote(&def.table));
        let sets: Vec<String> = def
            .assignments
            .iter()
            .map(|(col, value)| {
                let quoted = self.quote(col);
                let placeholder = self.push_param(value.clone());
                format!("{quoted} = {placeholder}")
            })
            .collect();
        sql.push_str(&sets.join(", "));
        if let Some(filter) = &def.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render(filter)?);
        }
        Ok(sql)
    }

    fn delete(&mut self, def: &QueryDefinition) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", self.quote(&def.table));
        if let Some(filter) = &def.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render(filter)?);
        }
        Ok(sql)
    }

    fn upsert(&mut self, def: &QueryDefinition) -> Result<String> {
        let style = self.dialect.upsert_style().ok_or_else(|| {
            Error::Unsupported(format!(
                "{:?} dialect has no native upsert",
                self.dialect
            ))
        })?;
        let insert = self.insert(def);
        let non_key: Vec<&str> = def
            .assignments
            .iter()
            .map(|(col, _)| col.as_str())
            .filter(|col| !def.conflict_columns.iter().any(|k| k == col))
            .collect();

        Ok(match style {
            UpsertStyle::OnConflict => {
                let keys: Vec<String> =
                    def.conflict_columns.iter().map(|k| self.quote(k)).collect();
                if non_key.is_empty() {
                    format!("{insert} ON CONFLICT ({}) DO NOTHING", keys.join(", "))
                } else {
                    let sets: Vec<String> = non_key
                        .iter()
                        .map(|col| {
                            let quoted = self.quote(col);
                            format!("{quoted} = excluded.{quoted}")
                        })
                        .collect();
                    format!(
                        "{insert} ON CONFLICT ({}) DO UPDATE SET {}",
                        keys.join(", "),
                        sets.join(", ")
                    )
                }
            }
            UpsertStyle::OnDuplicateKey => {
                // MySQL keys on any unique index; the update list mirrors
                // the insert so a conflicting row converges to it.
                let targets = if non_key.is_empty() {
                    def.conflict_columns
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                } else {
                    non_key
                };
                let sets: Vec<String> = targets
                    .iter()
                    .map(|col| {
                        let quoted = self.quote(col);
                        format!("{quoted} = VALUES({quoted})")
                    })
                    .collect();
                format!("{insert} ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        })
    }

    fn assignment_lists(&mut self, def: &QueryDefinition) -> (Vec<String>, Vec<String>) {
        let mut columns = Vec::with_capacity(def.assignments.len());
        let mut placeholders = Vec::with_capacity(def.assignments.len());
        for (col, value) in &def.assignments {
            columns.push(self.quote(col));
            placeholders.push(self.push_param(value.clone()));
        }
        (columns, placeholders)
    }

    fn render_join(&mut self, join: &Join, alias: Option<&str>) -> Result<String> {
        let table = self.quote(&join.table);
        let target = match alias {
            Some(a) => format!("{table} AS {}", self.quote(a)),
            None => table,
        };
        Ok(format!(
            "{} {} ON {}",
            join.join_type.as_str(),
            target,
            self.render(&join.on)?
        ))
    }

    fn render(&mut self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", self.quote(t), self.quote(name)),
                None => self.quote(name),
            },

            Expr::Literal(value) => self.push_param(value.clone()),

            Expr::Binary { left, op, right } => {
                let left_sql = self.render(left)?;
                let right_sql = self.render(right)?;
                let rendered = format!("{left_sql} {} {right_sql}", op.as_str());
                // Parenthesize OR so AND-chains around it keep their meaning.
                if *op == BinaryOp::Or {
                    format!("({rendered})")
                } else {
                    rendered
                }
            }

            Expr::Unary { op, expr } => match op {
                crate::expr::UnaryOp::Not => {
                    let rendered = self.render(expr)?;
                    // NOT binds tighter than AND; group the chain so the
                    // negation covers all of it. OR already parenthesizes.
                    if matches!(
                        **expr,
                        Expr::Binary {
                            op: BinaryOp::And,
                            ..
                        }
                    ) {
                        format!("NOT ({rendered})")
                    } else {
                        format!("NOT {rendered}")
                    }
                }
                crate::expr::UnaryOp::Neg => format!("-{}", self.render(expr)?),
            },

            Expr::Function { name, args } => {
                let arg_sqls: Vec<String> =
                    args.iter().map(|a| self.render(a)).collect::<Result<_>>()?;
                format!("{name}({})", arg_sqls.join(", "))
            }

            Expr::In {
                expr,
                set,
                negated,
            } => {
                let expr_sql = self.render(expr)?;
                let not_str = if *negated { "NOT " } else { "" };
                match set {
                    InSet::List(values) => {
                        let value_sqls: Vec<String> = values
                            .iter()
                            .map(|v| self.render(v))
                            .collect::<Result<_>>()?;
                        format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
                    }
                    InSet::Query(subquery) => {
                        if subquery.kind != QueryKind::Select {
                            return Err(Error::Validation(
                                quarry_core::ValidationError::invalid_query(
                                    "IN subquery must be a SELECT",
                                ),
                            ));
                        }
                        let sub_sql = self.select(subquery)?;
                        format!("{expr_sql} {not_str}IN ({sub_sql})")
                    }
                }
            }

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let expr_sql = self.render(expr)?;
                let low_sql = self.render(low)?;
                let high_sql = self.render(high)?;
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}BETWEEN {low_sql} AND {high_sql}")
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = self.render(expr)?;
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr_sql = self.render(expr)?;
                let placeholder = self.push_param(Value::Text(pattern.clone()));
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}LIKE {placeholder}")
            }

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::Raw(sql) => sql.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{Join, OrderBy};
    use crate::query::Query;

    #[test]
    fn select_with_filter_postgres() {
        let def = Query::select("person")
            .columns(&["id", "name"])
            .filter(Expr::col("age").gt(21))
            .order_by(OrderBy::asc("name"))
            .limit(10)
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"person\" WHERE \"age\" > $1 ORDER BY \"name\" ASC LIMIT 10"
        );
        assert_eq!(stmt.params, vec![Value::Int(21)]);
    }

    #[test]
    fn compile_is_deterministic() {
        let def = Query::select("person")
            .filter(Expr::col("age").gt(21).and(Expr::col("name").like("A%")))
            .build()
            .unwrap();
        let first = compile(&def, Dialect::Sqlite).unwrap();
        let second = compile(&def, Dialect::Sqlite).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn placeholders_follow_dialect() {
        let def = Query::select("person")
            .filter(Expr::col("age").gt(21).and(Expr::col("name").eq("Ann")))
            .build()
            .unwrap();
        let pg = compile(&def, Dialect::Postgres).unwrap();
        assert!(pg.sql.contains("$1") && pg.sql.contains("$2"));
        let sqlite = compile(&def, Dialect::Sqlite).unwrap();
        assert!(sqlite.sql.contains("?1") && sqlite.sql.contains("?2"));
        let mysql = compile(&def, Dialect::Mysql).unwrap();
        assert_eq!(mysql.sql.matches('?').count(), 2);
    }

    #[test]
    fn insert_excluding_generated_key() {
        let def = Query::insert("person")
            .set("name", "Ann")
            .set("age", 30)
            .returning(&["id"])
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"person\" (\"name\", \"age\") VALUES ($1, $2)"
        );
        assert_eq!(stmt.returning, vec!["id".to_string()]);
        assert_eq!(
            stmt.params,
            vec![Value::Text("Ann".to_string()), Value::Int(30)]
        );
    }

    #[test]
    fn update_with_filter() {
        let def = Query::update("person")
            .set("name", "Bea")
            .filter(Expr::col("id").eq(7_i64))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"person\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(
            stmt.params,
            vec![Value::Text("Bea".to_string()), Value::BigInt(7)]
        );
    }

    #[test]
    fn delete_with_filter() {
        let def = Query::delete("person")
            .filter(Expr::col("id").eq(7_i64))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Mysql).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `person` WHERE `id` = ?");
    }

    #[test]
    fn upsert_on_conflict_postgres() {
        let def = Query::upsert("person")
            .set("id", 1_i64)
            .set("name", "Ann")
            .on_conflict(&["id"])
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"person\" (\"id\", \"name\") VALUES ($1, $2) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\""
        );
    }

    #[test]
    fn upsert_on_duplicate_key_mysql() {
        let def = Query::upsert("person")
            .set("id", 1_i64)
            .set("name", "Ann")
            .on_conflict(&["id"])
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Mysql).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `person` (`id`, `name`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
    }

    #[test]
    fn upsert_all_key_columns_does_nothing() {
        let def = Query::upsert("person_group")
            .set("person_id", 1_i64)
            .set("group_id", 2_i64)
            .on_conflict(&["person_id", "group_id"])
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Sqlite).unwrap();
        assert!(stmt.sql.ends_with("ON CONFLICT (\"person_id\", \"group_id\") DO NOTHING"));
    }

    #[test]
    fn upsert_unsupported_on_generic() {
        let def = Query::upsert("person")
            .set("id", 1_i64)
            .set("name", "Ann")
            .on_conflict(&["id"])
            .build()
            .unwrap();
        assert!(matches!(
            compile(&def, Dialect::Generic),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn offset_rules_per_dialect() {
        let def = Query::select("person").offset(5).build().unwrap();

        let pg = compile(&def, Dialect::Postgres).unwrap();
        assert!(pg.sql.ends_with("OFFSET 5"));

        let sqlite = compile(&def, Dialect::Sqlite).unwrap();
        assert!(sqlite.sql.ends_with("LIMIT -1 OFFSET 5"));

        assert!(matches!(
            compile(&def, Dialect::Mysql),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            compile(&def, Dialect::Generic),
            Err(Error::Unsupported(_))
        ));

        let with_limit = Query::select("person").limit(10).offset(5).build().unwrap();
        let mysql = compile(&with_limit, Dialect::Mysql).unwrap();
        assert!(mysql.sql.ends_with("LIMIT 10 OFFSET 5"));
    }

    #[test]
    fn self_join_gets_deterministic_alias() {
        let def = Query::select("person")
            .column(Expr::qualified("person", "name"))
            .column(Expr::qualified("person_2", "name"))
            .join(Join::inner(
                "person",
                Expr::qualified("person", "manager_id").eq(Expr::qualified("person_2", "id")),
            ))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"person\".\"name\", \"person_2\".\"name\" FROM \"person\" \
             INNER JOIN \"person\" AS \"person_2\" \
             ON \"person\".\"manager_id\" = \"person_2\".\"id\""
        );

        // Re-compiling produces the same alias assignment.
        assert_eq!(compile(&def, Dialect::Postgres).unwrap().sql, stmt.sql);
    }

    #[test]
    fn join_flattening_junction_table() {
        let def = Query::select("person")
            .columns(&["id", "name"])
            .join(Join::inner(
                "person_group",
                Expr::qualified("person_group", "person_id").eq(Expr::qualified("person", "id")),
            ))
            .filter(Expr::qualified("person_group", "group_id").eq(3_i64))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\" FROM \"person\" \
             INNER JOIN \"person_group\" \
             ON \"person_group\".\"person_id\" = \"person\".\"id\" \
             WHERE \"person_group\".\"group_id\" = $1"
        );
    }

    #[test]
    fn in_subquery_shares_parameter_numbering() {
        let sub = Query::select("phone")
            .column(Expr::col("owner_id"))
            .filter(Expr::col("number").like("555%"))
            .build()
            .unwrap();
        let def = Query::select("person")
            .filter(Expr::col("age").gt(21))
            .filter(Expr::col("id").in_subquery(sub))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"person\" WHERE \"age\" > $1 AND \"id\" IN \
             (SELECT \"owner_id\" FROM \"phone\" WHERE \"number\" LIKE $2)"
        );
        assert_eq!(
            stmt.params,
            vec![Value::Int(21), Value::Text("555%".to_string())]
        );
    }

    #[test]
    fn not_over_a_chain_keeps_grouping() {
        let def = Query::select("person")
            .filter(
                Expr::col("age")
                    .gt(21)
                    .and(Expr::col("active").eq(true))
                    .not(),
            )
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"person\" WHERE NOT (\"age\" > $1 AND \"active\" = $2)"
        );

        let def = Query::select("person")
            .filter(
                Expr::col("age")
                    .lt(18)
                    .or(Expr::col("age").gt(65))
                    .not(),
            )
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"person\" WHERE NOT (\"age\" < $1 OR \"age\" > $2)"
        );

        // A simple comparison stays bare.
        let def = Query::select("person")
            .filter(Expr::col("active").eq(true).not())
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"person\" WHERE NOT \"active\" = $1");
    }

    #[test]
    fn or_expressions_are_parenthesized() {
        let def = Query::select("person")
            .filter(
                Expr::col("age").lt(18).or(Expr::col("age").gt(65)),
            )
            .filter(Expr::col("active").eq(true))
            .build()
            .unwrap();
        let stmt = compile(&def, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"person\" WHERE (\"age\" < $1 OR \"age\" > $2) AND \"active\" = $3"
        );
    }
}
