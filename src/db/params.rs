//! Parameter binding utilities for database queries.
//!
//! Named binds (`:name`) are rewritten to the backend's positional
//! placeholders before the values are bound to the `sqlx` query.

use crate::db::driver::DriverError;
use crate::models::{Params, QueryParam};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::borrow::Cow;
use std::collections::HashMap;

/// Positional placeholder syntax of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1, $2, ...` (PostgreSQL), repeated names reuse their index
    Dollar,
    /// `?` (MySQL, SQLite), repeated names bind the value again
    Question,
}

/// SQL text and values ready for positional binding.
#[derive(Debug, PartialEq)]
pub struct PreparedSql<'a> {
    pub sql: Cow<'a, str>,
    pub values: Vec<QueryParam>,
}

/// Resolve `params` against `sql` for the given placeholder style.
pub fn prepare<'a>(
    sql: &'a str,
    params: &Params,
    style: Placeholder,
) -> Result<PreparedSql<'a>, DriverError> {
    match params {
        Params::Positional(values) => Ok(PreparedSql {
            sql: Cow::Borrowed(sql),
            values: values.clone(),
        }),
        Params::Named(named) => rewrite_named(sql, |name| named.get(name), style),
    }
}

fn rewrite_named<'a, 'p>(
    sql: &'a str,
    lookup: impl Fn(&str) -> Option<&'p QueryParam>,
    style: Placeholder,
) -> Result<PreparedSql<'a>, DriverError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut indexes: HashMap<&str, usize> = HashMap::new();
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        match bytes[i] {
            // Quoted literals and identifiers
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        // Doubled quote is an escape
                        if i + 1 < bytes.len() && bytes[i + 1] == quote {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            // PostgreSQL cast
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let name = &sql[start..end];
                let value = lookup(name).ok_or_else(|| {
                    DriverError::sql(format!("no value supplied for bind parameter :{}", name))
                })?;

                out.push_str(&sql[copied..i]);
                match style {
                    Placeholder::Question => {
                        values.push(value.clone());
                        out.push('?');
                    }
                    Placeholder::Dollar => {
                        let index = *indexes.entry(name).or_insert_with(|| {
                            values.push(value.clone());
                            values.len()
                        });
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                }
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }

    if copied == 0 && values.is_empty() {
        return Ok(PreparedSql {
            sql: Cow::Borrowed(sql),
            values,
        });
    }
    out.push_str(&sql[copied.min(sql.len())..]);
    Ok(PreparedSql {
        sql: Cow::Owned(out),
        values,
    })
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, QueryParam)]) -> Params {
        Params::named(pairs.iter().cloned())
    }

    #[test]
    fn test_positional_passes_through() {
        let params = Params::Positional(vec![QueryParam::Int(1)]);
        let prepared = prepare("SELECT * FROM t WHERE id = ?", &params, Placeholder::Question)
            .unwrap();
        assert!(matches!(prepared.sql, Cow::Borrowed(_)));
        assert_eq!(prepared.values, vec![QueryParam::Int(1)]);
    }

    #[test]
    fn test_named_to_question_marks() {
        let params = named(&[
            ("id", QueryParam::Int(7)),
            ("name", QueryParam::from("bob")),
        ]);
        let prepared = prepare(
            "UPDATE users SET name = :name WHERE id = :id OR parent = :id",
            &params,
            Placeholder::Question,
        )
        .unwrap();
        assert_eq!(
            prepared.sql,
            "UPDATE users SET name = ? WHERE id = ? OR parent = ?"
        );
        assert_eq!(
            prepared.values,
            vec![
                QueryParam::from("bob"),
                QueryParam::Int(7),
                QueryParam::Int(7)
            ]
        );
    }

    #[test]
    fn test_named_to_dollar_reuses_index() {
        let params = named(&[("id", QueryParam::Int(7))]);
        let prepared = prepare(
            "SELECT * FROM t WHERE id = :id OR parent = :id",
            &params,
            Placeholder::Dollar,
        )
        .unwrap();
        assert_eq!(prepared.sql, "SELECT * FROM t WHERE id = $1 OR parent = $1");
        assert_eq!(prepared.values, vec![QueryParam::Int(7)]);
    }

    #[test]
    fn test_literals_comments_and_casts_are_skipped() {
        let params = named(&[("id", QueryParam::Int(1))]);
        let sql = "SELECT ':id', \"a:b\", created::date -- :nope\n FROM t /* :x */ WHERE id = :id";
        let prepared = prepare(sql, &params, Placeholder::Dollar).unwrap();
        assert_eq!(
            prepared.sql,
            "SELECT ':id', \"a:b\", created::date -- :nope\n FROM t /* :x */ WHERE id = $1"
        );
    }

    #[test]
    fn test_escaped_quote_inside_literal() {
        let params = named(&[("v", QueryParam::Int(1))]);
        let prepared =
            prepare("SELECT 'it''s :v' WHERE x = :v", &params, Placeholder::Question).unwrap();
        assert_eq!(prepared.sql, "SELECT 'it''s :v' WHERE x = ?");
        assert_eq!(prepared.values.len(), 1);
    }

    #[test]
    fn test_missing_named_value_is_error() {
        let params = named(&[("id", QueryParam::Int(1))]);
        let err = prepare("SELECT :other", &params, Placeholder::Question).unwrap_err();
        assert!(err.to_string().contains(":other"));
    }
}
