use std::fmt;

use sqlx::{sqlite::SqliteRow, Column, Row, TypeInfo, ValueRef};

use super::Store;
use crate::error::StoreError;

/// Rows returned by an operator query, with every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Set for statements that do not return rows.
    pub rows_affected: Option<u64>,
}

/// `sql` without leading whitespace and `--` / `/* */` comments.
fn skip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return sql;
        }
    }
}

fn returns_rows(sql: &str) -> bool {
    let body = skip_leading_comments(sql);
    let head = body
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if matches!(head.as_str(), "select" | "with" | "pragma" | "explain" | "values") {
        return true;
    }
    // INSERT / UPDATE / DELETE ... RETURNING
    body.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("returning"))
}

fn cell_text(row: &SqliteRow, idx: usize) -> Result<String, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok("NULL".to_string());
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let text = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).map(|v| v.to_string()),
        "REAL" => row.try_get::<f64, _>(idx).map(|v| v.to_string()),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|v| format!("<{} bytes>", v.len())),
        _ => row.try_get::<String, _>(idx),
    };

    // Expression columns can carry a declared type that disagrees with the
    // stored value; fall back through the storage classes.
    text.or_else(|_| row.try_get::<String, _>(idx))
        .or_else(|_| row.try_get::<i64, _>(idx).map(|v| v.to_string()))
        .or_else(|_| row.try_get::<f64, _>(idx).map(|v| v.to_string()))
}

impl Store {
    /// Run an ad hoc SQL statement.
    pub async fn run_sql(&self, sql: &str) -> Result<QueryResult, StoreError> {
        // Row-returning statements can still write (RETURNING, WITH ... INSERT).
        let _guard = self.write_guard().await;
        if !returns_rows(sql) {
            let done = sqlx::query(sql).execute(&self.pool).await?;
            return Ok(QueryResult {
                rows_affected: Some(done.rows_affected()),
                ..QueryResult::default()
            });
        }

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = (0..row.len())
                .map(|idx| cell_text(row, idx))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(cells);
        }

        Ok(QueryResult {
            columns,
            rows: out,
            rows_affected: None,
        })
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.rows_affected {
            return writeln!(f, "statement executed, {n} row(s) affected");
        }
        if self.rows.is_empty() {
            return writeln!(f, "(0 rows)");
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let write_line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let line: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect();
            writeln!(f, "{}", line.join(" | ").trim_end())
        };

        write_line(f, &self.columns)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;
        for row in &self.rows {
            write_line(f, row)?;
        }
        writeln!(f, "({} rows)", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewUtilityProvider;

    #[test]
    fn detects_row_returning_statements() {
        assert!(returns_rows("  SELECT * FROM cities"));
        assert!(returns_rows("with x as (select 1) select * from x"));
        assert!(returns_rows("PRAGMA table_info(cities)"));
        assert!(!returns_rows("DELETE FROM photos"));
    }

    #[test]
    fn leading_comments_do_not_hide_the_statement() {
        assert!(returns_rows("-- latest readings\nSELECT * FROM measurements"));
        assert!(returns_rows("/* report */ /* v2 */\n  select 1"));
        assert!(!returns_rows("-- cleanup\nDELETE FROM photos"));
        assert_eq!(skip_leading_comments("-- only a comment"), "");
    }

    #[test]
    fn returning_clause_returns_rows() {
        assert!(returns_rows("INSERT INTO utility_providers (company_name) VALUES ('X') RETURNING provider_id"));
        assert!(returns_rows("delete from photos returning photo_id"));
    }

    #[tokio::test]
    async fn run_sql_renders_cells_as_text() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        store
            .upsert_provider(&NewUtilityProvider {
                company_name: "Bangor Gas".to_string(),
                mailing_address: None,
                phone_number: Some("207-555-0100".to_string()),
                region: None,
            })
            .await
            .unwrap();

        let result = store
            .run_sql("SELECT provider_id, company_name, mailing_address FROM utility_providers")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["provider_id", "company_name", "mailing_address"]);
        assert_eq!(result.rows, vec![vec!["1", "Bangor Gas", "NULL"]]);
        let rendered = result.to_string();
        assert!(rendered.contains("Bangor Gas"));
        assert!(rendered.ends_with("(1 rows)\n"));
    }

    #[tokio::test]
    async fn run_sql_reports_rows_affected_for_writes() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        let result = store
            .run_sql("INSERT INTO utility_providers (company_name) VALUES ('X Gas')")
            .await
            .unwrap();
        assert_eq!(result.rows_affected, Some(1));
    }

    #[tokio::test]
    async fn run_sql_keeps_rows_behind_comments_and_returning() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();

        let inserted = store
            .run_sql("INSERT INTO utility_providers (company_name) VALUES ('X Gas') RETURNING company_name")
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected, None);
        assert_eq!(inserted.rows, vec![vec!["X Gas"]]);

        let selected = store
            .run_sql("-- operator check\n/* all providers */ SELECT company_name FROM utility_providers")
            .await
            .unwrap();
        assert_eq!(selected.columns, vec!["company_name"]);
        assert_eq!(selected.rows, vec![vec!["X Gas"]]);
    }

    #[tokio::test]
    async fn run_sql_surfaces_syntax_errors() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.run_sql("SELEC nonsense").await.is_err());
    }
}
