use sqlx::SqlitePool;
use thiserror::Error;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_init_schema",
    include_str!("../../sql/001_init_schema.sql"),
)];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    for &(name, sql) in MIGRATIONS {
        if applied.iter().any(|a| a.as_str() == name) {
            continue;
        }

        tracing::info!(migration = %name, "applying migration");
        let mut tx = pool.begin().await?;
        for statement in split_sql_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Statement {
                    migration: name,
                    source,
                })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Splits a migration script into executable statements: `--` comment lines
/// are dropped and `;` only terminates a statement outside quotes.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for line in sql.lines() {
        if quote.is_none() && line.trim_start().starts_with("--") {
            continue;
        }
        for ch in line.chars() {
            match (quote, ch) {
                (None, '\'' | '"') => quote = Some(ch),
                (Some(open), c) if c == open => quote = None,
                (None, ';') => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {migration} failed: {source}")]
    Statement {
        migration: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_skips_comments_and_blank_statements() {
        let sql = "-- header; with semicolon\nCREATE TABLE a (x TEXT);\n\n;\nCREATE TABLE b (y TEXT)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[1].starts_with("CREATE TABLE b"));
    }

    #[test]
    fn test_split_respects_quoted_semicolons() {
        let sql = "INSERT INTO t VALUES ('a;b');INSERT INTO \"x;y\" VALUES (1);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn test_schema_splits_into_statements() {
        let statements = split_sql_statements(MIGRATIONS[0].1);
        assert!(statements.len() >= 8);
        assert!(statements.iter().all(|s| !s.contains("--")));
    }
}
