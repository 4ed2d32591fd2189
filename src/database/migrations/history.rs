//! The schema history table: one row per applied script plus an optional
//! baseline row.

use super::script::MigrationScript;
use super::version::MigrationVersion;
use super::{MigrationError, MigrationResult};
use crate::database::is_plain_identifier;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

/// Kind of history row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    Sql,
    Baseline,
}

impl MigrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationKind::Sql => "SQL",
            MigrationKind::Baseline => "BASELINE",
        }
    }

    fn parse(raw: &str) -> MigrationResult<Self> {
        match raw {
            "SQL" => Ok(MigrationKind::Sql),
            "BASELINE" => Ok(MigrationKind::Baseline),
            other => Err(MigrationError::Database(format!(
                "unknown migration type '{other}' in schema history"
            ))),
        }
    }
}

/// A row of the history table
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub installed_rank: i32,
    pub version: MigrationVersion,
    pub description: String,
    pub kind: MigrationKind,
    pub script: String,
    pub checksum: Option<String>,
    pub installed_by: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time_ms: i32,
}

/// Accessor for the history table in the connection's current schema
#[derive(Debug, Clone)]
pub struct SchemaHistory {
    table: String,
}

impl SchemaHistory {
    /// The table name is interpolated into SQL, so only plain lowercase
    /// identifiers are accepted.
    pub fn new(table: impl Into<String>) -> MigrationResult<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(MigrationError::InvalidConfiguration {
                field: "migrations.table".to_string(),
                reason: format!("'{table}' is not a valid lowercase SQL identifier"),
            });
        }

        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn exists<'a>(&'a self, conn: &'a mut PgConnection) -> BoxFuture<'a, MigrationResult<bool>> {
        Box::pin(async move {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
            )
            .bind(self.table.as_str())
            .fetch_one(&mut *conn)
            .await?;
            Ok(exists)
        })
    }

    /// Whether the current schema holds tables other than the history table
    pub fn schema_has_other_tables<'a>(
        &'a self,
        conn: &'a mut PgConnection,
    ) -> BoxFuture<'a, MigrationResult<bool>> {
        Box::pin(async move {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name <> $1",
            )
            .bind(self.table.as_str())
            .fetch_one(&mut *conn)
            .await?;
            Ok(count > 0)
        })
    }

    pub fn create<'a>(&'a self, conn: &'a mut PgConnection) -> BoxFuture<'a, MigrationResult<()>> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                installed_rank INTEGER PRIMARY KEY,
                version VARCHAR(50) NOT NULL,
                description VARCHAR(200) NOT NULL,
                type VARCHAR(20) NOT NULL,
                script VARCHAR(1000) NOT NULL,
                checksum VARCHAR(64),
                installed_by VARCHAR(100) NOT NULL DEFAULT current_user,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT now(),
                execution_time INTEGER NOT NULL
            )
            "#,
            table = self.table
        );
        Box::pin(async move {
            sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&sql)).await?;
            Ok(())
        })
    }

    /// All rows ordered by installation rank
    pub fn applied<'a>(
        &'a self,
        conn: &'a mut PgConnection,
    ) -> BoxFuture<'a, MigrationResult<Vec<AppliedMigration>>> {
        let sql = format!(
            r#"SELECT installed_rank, version, description, type, script, checksum,
                      installed_by, installed_on, execution_time
               FROM "{}" ORDER BY installed_rank"#,
            self.table
        );
        Box::pin(async move {
            let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
            rows.iter().map(applied_from_row).collect()
        })
    }

    pub fn record_baseline<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        version: &MigrationVersion,
        description: &str,
    ) -> BoxFuture<'a, MigrationResult<()>> {
        self.insert(
            conn,
            HistoryRow {
                installed_rank: 1,
                version: version.to_string(),
                description: description.to_string(),
                kind: MigrationKind::Baseline,
                script: description.to_string(),
                checksum: None,
                execution_time_ms: 0,
            },
        )
    }

    pub fn record_applied<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        installed_rank: i32,
        script: &MigrationScript,
        execution_time_ms: i32,
    ) -> BoxFuture<'a, MigrationResult<()>> {
        self.insert(
            conn,
            HistoryRow {
                installed_rank,
                version: script.version.to_string(),
                description: script.description.clone(),
                kind: MigrationKind::Sql,
                script: script.script.clone(),
                checksum: Some(script.checksum.clone()),
                execution_time_ms,
            },
        )
    }

    fn insert<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        row: HistoryRow,
    ) -> BoxFuture<'a, MigrationResult<()>> {
        let sql = format!(
            r#"INSERT INTO "{}"
                   (installed_rank, version, description, type, script, checksum, execution_time)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            self.table
        );
        Box::pin(async move {
            sqlx::query(&sql)
                .bind(row.installed_rank)
                .bind(row.version)
                .bind(row.description)
                .bind(row.kind.as_str())
                .bind(row.script)
                .bind(row.checksum)
                .bind(row.execution_time_ms)
                .execute(&mut *conn)
                .await?;
            Ok(())
        })
    }
}

/// Owned values for one history insert
struct HistoryRow {
    installed_rank: i32,
    version: String,
    description: String,
    kind: MigrationKind,
    script: String,
    checksum: Option<String>,
    execution_time_ms: i32,
}

fn applied_from_row(row: &PgRow) -> MigrationResult<AppliedMigration> {
    let version: String = row.try_get("version")?;
    let kind: String = row.try_get("type")?;
    Ok(AppliedMigration {
        installed_rank: row.try_get("installed_rank")?,
        version: MigrationVersion::parse(&version)?,
        description: row.try_get("description")?,
        kind: MigrationKind::parse(&kind)?,
        script: row.try_get("script")?,
        checksum: row.try_get("checksum")?,
        installed_by: row.try_get("installed_by")?,
        installed_on: row.try_get("installed_on")?,
        execution_time_ms: row.try_get("execution_time")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert_eq!(SchemaHistory::new("schema_history").unwrap().table(), "schema_history");
        assert!(matches!(
            SchemaHistory::new("history; DROP TABLE x"),
            Err(MigrationError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [MigrationKind::Sql, MigrationKind::Baseline] {
            assert_eq!(MigrationKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(MigrationKind::parse("UNDO_SQL").is_err());
    }
}
