//! # Database Migration System
//!
//! Versioned SQL migrations applied once at startup, before the persistence unit
//! is built.
//!
//! ## Overview
//!
//! - Scripts named `V<version>__<description>.sql` are resolved from the configured
//!   location and ordered by version (see [`script`], [`version`]).
//! - Every applied script is recorded in a history table, in the same transaction
//!   as the script itself (see [`history`]).
//! - With `baseline_on_migrate`, a schema that already has tables but no history
//!   table gets a baseline row instead of failing. Scripts at or below the baseline
//!   version are never applied.
//! - Before anything runs, applied scripts are validated against the local ones:
//!   changed checksums, vanished scripts and out-of-order pending scripts abort the
//!   run.
//!
//! ## Concurrency Control
//!
//! A PostgreSQL session advisory lock is held on the migration connection for the
//! whole run, so instances starting together apply each script exactly once.
//!
//! ```sql
//! SELECT pg_advisory_lock(7234096150361532416)
//! ```

pub mod history;
pub mod script;
pub mod version;

use crate::config::{ConfigurationError, MigrationSettings};
use crate::database::ConnectionDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use history::{AppliedMigration, MigrationKind, SchemaHistory};
pub use script::MigrationScript;
pub use version::MigrationVersion;

const MIGRATION_LOCK_KEY: i64 = 7_234_096_150_361_532_416;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid migration version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid migration script name '{script}': {reason}")]
    InvalidScriptName { script: String, reason: String },

    #[error("Found more than one migration with version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("Failed to read migration scripts from '{path}': {error}")]
    ScriptRead { path: PathBuf, error: String },

    #[error("Invalid migration setting '{field}': {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Schema has tables but no '{table}' history table and baseline_on_migrate is disabled")]
    NonEmptySchemaWithoutHistory { table: String },

    #[error("Checksum mismatch for migration {version} ('{script}'): applied {applied}, resolved locally {resolved}")]
    ChecksumMismatch {
        version: String,
        script: String,
        applied: String,
        resolved: String,
    },

    #[error("Migration {version} ('{script}') was applied but is no longer present locally")]
    MissingScript { version: String, script: String },

    #[error("Migration {version} is pending but newer version {latest_applied} is already applied")]
    OutOfOrder {
        version: String,
        latest_applied: String,
    },

    #[error("Migration {version} ('{script}') failed: {error}")]
    ScriptFailed {
        version: String,
        script: String,
        error: String,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Migration database error: {0}")]
    Database(String),
}

impl MigrationError {
    pub fn invalid_version(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// A script applied during this run
#[derive(Debug, Clone)]
pub struct AppliedScript {
    pub version: MigrationVersion,
    pub description: String,
    pub script: String,
    pub execution_time: Duration,
}

/// Outcome of a migration run.
///
/// The persistence unit can only be built from one of these, which keeps
/// migration ahead of persistence in the startup order.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub applied: Vec<AppliedScript>,
    /// Version recorded as baseline during this run, if any
    pub baselined: Option<MigrationVersion>,
    /// Highest version present in the history table after the run
    pub schema_version: Option<MigrationVersion>,
    pub history_table: String,
}

impl MigrationReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// State of a migration as reported by [`ScriptMigrator::info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Baseline,
    Applied,
    Pending,
    /// Not applied and at or below the baseline, will never run
    BelowBaseline,
    /// Applied, newer than any local script
    Future,
    /// Applied, older than some local script, but gone locally
    Missing,
    /// Applied, but the local script has changed since
    Outdated,
}

#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub version: MigrationVersion,
    pub description: String,
    pub script: String,
    pub state: MigrationState,
    pub installed_on: Option<DateTime<Utc>>,
}

/// What a run will do, computed from local scripts and history rows
#[derive(Debug)]
pub struct MigrationPlan<'a> {
    pub baseline: Option<MigrationVersion>,
    pub latest_applied: Option<MigrationVersion>,
    pub pending: Vec<&'a MigrationScript>,
    pub future: Vec<&'a AppliedMigration>,
    pub next_rank: i32,
}

/// Validate history against local scripts and pick the pending ones.
pub fn plan<'a>(
    scripts: &'a [MigrationScript],
    applied: &'a [AppliedMigration],
) -> MigrationResult<MigrationPlan<'a>> {
    let local: HashMap<&MigrationVersion, &MigrationScript> =
        scripts.iter().map(|s| (&s.version, s)).collect();
    let max_local = scripts.iter().map(|s| &s.version).max();

    let baseline = applied
        .iter()
        .filter(|row| row.kind == MigrationKind::Baseline)
        .map(|row| row.version.clone())
        .max();

    let mut future = Vec::new();
    let mut applied_versions = HashMap::new();
    for row in applied.iter().filter(|row| row.kind == MigrationKind::Sql) {
        applied_versions.insert(&row.version, row);
        match local.get(&row.version) {
            Some(script) => {
                if let Some(applied_checksum) = &row.checksum {
                    if applied_checksum != &script.checksum {
                        return Err(MigrationError::ChecksumMismatch {
                            version: row.version.to_string(),
                            script: row.script.clone(),
                            applied: applied_checksum.clone(),
                            resolved: script.checksum.clone(),
                        });
                    }
                }
            }
            None if max_local.map_or(true, |max| &row.version > max) => future.push(row),
            None => {
                return Err(MigrationError::MissingScript {
                    version: row.version.to_string(),
                    script: row.script.clone(),
                })
            }
        }
    }

    let latest_applied = applied.iter().map(|row| row.version.clone()).max();
    let latest_sql = applied_versions.keys().copied().max();

    let mut pending = Vec::new();
    for script in scripts {
        if applied_versions.contains_key(&script.version) {
            continue;
        }
        if baseline.as_ref().is_some_and(|b| &script.version <= b) {
            continue;
        }
        if let Some(latest) = latest_sql {
            if &script.version < latest {
                return Err(MigrationError::OutOfOrder {
                    version: script.version.to_string(),
                    latest_applied: latest.to_string(),
                });
            }
        }
        pending.push(script);
    }

    let next_rank = applied.iter().map(|row| row.installed_rank).max().unwrap_or(0) + 1;

    Ok(MigrationPlan {
        baseline,
        latest_applied,
        pending,
        future,
        next_rank,
    })
}

/// Runs schema migration against a connection descriptor.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    async fn migrate(&self, connection: &ConnectionDescriptor) -> MigrationResult<MigrationReport>;
}

/// Applies `V<version>__<description>.sql` scripts from a directory.
#[derive(Debug, Clone)]
pub struct ScriptMigrator {
    location: PathBuf,
    baseline_on_migrate: bool,
    baseline_version: MigrationVersion,
    baseline_description: String,
    history: SchemaHistory,
}

impl ScriptMigrator {
    pub fn new(settings: &MigrationSettings) -> MigrationResult<Self> {
        let baseline_version =
            MigrationVersion::parse(&settings.baseline_version).map_err(|e| {
                MigrationError::InvalidConfiguration {
                    field: "migrations.baseline_version".to_string(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            location: settings.location.clone(),
            baseline_on_migrate: settings.baseline_on_migrate,
            baseline_version,
            baseline_description: settings.baseline_description.clone(),
            history: SchemaHistory::new(settings.table.clone())?,
        })
    }

    pub fn location(&self) -> &std::path::Path {
        &self.location
    }

    pub fn history(&self) -> &SchemaHistory {
        &self.history
    }

    /// Resolve local scripts without touching the database
    pub fn resolve_scripts(&self) -> MigrationResult<Vec<MigrationScript>> {
        script::discover(&self.location)
    }

    /// Migrate over an existing connection, holding the migration lock throughout
    pub fn migrate_connection<'a>(
        &'a self,
        conn: &'a mut PgConnection,
    ) -> BoxFuture<'a, MigrationResult<MigrationReport>> {
        Box::pin(async move {
            let scripts = self.resolve_scripts()?;

            debug!("Acquiring migration advisory lock");
            sqlx::query("SELECT pg_advisory_lock($1)")
                .bind(MIGRATION_LOCK_KEY)
                .execute(&mut *conn)
                .await?;

            let result = self.migrate_locked(&mut *conn, scripts).await;

            if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(MIGRATION_LOCK_KEY)
                .execute(&mut *conn)
                .await
            {
                warn!(error = %e, "Failed to release migration advisory lock");
            }

            result
        })
    }

    fn migrate_locked<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        scripts: Vec<MigrationScript>,
    ) -> BoxFuture<'a, MigrationResult<MigrationReport>> {
        Box::pin(async move {
            let mut baselined = None;

            if !self.history.exists(&mut *conn).await? {
                let has_tables = self.history.schema_has_other_tables(&mut *conn).await?;
                if has_tables && !self.baseline_on_migrate {
                    return Err(MigrationError::NonEmptySchemaWithoutHistory {
                        table: self.history.table().to_string(),
                    });
                }

                info!(table = %self.history.table(), "Creating schema history table");
                self.history.create(&mut *conn).await?;

                if has_tables {
                    self.history
                        .record_baseline(
                            &mut *conn,
                            &self.baseline_version,
                            &self.baseline_description,
                        )
                        .await?;
                    info!(
                        version = %self.baseline_version,
                        "Existing schema without history, recorded baseline"
                    );
                    baselined = Some(self.baseline_version.clone());
                }
            }

            let applied_rows = self.history.applied(&mut *conn).await?;
            let (pending, latest_applied, mut rank) = {
                let plan = plan(&scripts, &applied_rows)?;
                for row in &plan.future {
                    warn!(
                        version = %row.version,
                        script = %row.script,
                        "Applied migration is newer than every local script"
                    );
                }
                let pending: Vec<MigrationScript> = plan.pending.into_iter().cloned().collect();
                (pending, plan.latest_applied, plan.next_rank)
            };

            if pending.is_empty() {
                info!(
                    schema_version = ?latest_applied.as_ref().map(ToString::to_string),
                    "Schema is up to date, no migration necessary"
                );
            }

            let mut applied = Vec::with_capacity(pending.len());
            for script in pending {
                let execution_time = self.apply(&mut *conn, &script, rank).await?;
                info!(
                    version = %script.version,
                    description = %script.description,
                    execution_ms = execution_time.as_millis() as u64,
                    "Applied migration"
                );
                applied.push(AppliedScript {
                    version: script.version,
                    description: script.description,
                    script: script.script,
                    execution_time,
                });
                rank += 1;
            }

            let schema_version = applied
                .last()
                .map(|a| a.version.clone())
                .or(latest_applied);

            Ok(MigrationReport {
                applied,
                baselined,
                schema_version,
                history_table: self.history.table().to_string(),
            })
        })
    }

    /// Run one script and record it in a single transaction
    fn apply<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        script: &'a MigrationScript,
        rank: i32,
    ) -> BoxFuture<'a, MigrationResult<Duration>> {
        Box::pin(async move {
            let started = Instant::now();
            let mut tx = conn.begin().await?;

            if let Err(e) = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&script.sql)).await {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "Rollback after failed migration also failed");
                }
                return Err(MigrationError::ScriptFailed {
                    version: script.version.to_string(),
                    script: script.script.clone(),
                    error: e.to_string(),
                });
            }

            let execution_time = started.elapsed();
            let execution_ms = i32::try_from(execution_time.as_millis()).unwrap_or(i32::MAX);
            self.history
                .record_applied(&mut tx, rank, script, execution_ms)
                .await?;
            tx.commit().await?;

            Ok(execution_time)
        })
    }

    /// Report the state of every known migration without changing the database
    pub fn info<'a>(
        &'a self,
        conn: &'a mut PgConnection,
    ) -> BoxFuture<'a, MigrationResult<Vec<MigrationInfo>>> {
        Box::pin(async move {
            let scripts = self.resolve_scripts()?;
            let applied = if self.history.exists(&mut *conn).await? {
                self.history.applied(&mut *conn).await?
            } else {
                Vec::new()
            };
            Ok(describe(&scripts, &applied))
        })
    }
}

#[async_trait]
impl SchemaMigrator for ScriptMigrator {
    async fn migrate(&self, connection: &ConnectionDescriptor) -> MigrationResult<MigrationReport> {
        info!(
            url = %connection.display_url(),
            location = %self.location.display(),
            "Migrating schema"
        );

        let options = connection.connect_options()?;
        let mut conn = PgConnection::connect_with(&options).await?;
        let result = self.migrate_connection(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close migration connection");
        }

        result
    }
}

/// Per-migration state, ordered by version
pub fn describe(scripts: &[MigrationScript], applied: &[AppliedMigration]) -> Vec<MigrationInfo> {
    let baseline = applied
        .iter()
        .filter(|row| row.kind == MigrationKind::Baseline)
        .map(|row| row.version.clone())
        .max();
    let max_local = scripts.iter().map(|s| &s.version).max();

    let mut infos = Vec::new();
    let mut applied_sql = HashMap::new();

    for row in applied {
        if row.kind == MigrationKind::Sql {
            applied_sql.insert(&row.version, row);
        }
        let state = match row.kind {
            MigrationKind::Baseline => MigrationState::Baseline,
            MigrationKind::Sql => match scripts.iter().find(|s| s.version == row.version) {
                Some(script) if row.checksum.as_ref() != Some(&script.checksum) => {
                    MigrationState::Outdated
                }
                Some(_) => MigrationState::Applied,
                None if max_local.map_or(true, |max| &row.version > max) => MigrationState::Future,
                None => MigrationState::Missing,
            },
        };
        infos.push(MigrationInfo {
            version: row.version.clone(),
            description: row.description.clone(),
            script: row.script.clone(),
            state,
            installed_on: Some(row.installed_on),
        });
    }

    for script in scripts {
        if applied_sql.contains_key(&script.version) {
            continue;
        }
        let state = if baseline.as_ref().is_some_and(|b| &script.version <= b) {
            MigrationState::BelowBaseline
        } else {
            MigrationState::Pending
        };
        infos.push(MigrationInfo {
            version: script.version.clone(),
            description: script.description.clone(),
            script: script.script.clone(),
            state,
            installed_on: None,
        });
    }

    infos.sort_by(|a, b| a.version.cmp(&b.version));
    infos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(version: &str, sql: &str) -> MigrationScript {
        MigrationScript {
            version: MigrationVersion::parse(version).unwrap(),
            description: format!("step {version}"),
            script: format!("V{version}__step.sql"),
            path: PathBuf::from(format!("V{version}__step.sql")),
            checksum: script::checksum(sql),
            sql: sql.to_string(),
        }
    }

    fn applied(rank: i32, source: &MigrationScript) -> AppliedMigration {
        AppliedMigration {
            installed_rank: rank,
            version: source.version.clone(),
            description: source.description.clone(),
            kind: MigrationKind::Sql,
            script: source.script.clone(),
            checksum: Some(source.checksum.clone()),
            installed_by: "webapp".to_string(),
            installed_on: Utc::now(),
            execution_time_ms: 3,
        }
    }

    fn baseline(version: &str) -> AppliedMigration {
        AppliedMigration {
            installed_rank: 1,
            version: MigrationVersion::parse(version).unwrap(),
            description: "<< Baseline >>".to_string(),
            kind: MigrationKind::Baseline,
            script: "<< Baseline >>".to_string(),
            checksum: None,
            installed_by: "webapp".to_string(),
            installed_on: Utc::now(),
            execution_time_ms: 0,
        }
    }

    fn pending_versions(plan: &MigrationPlan<'_>) -> Vec<String> {
        plan.pending.iter().map(|s| s.version.to_string()).collect()
    }

    #[test]
    fn test_fresh_schema_plans_everything() {
        let scripts = vec![script("1", "a"), script("2", "b")];
        let plan = plan(&scripts, &[]).unwrap();
        assert_eq!(pending_versions(&plan), vec!["1", "2"]);
        assert_eq!(plan.next_rank, 1);
        assert!(plan.latest_applied.is_none());
    }

    #[test]
    fn test_second_run_plans_nothing() {
        let scripts = vec![script("1", "a"), script("2", "b")];
        let history = vec![applied(1, &scripts[0]), applied(2, &scripts[1])];
        let plan = plan(&scripts, &history).unwrap();
        assert!(plan.pending.is_empty());
        assert_eq!(plan.latest_applied.unwrap().to_string(), "2");
        assert_eq!(plan.next_rank, 3);
    }

    #[test]
    fn test_baseline_skips_versions_at_or_below() {
        let scripts = vec![script("1", "a"), script("1.1", "b"), script("2", "c")];
        let history = vec![baseline("1.1")];
        let plan = plan(&scripts, &history).unwrap();
        assert_eq!(pending_versions(&plan), vec!["2"]);
        assert_eq!(plan.baseline.unwrap().to_string(), "1.1");
        assert_eq!(plan.next_rank, 2);
    }

    #[test]
    fn test_changed_script_is_rejected() {
        let original = script("1", "CREATE TABLE a (id int);");
        let history = vec![applied(1, &original)];
        let edited = vec![script("1", "CREATE TABLE a (id bigint);")];
        assert!(matches!(
            plan(&edited, &history),
            Err(MigrationError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_vanished_script_is_rejected() {
        let scripts = vec![script("1", "a"), script("2", "b"), script("3", "c")];
        let history = vec![applied(1, &scripts[0]), applied(2, &scripts[1])];
        let local = vec![scripts[0].clone(), scripts[2].clone()];
        assert!(matches!(
            plan(&local, &history),
            Err(MigrationError::MissingScript { .. })
        ));
    }

    #[test]
    fn test_newer_applied_version_is_future_not_error() {
        let scripts = vec![script("1", "a"), script("2", "b")];
        let history = vec![applied(1, &scripts[0]), applied(2, &scripts[1])];
        let local = vec![scripts[0].clone()];
        let plan = plan(&local, &history).unwrap();
        assert_eq!(plan.future.len(), 1);
        assert!(plan.pending.is_empty());
    }

    #[test]
    fn test_out_of_order_pending_is_rejected() {
        let scripts = vec![script("1", "a"), script("1.5", "late"), script("2", "b")];
        let history = vec![applied(1, &scripts[0]), applied(2, &scripts[2])];
        match plan(&scripts, &history) {
            Err(MigrationError::OutOfOrder {
                version,
                latest_applied,
            }) => {
                assert_eq!(version, "1.5");
                assert_eq!(latest_applied, "2");
            }
            other => panic!("expected out-of-order error, got {other:?}"),
        }
    }

    #[test]
    fn test_describe_reports_states() {
        let scripts = vec![script("1", "a"), script("2", "b"), script("3", "c")];
        let mut edited = applied(3, &scripts[2]);
        edited.checksum = Some("0".repeat(64));
        let history = vec![baseline("1"), applied(2, &scripts[1]), edited];

        let states: Vec<(String, MigrationState)> = describe(&scripts, &history)
            .into_iter()
            .map(|info| (info.version.to_string(), info.state))
            .collect();

        assert_eq!(
            states,
            vec![
                ("1".to_string(), MigrationState::Baseline),
                ("1".to_string(), MigrationState::BelowBaseline),
                ("2".to_string(), MigrationState::Applied),
                ("3".to_string(), MigrationState::Outdated),
            ]
        );
    }

    #[tokio::test]
    async fn test_migrate_runs_on_spawned_task() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = MigrationSettings {
            location: dir.path().to_path_buf(),
            ..MigrationSettings::default()
        };
        let migrator: std::sync::Arc<dyn SchemaMigrator> =
            std::sync::Arc::new(ScriptMigrator::new(&settings).unwrap());
        let connection =
            ConnectionDescriptor::new("postgres", "postgresql://webapp@127.0.0.1:1/webapp").unwrap();

        let handle = tokio::spawn(async move { migrator.migrate(&connection).await });
        let result = handle.await.unwrap();

        assert!(matches!(result, Err(MigrationError::Database(_))));
    }

    #[test]
    fn test_migrator_rejects_bad_settings() {
        let settings = MigrationSettings {
            baseline_version: "one".to_string(),
            ..MigrationSettings::default()
        };
        assert!(matches!(
            ScriptMigrator::new(&settings),
            Err(MigrationError::InvalidConfiguration { .. })
        ));

        let settings = MigrationSettings {
            table: "Schema History".to_string(),
            ..MigrationSettings::default()
        };
        assert!(ScriptMigrator::new(&settings).is_err());
    }
}
