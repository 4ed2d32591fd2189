//! # Persistence Unit
//!
//! The object-relational layer the rest of the application reads and writes
//! through. A [`PersistenceProvider`] (the vendor adapter) turns the connection
//! descriptor, the `persistence.*` properties and the entity catalog into a
//! [`PersistenceUnit`], which hands out [`PersistenceContext`]s for data access.
//!
//! Building a unit requires the [`MigrationReport`] of a completed migration
//! run, so the unit can never be constructed against an unmigrated schema.

pub mod entity;
pub mod error;
pub mod transaction;

use crate::config::{keys, ConfigResult, ConfigurationError, PoolSettings, PropertySource};
use crate::database::migrations::{MigrationReport, MigrationVersion};
use crate::database::ConnectionDescriptor;
use crate::error::{Result, WebappError};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{ConnectOptions, PgPool, Postgres};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use entity::{Entity, EntityCatalog, EntityMapping};
pub use error::{DataAccessError, DataAccessResult};
pub use transaction::TransactionCoordinator;

/// What the persistence unit does to the schema at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaGeneration {
    /// Leave the schema alone
    #[default]
    None,
    /// Check that every catalogued entity table exists
    Validate,
    Update,
    Create,
    CreateDrop,
}

impl SchemaGeneration {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaGeneration::None => "none",
            SchemaGeneration::Validate => "validate",
            SchemaGeneration::Update => "update",
            SchemaGeneration::Create => "create",
            SchemaGeneration::CreateDrop => "create-drop",
        }
    }

    /// Modes that would change the schema conflict with the migration runner,
    /// which is the only writer of DDL.
    fn ensure_supported(&self) -> Result<()> {
        match self {
            SchemaGeneration::None | SchemaGeneration::Validate => Ok(()),
            other => Err(WebappError::persistence(format!(
                "schema generation mode '{}' is not supported, the schema is owned by migrations",
                other.as_str()
            ))),
        }
    }
}

impl FromStr for SchemaGeneration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" | "" => Ok(SchemaGeneration::None),
            "validate" => Ok(SchemaGeneration::Validate),
            "update" => Ok(SchemaGeneration::Update),
            "create" => Ok(SchemaGeneration::Create),
            "create-drop" => Ok(SchemaGeneration::CreateDrop),
            _ => Err(ConfigurationError::invalid_value(
                keys::SCHEMA_GENERATION,
                s,
                "expected one of none, validate, update, create, create-drop",
            )),
        }
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL dialect named by `persistence.dialect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    PostgreSql,
    Other(String),
}

impl Dialect {
    /// Accepts short names (`postgresql`, `postgres`) as well as fully
    /// qualified dialect class names such as `org.hibernate.dialect.PostgreSQLDialect`.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized == "postgres" || normalized.contains("postgresql") {
            Dialect::PostgreSql
        } else {
            Dialect::Other(raw.trim().to_string())
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::PostgreSql => f.write_str("postgresql"),
            Dialect::Other(name) => f.write_str(name),
        }
    }
}

/// The `persistence.*` properties
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistenceProperties {
    pub schema_generation: SchemaGeneration,
    /// Inferred from the driver when unset
    pub dialect: Option<Dialect>,
    /// Log every statement at INFO
    pub show_sql: bool,
    /// Recorded for reporting; statement text is logged as sqlx formats it
    pub format_sql: bool,
}

impl PersistenceProperties {
    pub fn from_properties(properties: &PropertySource) -> ConfigResult<Self> {
        let schema_generation = match properties.get_string(keys::SCHEMA_GENERATION)? {
            Some(raw) => raw.parse()?,
            None => SchemaGeneration::default(),
        };
        let dialect = properties
            .get_string(keys::DIALECT)?
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| Dialect::parse(&raw));

        Ok(Self {
            schema_generation,
            dialect,
            show_sql: properties.get_or(keys::SHOW_SQL, false)?,
            format_sql: properties.get_or(keys::FORMAT_SQL, false)?,
        })
    }
}

/// Builds the persistence unit. The default implementation is
/// [`PgPersistenceProvider`]; tests substitute recording doubles.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    async fn create_unit(
        &self,
        connection: &ConnectionDescriptor,
        properties: &PersistenceProperties,
        entities: &EntityCatalog,
        migrations: &MigrationReport,
    ) -> Result<PersistenceUnit>;
}

/// sqlx/PostgreSQL vendor adapter
#[derive(Debug, Clone, Default)]
pub struct PgPersistenceProvider {
    pool: PoolSettings,
}

impl PgPersistenceProvider {
    pub fn new(pool: PoolSettings) -> Self {
        Self { pool }
    }

    pub fn pool_settings(&self) -> &PoolSettings {
        &self.pool
    }

    /// Reject configurations this adapter cannot honor, before any connection
    /// is opened.
    pub fn check_compatibility(
        &self,
        connection: &ConnectionDescriptor,
        properties: &PersistenceProperties,
    ) -> Result<()> {
        if let Some(Dialect::Other(name)) = &properties.dialect {
            return Err(WebappError::persistence(format!(
                "dialect '{name}' is not compatible with driver '{}'",
                connection.driver()
            )));
        }
        properties.schema_generation.ensure_supported()?;

        if self.pool.max_connections == 0 || self.pool.min_connections > self.pool.max_connections
        {
            return Err(ConfigurationError::invalid_value(
                keys::DATABASE_POOL,
                format!(
                    "min_connections={}, max_connections={}",
                    self.pool.min_connections, self.pool.max_connections
                ),
                "max_connections must be positive and at least min_connections",
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceProvider for PgPersistenceProvider {
    async fn create_unit(
        &self,
        connection: &ConnectionDescriptor,
        properties: &PersistenceProperties,
        entities: &EntityCatalog,
        migrations: &MigrationReport,
    ) -> Result<PersistenceUnit> {
        self.check_compatibility(connection, properties)?;

        let options = connection.connect_options()?;
        let options = if properties.show_sql {
            options.log_statements(log::LevelFilter::Info)
        } else {
            options.disable_statement_logging()
        };

        debug!(
            url = %connection.display_url(),
            max_connections = self.pool.max_connections,
            min_connections = self.pool.min_connections,
            acquire_timeout_seconds = self.pool.acquire_timeout_seconds,
            "Creating persistence unit connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(self.pool.max_connections)
            .min_connections(self.pool.min_connections)
            .acquire_timeout(self.pool.acquire_timeout())
            .idle_timeout(self.pool.idle_timeout())
            .connect_with(options)
            .await
            .map_err(DataAccessError::from)?;

        let unit = PersistenceUnit::new(pool, properties.clone(), entities.clone(), migrations);

        if properties.schema_generation == SchemaGeneration::Validate {
            if let Err(e) = unit.validate_schema().await {
                unit.close().await;
                return Err(e);
            }
        }

        info!(
            dialect = %properties.dialect.as_ref().unwrap_or(&Dialect::PostgreSql),
            schema_generation = %properties.schema_generation,
            show_sql = properties.show_sql,
            format_sql = properties.format_sql,
            entities = entities.len(),
            schema_version = ?unit.schema_version().map(ToString::to_string),
            "Persistence unit created"
        );

        Ok(unit)
    }
}

/// Factory for persistence contexts, shared by the whole application
#[derive(Debug, Clone)]
pub struct PersistenceUnit {
    pool: PgPool,
    properties: PersistenceProperties,
    entities: Arc<EntityCatalog>,
    schema_version: Option<MigrationVersion>,
}

impl PersistenceUnit {
    pub fn new(
        pool: PgPool,
        properties: PersistenceProperties,
        entities: EntityCatalog,
        migrations: &MigrationReport,
    ) -> Self {
        Self {
            pool,
            properties,
            entities: Arc::new(entities),
            schema_version: migrations.schema_version.clone(),
        }
    }

    /// Issue a new persistence context
    pub fn context(&self) -> PersistenceContext {
        PersistenceContext {
            pool: self.pool.clone(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn properties(&self) -> &PersistenceProperties {
        &self.properties
    }

    pub fn entities(&self) -> &EntityCatalog {
        &self.entities
    }

    /// Schema version the unit was built against
    pub fn schema_version(&self) -> Option<&MigrationVersion> {
        self.schema_version.as_ref()
    }

    /// Check that every catalogued entity table exists in the current schema
    pub async fn validate_schema(&self) -> Result<()> {
        let expected = self.entities.tables();
        if expected.is_empty() {
            debug!("No entities catalogued, nothing to validate");
            return Ok(());
        }

        let present: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = ANY($1)",
        )
        .bind(&expected)
        .fetch_all(&self.pool)
        .await
        .map_err(DataAccessError::from)?;

        let missing_tables: Vec<String> = expected
            .into_iter()
            .filter(|table| !present.contains(table))
            .collect();

        if missing_tables.is_empty() {
            debug!(tables = present.len(), "Schema validation passed");
            Ok(())
        } else {
            warn!(missing = ?missing_tables, "Schema validation failed");
            Err(WebappError::SchemaValidation { missing_tables })
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A unit of work against the database
#[derive(Debug, Clone)]
pub struct PersistenceContext {
    pool: PgPool,
}

impl PersistenceContext {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn acquire(&self) -> DataAccessResult<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }

    /// Load an entity by primary key
    pub async fn find<E: Entity>(&self, id: i64) -> DataAccessResult<Option<E>> {
        let sql = format!(
            r#"SELECT * FROM "{}" WHERE "{}" = $1"#,
            E::TABLE,
            E::ID_COLUMN
        );
        Ok(sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Like [`find`](Self::find), but a missing row is an error
    pub async fn get<E: Entity>(&self, id: i64) -> DataAccessResult<E> {
        self.find(id).await?.ok_or(DataAccessError::NotFound)
    }

    pub async fn count<E: Entity>(&self) -> DataAccessResult<i64> {
        let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, E::TABLE);
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn health_check(&self) -> DataAccessResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
