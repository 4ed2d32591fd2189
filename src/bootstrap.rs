//! # Application Bootstrap
//!
//! Composes the application's long-lived singletons at process startup and
//! returns them as one [`ApplicationContext`] that request handlers receive by
//! parameter passing.
//!
//! ## Startup Order
//!
//! 1. Connection descriptor from the `database.*` properties
//! 2. Schema migration against that descriptor
//! 3. Persistence unit against the same descriptor, from the migration report
//! 4. Transaction coordinator over the persistence unit
//! 5. Template resolver, template engine and view resolver
//!
//! Every step is fatal on failure. Resources opened by earlier steps are
//! released before the error is returned.

use crate::config::{ConfigManager, WebSettings};
use crate::database::{ConnectionDescriptor, MigrationReport, SchemaMigrator, ScriptMigrator};
use crate::error::{Result, WebappError};
use crate::logging::{log_error, log_startup_phase};
use crate::persistence::{
    EntityCatalog, PersistenceContext, PersistenceProperties, PersistenceProvider,
    PersistenceUnit, PgPersistenceProvider, TransactionCoordinator,
};
use crate::views::{build_view_pipeline, register_builtin_views, TemplateEngine, ViewResolver, ViewResult};
use std::sync::Arc;
use tracing::info;

/// Registers the application's views with the template engine
pub type ViewRegistration = fn(TemplateEngine) -> ViewResult<TemplateEngine>;

/// The singletons constructed at startup
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    pub config: Arc<ConfigManager>,
    pub connection: ConnectionDescriptor,
    pub migrations: MigrationReport,
    pub persistence: PersistenceUnit,
    pub transactions: TransactionCoordinator,
    pub views: ViewResolver,
    pub web: WebSettings,
}

impl ApplicationContext {
    /// Issue a persistence context from the shared unit
    pub fn persistence_context(&self) -> PersistenceContext {
        self.persistence.context()
    }

    /// Release the connection pool
    pub async fn shutdown(&self) {
        info!("🛑 Closing persistence unit");
        self.persistence.close().await;
    }
}

/// Builder for [`ApplicationContext`]; collaborators default to the sqlx-backed
/// implementations and can be replaced, e.g. by test doubles.
pub struct ApplicationBootstrap {
    config: Arc<ConfigManager>,
    migrator: Option<Arc<dyn SchemaMigrator>>,
    persistence_provider: Option<Arc<dyn PersistenceProvider>>,
    entities: EntityCatalog,
    views: ViewRegistration,
}

impl ApplicationBootstrap {
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self {
            config,
            migrator: None,
            persistence_provider: None,
            entities: EntityCatalog::new(),
            views: register_builtin_views,
        }
    }

    pub fn with_migrator(mut self, migrator: Arc<dyn SchemaMigrator>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    pub fn with_persistence_provider(mut self, provider: Arc<dyn PersistenceProvider>) -> Self {
        self.persistence_provider = Some(provider);
        self
    }

    pub fn with_entities(mut self, entities: EntityCatalog) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_views(mut self, views: ViewRegistration) -> Self {
        self.views = views;
        self
    }

    /// Run the startup sequence
    pub async fn start(self) -> Result<ApplicationContext> {
        info!(
            environment = %self.config.environment(),
            config_directory = %self.config.config_directory().display(),
            "🚀 BOOTSTRAP: Starting application wiring"
        );

        match self.run().await {
            Ok(context) => {
                info!(
                    applied_migrations = context.migrations.applied_count(),
                    schema_version = ?context.migrations.schema_version.as_ref().map(ToString::to_string),
                    views = context.views.engine().view_names().count(),
                    "✅ BOOTSTRAP: Application wiring complete"
                );
                Ok(context)
            }
            Err(e) => {
                log_error("bootstrap", e.phase(), &e.to_string(), None);
                Err(e)
            }
        }
    }

    async fn run(self) -> Result<ApplicationContext> {
        let config = self.config;
        tracing::debug!(config = %config.debug_config(), "Effective configuration");
        let web = config.web_settings()?;

        log_startup_phase("connection", "started", None);
        let connection = ConnectionDescriptor::from_properties(config.properties())?;
        log_startup_phase("connection", "completed", Some(&connection.display_url()));

        log_startup_phase("migration", "started", None);
        let migrator: Arc<dyn SchemaMigrator> = match self.migrator {
            Some(migrator) => migrator,
            None => Arc::new(ScriptMigrator::new(&config.migration_settings()?)?),
        };
        let migrations = migrator.migrate(&connection).await?;
        log_startup_phase(
            "migration",
            "completed",
            Some(&format!("{} script(s) applied", migrations.applied_count())),
        );

        log_startup_phase("persistence", "started", None);
        let properties = PersistenceProperties::from_properties(config.properties())?;
        let provider: Arc<dyn PersistenceProvider> = match self.persistence_provider {
            Some(provider) => provider,
            None => Arc::new(PgPersistenceProvider::new(config.pool_settings()?)),
        };
        let persistence = provider
            .create_unit(&connection, &properties, &self.entities, &migrations)
            .await?;
        let transactions = TransactionCoordinator::new(&persistence);
        log_startup_phase("persistence", "completed", None);

        log_startup_phase("views", "started", None);
        let views = match config
            .view_settings()
            .map_err(WebappError::from)
            .and_then(|settings| Ok(build_view_pipeline(&settings, self.views)?))
        {
            Ok(views) => views,
            Err(e) => {
                persistence.close().await;
                return Err(e);
            }
        };
        log_startup_phase("views", "completed", None);

        Ok(ApplicationContext {
            config,
            connection,
            migrations,
            persistence,
            transactions,
            views,
            web,
        })
    }
}

/// Build the application context with the default collaborators
pub async fn bootstrap(config: Arc<ConfigManager>) -> Result<ApplicationContext> {
    ApplicationBootstrap::new(config).start().await
}
