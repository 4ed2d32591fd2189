//! # Application Configuration
//!
//! Layered property source for the application wiring. Values come from, in
//! increasing precedence:
//!
//! 1. `config/application.toml`
//! 2. `config/application.{environment}.toml` (optional)
//! 3. `APP__SECTION__KEY` environment variables
//!
//! Components read individual properties by name (see [`keys`]) the same way the
//! connection descriptor and persistence properties do, or deserialize a whole
//! section with serde defaults.
//!
//! ```toml
//! [database]
//! driver = "postgres"
//! url = "postgresql://localhost/webapp_development"
//! username = "webapp"
//! password = "webapp"
//!
//! [persistence]
//! schema_generation = "validate"
//! dialect = "postgresql"
//! show_sql = true
//! format_sql = false
//! ```

pub mod error;
pub mod loader;

use config::{Config, ConfigError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Property names read by the startup wiring.
pub mod keys {
    pub const DATABASE_DRIVER: &str = "database.driver";
    pub const DATABASE_URL: &str = "database.url";
    pub const DATABASE_USERNAME: &str = "database.username";
    pub const DATABASE_PASSWORD: &str = "database.password";
    pub const DATABASE_POOL: &str = "database.pool";

    pub const SCHEMA_GENERATION: &str = "persistence.schema_generation";
    pub const DIALECT: &str = "persistence.dialect";
    pub const SHOW_SQL: &str = "persistence.show_sql";
    pub const FORMAT_SQL: &str = "persistence.format_sql";

    pub const MIGRATIONS: &str = "migrations";
    pub const VIEWS: &str = "views";
    pub const WEB: &str = "web";
}

/// Read-only view over the merged configuration layers.
#[derive(Debug, Clone)]
pub struct PropertySource {
    name: String,
    inner: Config,
}

impl PropertySource {
    pub fn new(name: impl Into<String>, inner: Config) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// Build a property source from explicit key/value pairs.
    pub fn from_pairs<I, K, V>(name: impl Into<String>, pairs: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<config::Value>,
    {
        let name = name.into();
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder
                .set_override(key.as_ref(), value)
                .map_err(|e| ConfigurationError::property_source(name.clone(), e))?;
        }
        let inner = builder
            .build()
            .map_err(|e| ConfigurationError::property_source(name.clone(), e))?;
        Ok(Self { name, inner })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a property, `None` when it is not set anywhere.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        match self.inner.get::<T>(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(ConfigurationError::type_mismatch(key, e)),
        }
    }

    pub fn get_string(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get::<String>(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> ConfigResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Look up a property that must be present and non-blank.
    pub fn require_string(&self, key: &str, context: &str) -> ConfigResult<String> {
        match self.get_string(key)? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigurationError::missing_required_field(key, context)),
        }
    }

    /// Deserialize a whole section, falling back to the section's defaults
    /// when it is absent.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<T> {
        match self.inner.get::<T>(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::NotFound(_)) => {
                serde_json::from_value(serde_json::Value::Object(Default::default()))
                    .map_err(|e| ConfigurationError::type_mismatch(key, e))
            }
            Err(e) => Err(ConfigurationError::type_mismatch(key, e)),
        }
    }

    /// All properties as JSON, unsanitized. `Null` if the properties do not
    /// form a JSON document; the failure is logged.
    pub fn to_json(&self) -> serde_json::Value {
        match self.inner.clone().try_deserialize::<serde_json::Value>() {
            Ok(value) => value,
            Err(e) => {
                warn!(source = %self.name, error = %e, "Properties could not be converted to JSON");
                serde_json::Value::Null
            }
        }
    }
}

/// Connection pool sizing for the persistence unit (`[database.pool]`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }
}

/// Schema migration runner configuration (`[migrations]`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Directory scanned for `V<version>__<description>.sql` scripts, relative to the project root
    pub location: PathBuf,
    /// Record a baseline instead of failing when the schema has tables but no history
    pub baseline_on_migrate: bool,
    pub baseline_version: String,
    pub baseline_description: String,
    /// Name of the history table in the current schema
    pub table: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            location: PathBuf::from("db/migrations"),
            baseline_on_migrate: true,
            baseline_version: "1".to_string(),
            baseline_description: "<< Baseline >>".to_string(),
            table: "schema_history".to_string(),
        }
    }
}

/// Template resolution settings (`[views]`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewSettings {
    pub prefix: String,
    pub suffix: String,
    pub encoding: String,
    pub mode: String,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            prefix: "/WEB-INF/templates".to_string(),
            suffix: ".html".to_string(),
            encoding: "UTF-8".to_string(),
            mode: "HTML".to_string(),
        }
    }
}

/// HTTP surface settings (`[web]`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSettings {
    pub bind_address: String,
    /// URL prefix under which static files are served
    pub static_path: String,
    /// Directory the static files are served from, relative to the project root
    pub static_directory: PathBuf,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            static_path: "/resources".to_string(),
            static_directory: PathBuf::from("resources"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_property_is_none() {
        let source = PropertySource::from_pairs("test", [("database.driver", "postgres")]).unwrap();
        assert_eq!(source.get_string(keys::DATABASE_URL).unwrap(), None);
        assert_eq!(
            source.get_string(keys::DATABASE_DRIVER).unwrap().as_deref(),
            Some("postgres")
        );
    }

    #[test]
    fn test_require_string_rejects_blank_values() {
        let source = PropertySource::from_pairs("test", [("database.url", "   ")]).unwrap();
        let err = source
            .require_string(keys::DATABASE_URL, "connection descriptor")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { ref field, .. } if field == "database.url"
        ));
    }

    #[test]
    fn test_absent_section_uses_defaults() {
        let source = PropertySource::from_pairs("test", Vec::<(&str, &str)>::new()).unwrap();
        let views: ViewSettings = source.section(keys::VIEWS).unwrap();
        assert_eq!(views, ViewSettings::default());
        let migrations: MigrationSettings = source.section(keys::MIGRATIONS).unwrap();
        assert!(migrations.baseline_on_migrate);
        assert_eq!(migrations.table, "schema_history");
    }

    #[test]
    fn test_partial_section_keeps_remaining_defaults() {
        let source =
            PropertySource::from_pairs("test", [("web.bind_address", "0.0.0.0:9000")]).unwrap();
        let web: WebSettings = source.section(keys::WEB).unwrap();
        assert_eq!(web.bind_address, "0.0.0.0:9000");
        assert_eq!(web.static_path, "/resources");
    }

    #[test]
    fn test_to_json_nests_dotted_keys() {
        let source = PropertySource::from_pairs(
            "test",
            [("database.driver", "postgres"), ("web.static_path", "/assets")],
        )
        .unwrap();
        let json = source.to_json();
        assert_eq!(json["database"]["driver"], "postgres");
        assert_eq!(json["web"]["static_path"], "/assets");
    }

    #[test]
    fn test_typed_lookup_reports_mismatch() {
        let source =
            PropertySource::from_pairs("test", [("persistence.show_sql", "sometimes")]).unwrap();
        let err = source.get::<bool>(keys::SHOW_SQL).unwrap_err();
        assert!(matches!(err, ConfigurationError::TypeMismatch { .. }));
    }
}
