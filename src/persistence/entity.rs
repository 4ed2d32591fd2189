//! Persistent entity mapping.
//!
//! Entities are plain structs decoded with `sqlx::FromRow`. Each one names the
//! table it maps to, and the set of entities handed to the persistence unit is
//! collected in an [`EntityCatalog`] so the schema can be checked against it.

use crate::config::{ConfigResult, ConfigurationError};
use crate::database::is_plain_identifier;
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use std::any::type_name;

/// A struct mapped to a single table
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {
    /// Table in the connection's current schema
    const TABLE: &'static str;

    /// Primary key column, a `BIGINT`
    const ID_COLUMN: &'static str = "id";
}

/// One registered entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    pub type_name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
}

/// The entity types managed by a persistence unit
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    mappings: Vec<EntityMapping>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type. Table and key names are interpolated into SQL, so
    /// only plain lowercase identifiers are accepted.
    pub fn register<E: Entity>(mut self) -> ConfigResult<Self> {
        let type_name = type_name::<E>();
        for (field, value) in [("table", E::TABLE), ("id_column", E::ID_COLUMN)] {
            if !is_plain_identifier(value) {
                return Err(ConfigurationError::invalid_value(
                    format!("{type_name}::{field}"),
                    value,
                    "entity mapping requires a lowercase SQL identifier",
                ));
            }
        }

        if let Some(existing) = self.mappings.iter().find(|m| m.table == E::TABLE) {
            return Err(ConfigurationError::invalid_value(
                format!("{type_name}::table"),
                E::TABLE,
                format!("table is already mapped by {}", existing.type_name),
            ));
        }

        self.mappings.push(EntityMapping {
            type_name,
            table: E::TABLE,
            id_column: E::ID_COLUMN,
        });
        Ok(self)
    }

    pub fn mappings(&self) -> &[EntityMapping] {
        &self.mappings
    }

    pub fn tables(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.table.to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, FromRow)]
    struct Account {
        #[allow(dead_code)]
        id: i64,
    }

    impl Entity for Account {
        const TABLE: &'static str = "accounts";
    }

    #[derive(Debug, FromRow)]
    struct LegacyAccount {
        #[allow(dead_code)]
        account_id: i64,
    }

    impl Entity for LegacyAccount {
        const TABLE: &'static str = "accounts";
        const ID_COLUMN: &'static str = "account_id";
    }

    #[derive(Debug, FromRow)]
    struct BadTable {
        #[allow(dead_code)]
        id: i64,
    }

    impl Entity for BadTable {
        const TABLE: &'static str = "Accounts; DROP TABLE accounts";
    }

    #[test]
    fn test_register_records_mapping() {
        let catalog = EntityCatalog::new().register::<Account>().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.tables(), vec!["accounts".to_string()]);
        assert_eq!(catalog.mappings()[0].id_column, "id");
    }

    #[test]
    fn test_register_rejects_unsafe_table_names() {
        assert!(matches!(
            EntityCatalog::new().register::<BadTable>(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_register_rejects_duplicate_tables() {
        let result = EntityCatalog::new()
            .register::<Account>()
            .and_then(|c| c.register::<LegacyAccount>());
        assert!(result.is_err());
    }
}
