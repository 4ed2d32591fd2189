#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Webapp Core
//!
//! Startup wiring for a server-rendered web application.
//!
//! ## Overview
//!
//! At process start the crate composes a fixed set of long-lived singletons
//! and returns them as one [`ApplicationContext`]:
//!
//! 1. a connection descriptor read from the `database.*` properties
//! 2. schema migration against that descriptor (versioned SQL scripts with
//!    baseline-on-migrate)
//! 3. a persistence unit bound to the same descriptor, built only after
//!    migration has completed
//! 4. a transaction coordinator over the persistence unit
//! 5. a template resolver, template engine and view resolver for HTML views
//!
//! The web layer then serves static resources, health probes and rendered
//! views from that context.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered property source and typed settings
//! - [`database`] - Connection descriptor and schema migrations
//! - [`persistence`] - Persistence unit, contexts, transactions, error translation
//! - [`views`] - Template resolution and rendering
//! - [`bootstrap`] - The startup composition
//! - [`web`] - HTTP router and handlers
//! - [`logging`] - Structured logging setup
//! - [`error`] - Startup error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webapp_core::bootstrap::bootstrap;
//! use webapp_core::config::ConfigManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! webapp_core::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?;
//! let context = bootstrap(config).await?;
//!
//! let view = context.views.resolve("index")?;
//! println!("index renders from {}", view.location());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests need no database. Integration tests that migrate a real schema
//! run with `--features test-database` against `DATABASE_URL`.

pub mod bootstrap;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod views;
pub mod web;

pub use bootstrap::{bootstrap, ApplicationBootstrap, ApplicationContext};
pub use config::{ConfigManager, ConfigurationError};
pub use database::{ConnectionDescriptor, MigrationError, MigrationReport, ScriptMigrator};
pub use error::{Result, WebappError};
pub use persistence::{
    DataAccessError, PersistenceContext, PersistenceProperties, PersistenceUnit,
    TransactionCoordinator,
};
pub use views::{TemplateResolver, View, ViewError, ViewResolver};
