//! Bootstrap Composition Tests
//!
//! Runs the startup sequence with recording collaborators, no database needed.

mod common;

use common::{config_manager, CallLog, RecordingMigrator, RecordingProvider};
use std::sync::Arc;
use tempfile::TempDir;
use webapp_core::bootstrap::ApplicationBootstrap;
use webapp_core::WebappError;

fn bootstrap_with(log: &CallLog, fail_migration: bool, extra: &[(&str, &str)]) -> (TempDir, ApplicationBootstrap) {
    let root = TempDir::new().unwrap();
    let config = config_manager(root.path(), extra);
    let bootstrap = ApplicationBootstrap::new(config)
        .with_migrator(Arc::new(RecordingMigrator {
            log: log.clone(),
            fail: fail_migration,
        }))
        .with_persistence_provider(Arc::new(RecordingProvider { log: log.clone() }));
    (root, bootstrap)
}

#[tokio::test]
async fn migration_runs_before_persistence_unit() {
    let log = CallLog::default();
    let (_root, bootstrap) = bootstrap_with(&log, false, &[]);

    let context = bootstrap.start().await.unwrap();

    assert_eq!(log.calls(), vec!["migrate:postgres", "create_unit:2"]);
    assert_eq!(context.migrations.schema_version.unwrap().to_string(), "2");
    assert_eq!(context.persistence.schema_version().unwrap().to_string(), "2");
}

#[tokio::test]
async fn context_holds_every_singleton() {
    let log = CallLog::default();
    let (root, bootstrap) = bootstrap_with(
        &log,
        false,
        &[
            ("database.username", "app_user"),
            ("database.password", "s3cret"),
        ],
    );

    let context = bootstrap.start().await.unwrap();

    assert_eq!(context.connection.driver(), "postgres");
    assert_eq!(context.connection.url(), common::UNREACHABLE_URL);
    assert_eq!(context.connection.username(), Some("app_user"));
    assert_eq!(context.connection.password(), Some("s3cret"));
    assert_eq!(context.web.static_directory, root.path().join("resources"));

    let view = context.views.resolve("index").unwrap();
    assert_eq!(view.location(), "/WEB-INF/templates/index.html");
    assert_eq!(view.content_type(), "text/html;charset=UTF-8");
}

#[tokio::test]
async fn failed_migration_stops_startup() {
    let log = CallLog::default();
    let (_root, bootstrap) = bootstrap_with(&log, true, &[]);

    let err = bootstrap.start().await.unwrap_err();

    assert!(matches!(err, WebappError::Migration(_)));
    assert_eq!(err.phase(), "migration");
    assert_eq!(log.calls(), vec!["migrate:postgres"]);
}

#[tokio::test]
async fn missing_driver_fails_before_migration() {
    let log = CallLog::default();
    let (_root, bootstrap) = bootstrap_with(&log, false, &[("database.driver", "")]);

    let err = bootstrap.start().await.unwrap_err();

    assert!(matches!(err, WebappError::Configuration(_)));
    assert!(err.to_string().contains("database.driver"));
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn invalid_view_settings_fail_after_persistence() {
    let log = CallLog::default();
    let (_root, bootstrap) = bootstrap_with(&log, false, &[("views.encoding", "ISO-8859-1")]);

    let err = bootstrap.start().await.unwrap_err();

    assert!(matches!(err, WebappError::View(_)));
    assert_eq!(log.calls(), vec!["migrate:postgres", "create_unit:2"]);
}
