mod common;

use foot_traffic::database::SqliteSource;
use foot_traffic::error::DashboardError;
use foot_traffic::source::{DataSource, SourceDescriptor, TableNames};
use tempfile::tempdir;

#[test]
fn loads_and_joins_database_tables() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    common::sqlite_fixture(&path);

    let dataset = SourceDescriptor::sqlite(&path).load().unwrap();

    assert_eq!(dataset.visits.len(), 4);
    assert_eq!(dataset.joined.len(), 4);
    assert_eq!(dataset.stores[0].store_id, "007");
    assert!(dataset.customers[0].is_member);
    assert_eq!(dataset.joined[0].state.as_deref(), Some("CA"));
    assert_eq!(dataset.joined[1].card_on_file, None);
    assert_eq!(dataset.joined[3].is_member, None);
}

#[test]
fn database_and_csv_agree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    common::sqlite_fixture(&path);

    let from_db = SourceDescriptor::sqlite(&path).load().unwrap();
    let from_csv = common::csv_fixture(dir.path()).load().unwrap();

    assert_eq!(from_db.joined, from_csv.joined);
}

#[test]
fn missing_table_is_schema_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    common::sqlite_fixture(&path);

    let tables = TableNames {
        visits: "foot_traffic".to_string(),
        ..TableNames::default()
    };
    match SqliteSource::new(&path, tables).load().unwrap_err() {
        DashboardError::SchemaMismatch { table, .. } => assert_eq!(table, "foot_traffic"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_database_is_source_unavailable() {
    let dir = tempdir().unwrap();
    let source = SqliteSource::new(dir.path().join("absent.db"), TableNames::default());

    assert!(source.load().unwrap_err().is_source_unavailable());
    assert!(source.freshness().unwrap_err().is_source_unavailable());
    // Opening read-only must not create the file
    assert!(!dir.path().join("absent.db").exists());
}
