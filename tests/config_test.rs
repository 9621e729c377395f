use foot_traffic::config::{DashboardConfig, Variant};
use foot_traffic::error::DashboardError;
use foot_traffic::source::SourceDescriptor;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn empty_file_is_the_basic_dashboard() {
    let config = DashboardConfig::from_toml_str("").unwrap();
    assert_eq!(config, DashboardConfig::default());
    assert_eq!(config.variant, Variant::Basic);
    assert_eq!(config.refresh_interval(), None);
    assert_eq!(config.raw_limit(), 25);
    assert!(matches!(config.source(), SourceDescriptor::Csv { .. }));
}

#[test]
fn live_variant_polls_the_database() {
    let config = DashboardConfig::from_toml_str(
        r#"
        variant = "live"
        database_path = "/var/lib/traffic/data.db"

        [tables]
        visits = "foot_traffic"
        "#,
    )
    .unwrap();

    assert_eq!(config.refresh_interval(), Some(Duration::from_secs(10)));
    match config.source() {
        SourceDescriptor::Sqlite { path, tables } => {
            assert_eq!(path, PathBuf::from("/var/lib/traffic/data.db"));
            assert_eq!(tables.visits, "foot_traffic");
            assert_eq!(tables.stores, "stores");
        }
        other => panic!("unexpected source: {other}"),
    }
}

#[test]
fn explicit_values_override_variant_defaults() {
    let config = DashboardConfig::from_toml_str(
        r#"
        variant = "full"
        refresh_interval_secs = 30
        raw_row_limit = 10
        top_n = 3
        "#,
    )
    .unwrap();
    assert_eq!(config.refresh_interval(), Some(Duration::from_secs(30)));
    assert_eq!(config.raw_limit(), 10);
    assert_eq!(config.variant.visits_bucket_days(), 10);
}

#[test]
fn invalid_values_are_config_errors() {
    for text in [
        "variant = \"premium\"",
        "top_n = 0",
        "refresh_interval_secs = 0",
        "bind = 3000",
    ] {
        match DashboardConfig::from_toml_str(text) {
            Err(DashboardError::Config(_)) => {}
            other => panic!("`{}` gave {:?}", text, other),
        }
    }
}

#[test]
fn load_reads_a_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashboard.toml");
    std::fs::write(&path, "variant = \"full\"\nbind = \"0.0.0.0:8080\"\n").unwrap();

    let config = DashboardConfig::load(&path).unwrap();
    assert_eq!(config.variant, Variant::Full);
    assert_eq!(config.bind, "0.0.0.0:8080");

    let err = DashboardConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert_eq!(err.kind(), "config");
}
