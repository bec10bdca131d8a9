use tempfile::TempDir;

use topology_sync::config::{LoggingConfig, SyncConfig};
use topology_sync::SyncError;

#[test]
fn test_save_and_load_round_trip() -> Result<(), SyncError> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested/topology-sync.yml");

    let mut config = SyncConfig::default();
    config.control_plane.endpoint = "http://10.0.0.5:8081/admin/api".to_string();
    config.polling.stat_period = 4;
    config.logging = LoggingConfig {
        level: "debug".to_string(),
        directory: Some(dir.path().join("logs")),
        console: false,
    };

    config.save(&path)?;
    assert!(path.is_file());
    assert!(!path.with_extension("tmp").exists());

    let loaded = SyncConfig::load_from_file(&path)?;
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn test_invalid_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.yml");
    std::fs::write(&path, "polling: [not, a, map]").unwrap();

    let err = SyncConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn test_zero_stat_period_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yml");
    std::fs::write(&path, "polling:\n  stat_period: 0\n").unwrap();

    assert!(matches!(
        SyncConfig::load_from_file(&path),
        Err(SyncError::Config(_))
    ));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = SyncConfig::load_from_file(&dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}
