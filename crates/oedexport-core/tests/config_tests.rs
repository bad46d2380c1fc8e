use oedexport_core::Config;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn defaults_expand_paths() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::load(Some(&tmp.path().join("missing.toml"))).expect("load default config");
    assert!(
        !cfg.database.path.to_string_lossy().contains('~'),
        "database path should be expanded"
    );
    let thresholds = cfg.export.thresholds().unwrap();
    assert!(thresholds.warning_size() <= thresholds.hard_limit());
}

#[test]
fn reads_export_section() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[database]
path = "/tmp/readings.db"

[export]
language = "fr"
warning_size = 10
hard_limit = 100
fetch_timeout = "30s"
"#,
    )
    .unwrap();

    let cfg = Config::load(Some(&path)).unwrap();
    assert_eq!(cfg.export.language, "fr");
    assert_eq!(cfg.export.warning_size, 10);
    assert_eq!(cfg.export.hard_limit, 100);
    assert_eq!(cfg.export.fetch_timeout, Some(Duration::from_secs(30)));
    assert_eq!(cfg.logging.level, "info");
}

#[test]
fn rejects_inverted_limits() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[export]\nwarning_size = 500\nhard_limit = 100\n").unwrap();
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("exceeds hard limit"));
}
