use std::fs;

use log::LevelFilter;
use tempfile::tempdir;

use notihub::config::ConfigManager;
use notihub::display::OutputFormat;

const CONFIG: &str = r#"
[base]
console-level = "warn"
log-format = "json"

[output]
format = "json"
color = false

[ci]
console-level = "error"
"#;

#[test]
fn test_config_file_integration() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("notihub.toml");
    fs::write(&config_path, CONFIG).expect("Failed to write config file");

    let manager = ConfigManager::load_from_file(config_path.clone()).expect("config should load");
    assert_eq!(manager.config_file_path(), Some(config_path.as_path()));
    assert_eq!(manager.get_log_level("base", "console-level").unwrap(), Some(LevelFilter::Warn));
    assert_eq!(manager.get_value("base", "log-format").map(String::as_str), Some("json"));

    let output = manager.get_output_config().unwrap();
    assert_eq!(output.format, OutputFormat::Json);
    assert!(!output.color);
}

#[test]
fn test_config_section_selection() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("notihub.toml");
    fs::write(&config_path, CONFIG).expect("Failed to write config file");

    let mut manager = ConfigManager::load_from_file(config_path).expect("config should load");
    manager.select_section("ci".to_string());
    assert_eq!(manager.get_log_level("base", "console-level").unwrap(), Some(LevelFilter::Error));
    // keys missing from the selected section fall back to base
    assert_eq!(manager.get_value("base", "log-format").map(String::as_str), Some("json"));
}

#[test]
fn test_malformed_config_is_an_error() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("notihub.toml");
    fs::write(&config_path, "[base\nconsole-level = ").expect("Failed to write config file");

    assert!(ConfigManager::load_from_file(config_path).is_err());
}
